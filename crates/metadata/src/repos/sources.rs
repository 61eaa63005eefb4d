//! Source node summary repository.

use crate::error::MetadataResult;
use crate::models::SourceRow;
use async_trait::async_trait;

/// Repository for per-node aggregates.
#[async_trait]
pub trait SourceRepo: Send + Sync {
    /// Summarize indexed frames per node, ordered by node, at most `limit` nodes.
    async fn summarize_sources(&self, limit: u32) -> MetadataResult<Vec<SourceRow>>;
}
