//! Frame and label repository.

use crate::error::MetadataResult;
use crate::models::{FrameLabelRow, FrameRow};
use crate::query::SelectQuery;
use async_trait::async_trait;

/// Repository for frame metadata and label rows.
///
/// The select methods take an engine-agnostic [`SelectQuery`]; each engine
/// renders it in its own dialect.
#[async_trait]
pub trait FrameRepo: Send + Sync {
    /// Insert a frame row and its label rows in one transaction.
    ///
    /// `labels` must already be free of duplicates.
    async fn insert_frame(&self, frame: &FrameRow, labels: &[&str]) -> MetadataResult<()>;

    /// Delete a frame and its label rows. Returns the number of frame rows
    /// removed (0 when the id is unknown).
    async fn delete_frame(&self, frame_id: &str) -> MetadataResult<u64>;

    /// Fetch full frame rows.
    async fn fetch_frames(&self, query: &SelectQuery) -> MetadataResult<Vec<FrameRow>>;

    /// Fetch full label rows.
    async fn fetch_labels(&self, query: &SelectQuery) -> MetadataResult<Vec<FrameLabelRow>>;

    /// Fetch the distinct values of a text column.
    async fn fetch_distinct_text(&self, query: &SelectQuery) -> MetadataResult<Vec<String>>;

    /// Fetch the distinct values of an integer column.
    async fn fetch_distinct_int(&self, query: &SelectQuery) -> MetadataResult<Vec<i64>>;
}
