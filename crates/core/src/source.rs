//! Per-source summaries of indexed frames.

use crate::frame::Slot;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// What the index knows about one source node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    /// Number of indexed frames from this node.
    pub frame_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_fetched_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_fetched_at: OffsetDateTime,
    pub latest_wall_clock_slot: Slot,
}
