//! Database models mapping to the index schema.

use crate::error::{MetadataError, MetadataResult};
use forkchoice_core::{Epoch, FrameMetadata, IndexedFrame, Slot, SourceSummary};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime, UtcOffset};

/// Frame record.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FrameRow {
    pub id: String,
    pub node: String,
    pub fetched_at: OffsetDateTime,
    pub wall_clock_slot: i64,
    pub wall_clock_epoch: i64,
}

/// Label attached to a frame.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FrameLabelRow {
    pub frame_id: String,
    pub name: String,
}

/// Aggregate of frames per source node.
#[derive(Debug, Clone, FromRow)]
pub struct SourceRow {
    pub node: String,
    pub frame_count: i64,
    pub first_fetched_at: OffsetDateTime,
    pub last_fetched_at: OffsetDateTime,
    pub latest_wall_clock_slot: i64,
}

/// Normalize a timestamp to the precision both engines store: UTC,
/// truncated to whole microseconds.
pub fn index_timestamp(ts: OffsetDateTime) -> OffsetDateTime {
    let ts = ts.to_offset(UtcOffset::UTC);
    ts - Duration::nanoseconds(i64::from(ts.nanosecond() % 1_000))
}

/// Convert a chain coordinate to its column representation.
pub fn coordinate_to_db(field: &str, value: u64) -> MetadataResult<i64> {
    i64::try_from(value)
        .map_err(|_| MetadataError::Validation(format!("{field} {value} out of range")))
}

fn coordinate_from_db(field: &str, value: i64) -> MetadataResult<u64> {
    u64::try_from(value)
        .map_err(|_| MetadataError::Internal(format!("negative {field} in index: {value}")))
}

impl FrameRow {
    /// Build the row for validated metadata.
    pub fn from_metadata(metadata: &FrameMetadata) -> MetadataResult<Self> {
        Ok(Self {
            id: metadata.id.clone(),
            node: metadata.node.clone(),
            fetched_at: index_timestamp(metadata.fetched_at),
            wall_clock_slot: coordinate_to_db("wall_clock_slot", metadata.wall_clock_slot.get())?,
            wall_clock_epoch: coordinate_to_db(
                "wall_clock_epoch",
                metadata.wall_clock_epoch.get(),
            )?,
        })
    }

    /// Attach labels to produce a listing entry.
    pub fn into_indexed(self, mut labels: Vec<String>) -> MetadataResult<IndexedFrame> {
        labels.sort();
        labels.dedup();
        Ok(IndexedFrame {
            wall_clock_slot: Slot(coordinate_from_db("wall_clock_slot", self.wall_clock_slot)?),
            wall_clock_epoch: Epoch(coordinate_from_db(
                "wall_clock_epoch",
                self.wall_clock_epoch,
            )?),
            id: self.id,
            node: self.node,
            fetched_at: self.fetched_at.to_offset(UtcOffset::UTC),
            labels,
        })
    }
}

impl SourceRow {
    pub fn into_summary(self) -> MetadataResult<(String, SourceSummary)> {
        let summary = SourceSummary {
            frame_count: u64::try_from(self.frame_count).map_err(|_| {
                MetadataError::Internal(format!("negative frame count: {}", self.frame_count))
            })?,
            first_fetched_at: self.first_fetched_at.to_offset(UtcOffset::UTC),
            last_fetched_at: self.last_fetched_at.to_offset(UtcOffset::UTC),
            latest_wall_clock_slot: Slot(coordinate_from_db(
                "wall_clock_slot",
                self.latest_wall_clock_slot,
            )?),
        };
        Ok((self.node, summary))
    }
}

/// Convert a slot column value read back from the index.
pub fn slot_from_db(value: i64) -> MetadataResult<Slot> {
    coordinate_from_db("wall_clock_slot", value).map(Slot)
}

/// Convert an epoch column value read back from the index.
pub fn epoch_from_db(value: i64) -> MetadataResult<Epoch> {
    coordinate_from_db("wall_clock_epoch", value).map(Epoch)
}
