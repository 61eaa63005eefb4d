//! Frame types: metadata, payload wrapper and indexed listings.

use crate::forkchoice::ForkChoice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use time::OffsetDateTime;

/// Wall clock slot of the source chain at capture time.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u64);

/// Wall clock epoch of the source chain at capture time.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub u64);

macro_rules! coordinate_impls {
    ($name:ident) => {
        impl $name {
            /// Get the raw value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

coordinate_impls!(Slot);
coordinate_impls!(Epoch);

/// Year-one midnight, written by producers that never set the timestamp.
const UNSET_TIMESTAMP: OffsetDateTime = time::macros::datetime!(0001-01-01 0:00 UTC);

fn is_zero_timestamp(ts: OffsetDateTime) -> bool {
    ts == OffsetDateTime::UNIX_EPOCH || ts == UNSET_TIMESTAMP
}

/// Identity and provenance of a frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Source that provided the frame: a beacon node name from the
    /// ingestion config, or a sentry id.
    pub node: String,
    /// Globally unique frame id.
    pub id: String,
    /// When the snapshot was captured.
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
    /// Wall clock slot at capture time.
    pub wall_clock_slot: Slot,
    /// Wall clock epoch at capture time.
    pub wall_clock_epoch: Epoch,
    /// Labels attached to the frame. Omitted from the encoding when empty so
    /// unlabeled frames keep the archived five-field layout.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl FrameMetadata {
    /// Create metadata without labels.
    pub fn new(
        node: impl Into<String>,
        id: impl Into<String>,
        fetched_at: OffsetDateTime,
        wall_clock_slot: impl Into<Slot>,
        wall_clock_epoch: impl Into<Epoch>,
    ) -> Self {
        Self {
            node: node.into(),
            id: id.into(),
            fetched_at,
            wall_clock_slot: wall_clock_slot.into(),
            wall_clock_epoch: wall_clock_epoch.into(),
            labels: Vec::new(),
        }
    }

    /// Attach labels, replacing any already present.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Check that every identity field is present and non-zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.is_empty() {
            return Err(crate::Error::Validation("invalid node".to_string()));
        }
        if self.id.is_empty() {
            return Err(crate::Error::Validation("invalid id".to_string()));
        }
        if is_zero_timestamp(self.fetched_at) {
            return Err(crate::Error::Validation("invalid fetched_at".to_string()));
        }
        if self.wall_clock_slot.0 == 0 {
            return Err(crate::Error::Validation(
                "invalid wall clock slot".to_string(),
            ));
        }
        if self.wall_clock_epoch.0 == 0 {
            return Err(crate::Error::Validation(
                "invalid wall clock epoch".to_string(),
            ));
        }
        Ok(())
    }

    /// Label names with duplicates removed, in ascending order.
    pub fn unique_labels(&self) -> BTreeSet<&str> {
        self.labels.iter().map(String::as_str).collect()
    }
}

/// A fork choice dump together with its metadata.
///
/// The payload is opaque to everything except the codec; it defaults to raw
/// JSON so archived frames round-trip without loss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame<D = serde_json::Value> {
    /// The fork choice dump.
    pub data: D,
    /// Identity and provenance of the dump.
    pub metadata: FrameMetadata,
}

/// A frame whose payload is decoded into the typed fork choice structure.
pub type ForkChoiceFrame = Frame<ForkChoice>;

impl<D> Frame<D> {
    /// Create a frame from a payload and its metadata.
    pub fn new(data: D, metadata: FrameMetadata) -> Self {
        Self { data, metadata }
    }
}

/// Frame metadata as returned by index listings, labels attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFrame {
    pub id: String,
    pub node: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
    pub wall_clock_slot: Slot,
    pub wall_clock_epoch: Epoch,
    /// Attached labels, ascending.
    pub labels: Vec<String>,
}

impl IndexedFrame {
    /// Convert back into frame metadata.
    pub fn into_metadata(self) -> FrameMetadata {
        FrameMetadata {
            node: self.node,
            id: self.id,
            fetched_at: self.fetched_at,
            wall_clock_slot: self.wall_clock_slot,
            wall_clock_epoch: self.wall_clock_epoch,
            labels: self.labels,
        }
    }
}
