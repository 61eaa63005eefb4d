//! Frame listing filter.

use crate::frame::{Epoch, Slot};
use serde::{Deserialize, Serialize};

/// Query parameters for frame listings. Absent fields impose no constraint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFilter {
    /// Exact source node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Exact wall clock slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_clock_slot: Option<Slot>,
    /// Exact wall clock epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_clock_epoch: Option<Epoch>,
    /// Frames must carry every one of these labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl FrameFilter {
    /// A filter that matches every frame.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_slot(mut self, slot: impl Into<Slot>) -> Self {
        self.wall_clock_slot = Some(slot.into());
        self
    }

    pub fn with_epoch(mut self, epoch: impl Into<Epoch>) -> Self {
        self.wall_clock_epoch = Some(epoch.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the filter carries a non-empty label constraint.
    pub fn has_labels(&self) -> bool {
        self.labels.as_ref().is_some_and(|labels| !labels.is_empty())
    }
}
