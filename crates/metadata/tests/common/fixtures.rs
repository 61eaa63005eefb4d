//! Test fixtures for generating frame metadata.

use forkchoice_core::FrameMetadata;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

/// Slots per epoch on mainnet.
pub const SLOTS_PER_EPOCH: u64 = 32;

/// Reference capture time; fixtures are offset from it in whole seconds.
pub const BASE_TIME: OffsetDateTime = datetime!(2023-03-23 14:00:00 UTC);

/// Frame metadata captured `offset_secs` after [`BASE_TIME`].
pub fn frame(node: &str, id: &str, offset_secs: i64, slot: u64) -> FrameMetadata {
    FrameMetadata::new(
        node,
        id,
        BASE_TIME + Duration::seconds(offset_secs),
        slot,
        (slot / SLOTS_PER_EPOCH).max(1),
    )
}

/// Frame metadata with a random id.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn random_frame(node: &str, offset_secs: i64, slot: u64) -> FrameMetadata {
    frame(node, &uuid::Uuid::new_v4().to_string(), offset_secs, slot)
}

/// A token that never fires.
#[allow(dead_code)]
pub fn live() -> CancellationToken {
    CancellationToken::new()
}
