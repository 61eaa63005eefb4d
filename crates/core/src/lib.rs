//! Core domain types for the fork-choice frame index.
//!
//! This crate defines the data model shared by the index and its callers:
//! - Frame metadata, validation and listing results
//! - The frame blob codec (gzip-compressed JSON)
//! - Listing filters
//! - Typed fork choice payloads
//! - Index configuration

pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod forkchoice;
pub mod frame;
pub mod source;

pub use config::{AppConfig, Engine, IndexerConfig};
pub use error::{Error, Result};
pub use filter::FrameFilter;
pub use forkchoice::ForkChoice;
pub use frame::{Epoch, ForkChoiceFrame, Frame, FrameMetadata, IndexedFrame, Slot};
pub use source::SourceSummary;

/// Maximum number of rows any listing returns.
pub const MAX_LIST_RESULTS: u32 = 1000;
