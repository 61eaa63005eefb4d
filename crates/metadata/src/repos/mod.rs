//! Repository traits for index operations.

pub mod frames;
pub mod sources;

pub use frames::FrameRepo;
pub use sources::SourceRepo;
