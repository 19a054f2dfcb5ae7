//! Shared types for the mosaic chunked transfer service.
//!
//! Everything here is plain data: the event stream observers consume, the
//! summaries the registry hands out, and the JSON shapes of the HTTP binding.

pub mod api;
pub mod events;
pub mod models;

pub use events::TransferEvent;
pub use models::{
    ArtifactSummary, ChunkProgress, MethodSwitch, SessionStatus, SessionSummary, TransferMethod,
};
