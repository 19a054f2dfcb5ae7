/// Mosaic transfer core: chunked file reception with per-chunk integrity.
///
/// - SHA-256 fingerprints shared by chunk and whole-file verification
/// - Per-session state machine with idempotent chunk admission
/// - Index-ordered reassembly into a retained artifact
/// - Registry with bounded artifact retention and idle eviction
/// - Fire-and-forget event publishing to any number of observers

pub mod error;
pub mod hasher;
pub mod publisher;
pub mod reassembler;
pub mod registry;
pub mod session;

// Re-export key types for convenience.
pub use error::{ReconstructionError, TransferError};
pub use hasher::{ChunkHasher, Fingerprint, FingerprintParseError, FINGERPRINT_LEN};
pub use publisher::{BroadcastPublisher, EventPublisher, NullPublisher, DEFAULT_EVENT_BUFFER};
pub use reassembler::{Reassembler, ReconstructedArtifact};
pub use registry::{RegistryConfig, TransferRegistry, DEFAULT_RETENTION};
pub use session::{ChunkAdmission, SessionDescriptor, TransferSession, DEFAULT_MIME_TYPE};

pub use mosaic_types::{
    ArtifactSummary, ChunkProgress, MethodSwitch, SessionStatus, SessionSummary, TransferEvent,
    TransferMethod,
};
