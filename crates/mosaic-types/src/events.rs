use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ArtifactSummary, TransferMethod};

/// Events published by the transfer registry to its observers.
///
/// Emission order is preserved per transfer id. Events never carry file
/// payloads, only ids, counts and hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum TransferEvent {
    /// A new session was registered
    SessionStarted {
        id: String,
        name: String,
        declared_size: u64,
        total_chunks: u32,
        mime_type: String,
        transfer_method: TransferMethod,
        started_at: DateTime<Utc>,
    },

    /// A chunk passed verification and was stored
    ChunkAccepted {
        id: String,
        name: String,
        index: u32,
        /// First 16 hex chars of the chunk hash
        hash_prefix: String,
        received_chunks: u32,
        total_chunks: u32,
        transfer_method: TransferMethod,
    },

    /// The sender moved to a different link mid-transfer
    MethodSwitched {
        id: String,
        name: String,
        from: TransferMethod,
        to: TransferMethod,
        /// Percent of chunks received at the time of the switch
        progress: f64,
    },

    /// All chunks arrived and reassembly began
    ReconstructionStarted { id: String, name: String },

    /// Reassembly succeeded; the artifact is retained
    ReconstructionCompleted { artifact: ArtifactSummary },

    /// Reassembly failed; the session is now failed
    ReconstructionFailed { id: String, reason: String },

    /// A stalled session was evicted after its idle timeout
    SessionExpired {
        id: String,
        name: String,
        received_chunks: u32,
        total_chunks: u32,
    },

    /// All sessions and artifacts were dropped
    RegistryReset,
}

impl TransferEvent {
    /// Returns the transfer id this event belongs to.
    /// `RegistryReset` is global and returns `None`.
    pub fn transfer_id(&self) -> Option<&str> {
        match self {
            Self::SessionStarted { id, .. }
            | Self::ChunkAccepted { id, .. }
            | Self::MethodSwitched { id, .. }
            | Self::ReconstructionStarted { id, .. }
            | Self::ReconstructionFailed { id, .. }
            | Self::SessionExpired { id, .. } => Some(id),
            Self::ReconstructionCompleted { artifact } => Some(&artifact.id),
            Self::RegistryReset => None,
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::ChunkAccepted { .. } => "chunk_accepted",
            Self::MethodSwitched { .. } => "method_switched",
            Self::ReconstructionStarted { .. } => "reconstruction_started",
            Self::ReconstructionCompleted { .. } => "reconstruction_completed",
            Self::ReconstructionFailed { .. } => "reconstruction_failed",
            Self::SessionExpired { .. } => "session_expired",
            Self::RegistryReset => "registry_reset",
        }
    }
}
