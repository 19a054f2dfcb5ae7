use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Link the sender reports using for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    #[default]
    Wifi,
    Bluetooth,
}

impl TransferMethod {
    pub const ALL: [TransferMethod; 2] = [TransferMethod::Wifi, TransferMethod::Bluetooth];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a transfer session.
///
/// `Receiving -> Reconstructing -> Completed`, with `Failed` reachable from
/// either of the first two. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Receiving,
    Reconstructing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Receiving => "receiving",
            Self::Reconstructing => "reconstructing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded change of transfer method part way through a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSwitch {
    pub from: TransferMethod,
    pub to: TransferMethod,
    pub at: DateTime<Utc>,
    /// Chunks already received when the switch happened.
    pub received_chunks: u32,
}

/// Progress of one session, returned for every chunk submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub id: String,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub status: SessionStatus,
}

impl ChunkProgress {
    pub fn is_complete(&self) -> bool {
        self.received_chunks == self.total_chunks
    }

    /// Progress in percent, 0.0 - 100.0.
    pub fn percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        f64::from(self.received_chunks) / f64::from(self.total_chunks) * 100.0
    }
}

/// View of an in-flight session. Never carries chunk bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub declared_size: u64,
    pub mime_type: String,
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub received_indices: Vec<u32>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub transfer_method: TransferMethod,
    pub method_switches: Vec<MethodSwitch>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Metadata of a reassembled file, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Hex SHA-256 of the reassembled bytes.
    pub content_hash: String,
    pub total_chunks: u32,
    pub reconstructed_at: DateTime<Utc>,
    /// Milliseconds between session init and reassembly.
    pub elapsed_ms: u64,
    pub transfer_method: TransferMethod,
    pub method_switches: Vec<MethodSwitch>,
}
