use serde::{Deserialize, Serialize};

use crate::models::{ArtifactSummary, ChunkProgress, SessionStatus, SessionSummary, TransferMethod};

// -- Transfer init --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitTransferRequest {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    pub total_chunks: i64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub transfer_method: Option<TransferMethod>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitTransferResponse {
    pub success: bool,
    pub file_id: String,
    pub transfer_method: TransferMethod,
}

// -- Chunks --

/// One chunk as sent over JSON: base64 payload plus hex SHA-256.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub file_id: String,
    pub chunk_index: i64,
    pub chunk_data: String,
    pub chunk_hash: String,
    #[serde(default)]
    pub transfer_method: Option<TransferMethod>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub success: bool,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub status: SessionStatus,
    pub complete: bool,
}

impl From<ChunkProgress> for ChunkResponse {
    fn from(progress: ChunkProgress) -> Self {
        Self {
            success: true,
            complete: progress.is_complete(),
            received_chunks: progress.received_chunks,
            total_chunks: progress.total_chunks,
            status: progress.status,
        }
    }
}

// -- Method switching --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchMethodRequest {
    pub file_id: String,
    pub new_method: TransferMethod,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchMethodResponse {
    pub success: bool,
    pub current_method: TransferMethod,
}

// -- Files --

/// A retained artifact including its base64 payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResponse {
    #[serde(flatten)]
    pub artifact: ArtifactSummary,
    pub data: String,
}

// -- Misc --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_transfers: usize,
    pub reconstructed_files: usize,
    pub connected_clients: usize,
    pub supported_methods: Vec<TransferMethod>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    /// Resending the same request may succeed.
    pub retriable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ChunkProgress>,
}

/// First frame sent to a newly connected event stream client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamFrame {
    Snapshot {
        artifacts: Vec<ArtifactSummary>,
        sessions: Vec<SessionSummary>,
    },
}
