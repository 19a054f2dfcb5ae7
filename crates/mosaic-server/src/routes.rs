use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use mosaic_transfer::{
    BroadcastPublisher, ChunkHasher, Fingerprint, SessionDescriptor, SessionSummary,
    TransferError, TransferMethod, TransferRegistry,
};
use mosaic_types::ArtifactSummary;
use mosaic_types::api::{
    ArtifactResponse, ChunkRequest, ChunkResponse, HealthResponse, InitTransferRequest,
    InitTransferResponse, ResetResponse, SwitchMethodRequest, SwitchMethodResponse,
};

use crate::error::ApiError;
use crate::gateway;

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: TransferRegistry,
    pub events: Arc<BroadcastPublisher>,
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/api/transfer/init", post(init_transfer))
        .route("/api/transfer/chunk", post(submit_chunk))
        .route("/api/transfer/switch-method", post(switch_method))
        .route("/api/files", get(list_files))
        .route("/api/files/{id}", get(get_file))
        .route("/api/transfers", get(list_transfers))
        .route("/api/reset", post(reset))
        .route("/api/health", get(health))
        .route("/ws", get(gateway::ws_upgrade))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/transfer/init: Register a new transfer.
pub async fn init_transfer(
    State(state): State<AppState>,
    Json(req): Json<InitTransferRequest>,
) -> Result<Json<InitTransferResponse>, ApiError> {
    let total_chunks = u32::try_from(req.total_chunks).map_err(|_| {
        TransferError::InvalidArgument(format!("invalid totalChunks: {}", req.total_chunks))
    })?;
    let method = req.transfer_method.unwrap_or_default();

    let descriptor = SessionDescriptor::new(req.file_id, req.file_name, req.file_size, total_chunks)
        .with_mime_type(req.mime_type.unwrap_or_default())
        .with_method(method);
    let summary = state.registry.init(descriptor).await?;

    Ok(Json(InitTransferResponse {
        success: true,
        file_id: summary.id,
        transfer_method: summary.transfer_method,
    }))
}

/// POST /api/transfer/chunk: One base64 chunk plus its hex SHA-256.
///
/// Every rejection carries the session's current progress (when the session
/// exists) so the sender can resend.
pub async fn submit_chunk(
    State(state): State<AppState>,
    Json(req): Json<ChunkRequest>,
) -> Result<Json<ChunkResponse>, ApiError> {
    let id = req.file_id.clone();
    match admit_chunk(&state, req).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => Err(ApiError::from(e).with_progress(state.registry.progress(&id).await)),
    }
}

async fn admit_chunk(state: &AppState, req: ChunkRequest) -> Result<ChunkResponse, TransferError> {
    let Ok(index) = u32::try_from(req.chunk_index) else {
        let progress = state
            .registry
            .progress(&req.file_id)
            .await
            .ok_or_else(|| TransferError::NotFound(req.file_id.clone()))?;
        return Err(TransferError::OutOfRange {
            index: req.chunk_index,
            total: progress.total_chunks,
        });
    };

    if let Some(method) = req.transfer_method {
        state.registry.switch_method(&req.file_id, method).await?;
    }

    let data = Bytes::from(BASE64.decode(req.chunk_data.as_bytes()).map_err(|e| {
        TransferError::InvalidArgument(format!("chunkData is not valid base64: {e}"))
    })?);

    let hash: Fingerprint = match req.chunk_hash.parse() {
        Ok(hash) => hash,
        Err(e) => {
            warn!(transfer_id = %req.file_id, chunk_index = index, "Unparsable chunk hash: {}", e);
            return Err(TransferError::HashMismatch {
                index,
                expected: req.chunk_hash,
                actual: ChunkHasher::fingerprint(&data).to_hex(),
            });
        }
    };

    let progress = state.registry.submit_chunk(&req.file_id, index, data, &hash).await?;
    Ok(ChunkResponse::from(progress))
}

/// POST /api/transfer/switch-method: Sender changed link.
pub async fn switch_method(
    State(state): State<AppState>,
    Json(req): Json<SwitchMethodRequest>,
) -> Result<Json<SwitchMethodResponse>, ApiError> {
    let current_method: TransferMethod = state
        .registry
        .switch_method(&req.file_id, req.new_method)
        .await?;
    Ok(Json(SwitchMethodResponse {
        success: true,
        current_method,
    }))
}

/// GET /api/files: Retained artifacts without payloads, newest first.
pub async fn list_files(State(state): State<AppState>) -> Json<Vec<ArtifactSummary>> {
    Json(state.registry.list_artifacts().await)
}

/// GET /api/files/{id}: One artifact with its base64 payload.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArtifactResponse>, ApiError> {
    let artifact = state.registry.get_artifact(&id).await?;
    Ok(Json(ArtifactResponse {
        artifact: artifact.summary(),
        data: BASE64.encode(&artifact.payload),
    }))
}

/// GET /api/transfers: Active sessions.
pub async fn list_transfers(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list_sessions().await)
}

/// POST /api/reset: Drop all sessions and artifacts.
pub async fn reset(State(state): State<AppState>) -> Result<Json<ResetResponse>, ApiError> {
    state.registry.reset().await?;
    Ok(Json(ResetResponse { success: true }))
}

/// GET /api/health: Liveness plus counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_transfers: state.registry.session_count().await,
        reconstructed_files: state.registry.artifact_count().await,
        connected_clients: state.events.subscriber_count(),
        supported_methods: TransferMethod::ALL.to_vec(),
    })
}
