/// Index-ordered reassembly of a completed session.
///
/// Chunks may arrive in any order; they are always joined by ascending
/// index. The reassembler only reads the session, the registry decides
/// what status the session ends up in.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tracing::warn;

use mosaic_types::{ArtifactSummary, MethodSwitch, TransferMethod};

use crate::error::ReconstructionError;
use crate::hasher::{ChunkHasher, Fingerprint};
use crate::session::TransferSession;

/// A fully reassembled file plus its metadata.
#[derive(Debug, Clone)]
pub struct ReconstructedArtifact {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub content_hash: Fingerprint,
    pub payload: Bytes,
    pub total_chunks: u32,
    pub reconstructed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub transfer_method: TransferMethod,
    pub method_switches: Vec<MethodSwitch>,
}

impl ReconstructedArtifact {
    /// Metadata without the payload, safe to broadcast.
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            content_hash: self.content_hash.to_hex(),
            total_chunks: self.total_chunks,
            reconstructed_at: self.reconstructed_at,
            elapsed_ms: self.elapsed_ms,
            transfer_method: self.transfer_method,
            method_switches: self.method_switches.clone(),
        }
    }
}

pub struct Reassembler;

impl Reassembler {
    /// Join every chunk of `session` in index order and fingerprint the result.
    ///
    /// Fails with the first index in `0..total_chunks` that has no data.
    pub fn reconstruct(
        session: &TransferSession,
    ) -> Result<ReconstructedArtifact, ReconstructionError> {
        let total = session.total_chunks();

        let mut parts = Vec::with_capacity(total as usize);
        for index in 0..total {
            let chunk = session
                .chunk(index)
                .ok_or(ReconstructionError::MissingChunk(index))?;
            parts.push(chunk);
        }

        let len: usize = parts.iter().map(|c| c.len()).sum();
        let mut buf = BytesMut::with_capacity(len);
        for part in parts {
            buf.extend_from_slice(part);
        }
        let payload = buf.freeze();
        let content_hash = ChunkHasher::fingerprint(&payload);

        let size = payload.len() as u64;
        if size != session.declared_size() {
            warn!(
                transfer_id = %session.id(),
                declared = session.declared_size(),
                actual = size,
                "Reassembled size differs from declared size"
            );
        }

        let reconstructed_at = Utc::now();
        let elapsed_ms = (reconstructed_at - session.started_at())
            .num_milliseconds()
            .max(0) as u64;

        Ok(ReconstructedArtifact {
            id: session.id().to_string(),
            name: session.name().to_string(),
            size,
            mime_type: session.mime_type().to_string(),
            content_hash,
            payload,
            total_chunks: total,
            reconstructed_at,
            elapsed_ms,
            transfer_method: session.transfer_method(),
            method_switches: session.method_switches().to_vec(),
        })
    }
}
