/// One in-flight chunked transfer.
///
/// A session owns its chunk table and status. It does not lock anything
/// itself; the registry wraps each session in its own mutex so that
/// admissions for one id serialize while other ids proceed in parallel.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use mosaic_types::{ChunkProgress, MethodSwitch, SessionStatus, SessionSummary, TransferMethod};

use crate::error::TransferError;
use crate::hasher::{ChunkHasher, Fingerprint};

/// MIME type used when the sender does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Caller-supplied parameters for a new session.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    pub id: String,
    pub name: String,
    pub declared_size: u64,
    pub total_chunks: u32,
    pub mime_type: String,
    pub transfer_method: TransferMethod,
}

impl SessionDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        declared_size: u64,
        total_chunks: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            declared_size,
            total_chunks,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            transfer_method: TransferMethod::default(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_method(mut self, method: TransferMethod) -> Self {
        self.transfer_method = method;
        self
    }
}

/// Outcome of a successful `accept_chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAdmission {
    /// The chunk was new and is now stored.
    Stored,
    /// The index was already stored; the first write is kept.
    Duplicate,
}

#[derive(Debug)]
pub struct TransferSession {
    id: String,
    name: String,
    declared_size: u64,
    mime_type: String,
    total_chunks: u32,
    chunks: BTreeMap<u32, Bytes>,
    status: SessionStatus,
    failure_reason: Option<String>,
    transfer_method: TransferMethod,
    method_switches: Vec<MethodSwitch>,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl TransferSession {
    /// Validate the descriptor and start a session in `Receiving`.
    pub fn create(descriptor: SessionDescriptor) -> Result<Self, TransferError> {
        if descriptor.id.trim().is_empty() {
            return Err(TransferError::InvalidArgument("id must not be empty".into()));
        }
        if descriptor.name.trim().is_empty() {
            return Err(TransferError::InvalidArgument("name must not be empty".into()));
        }
        if descriptor.total_chunks == 0 {
            return Err(TransferError::InvalidArgument(
                "total_chunks must be positive".into(),
            ));
        }

        let mime_type = if descriptor.mime_type.is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            descriptor.mime_type
        };

        let now = Utc::now();
        Ok(Self {
            id: descriptor.id,
            name: descriptor.name,
            declared_size: descriptor.declared_size,
            mime_type,
            total_chunks: descriptor.total_chunks,
            chunks: BTreeMap::new(),
            status: SessionStatus::Receiving,
            failure_reason: None,
            transfer_method: descriptor.transfer_method,
            method_switches: Vec::new(),
            started_at: now,
            last_activity_at: now,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn transfer_method(&self) -> TransferMethod {
        self.transfer_method
    }

    pub fn method_switches(&self) -> &[MethodSwitch] {
        &self.method_switches
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// Number of distinct chunks stored. Never exceeds `total_chunks`.
    pub fn received_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }

    pub fn chunk(&self, index: u32) -> Option<&Bytes> {
        self.chunks.get(&index)
    }

    // ── Chunk admission ─────────────────────────────────────────────────

    /// Verify and store one chunk.
    ///
    /// A rejected chunk is never stored. Re-delivering an index that is
    /// already stored succeeds without replacing the stored bytes.
    pub fn accept_chunk(
        &mut self,
        index: u32,
        data: Bytes,
        expected: &Fingerprint,
    ) -> Result<ChunkAdmission, TransferError> {
        if self.status != SessionStatus::Receiving {
            return Err(TransferError::InvalidState {
                id: self.id.clone(),
                status: self.status,
            });
        }

        if index >= self.total_chunks {
            return Err(TransferError::OutOfRange {
                index: i64::from(index),
                total: self.total_chunks,
            });
        }

        let actual = ChunkHasher::fingerprint(&data);
        if actual != *expected {
            return Err(TransferError::HashMismatch {
                index,
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }

        self.last_activity_at = Utc::now();

        if self.chunks.contains_key(&index) {
            debug!(transfer_id = %self.id, chunk_index = index, "Duplicate chunk ignored");
            return Ok(ChunkAdmission::Duplicate);
        }

        self.chunks.insert(index, data);
        Ok(ChunkAdmission::Stored)
    }

    /// Record a change of link. Returns the switch, or `None` if unchanged.
    pub fn switch_method(&mut self, to: TransferMethod) -> Option<MethodSwitch> {
        if to == self.transfer_method {
            return None;
        }
        let switch = MethodSwitch {
            from: self.transfer_method,
            to,
            at: Utc::now(),
            received_chunks: self.received_count(),
        };
        self.transfer_method = to;
        self.method_switches.push(switch.clone());
        Some(switch)
    }

    // ── Status transitions ──────────────────────────────────────────────

    /// `Receiving -> Reconstructing`. Only valid once every chunk is stored.
    pub(crate) fn begin_reconstruction(&mut self) -> Result<(), TransferError> {
        if self.status != SessionStatus::Receiving || !self.is_complete() {
            return Err(TransferError::InvalidState {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = SessionStatus::Reconstructing;
        Ok(())
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = SessionStatus::Completed;
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = SessionStatus::Failed;
        self.failure_reason = Some(reason.into());
    }

    // ── Views ───────────────────────────────────────────────────────────

    pub fn progress(&self) -> ChunkProgress {
        ChunkProgress {
            id: self.id.clone(),
            received_chunks: self.received_count(),
            total_chunks: self.total_chunks,
            status: self.status,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            declared_size: self.declared_size,
            mime_type: self.mime_type.clone(),
            total_chunks: self.total_chunks,
            received_chunks: self.received_count(),
            received_indices: self.chunks.keys().copied().collect(),
            status: self.status,
            failure_reason: self.failure_reason.clone(),
            transfer_method: self.transfer_method,
            method_switches: self.method_switches.clone(),
            started_at: self.started_at,
            last_activity_at: self.last_activity_at,
        }
    }
}
