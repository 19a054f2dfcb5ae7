//! Transfer registry
//!
//! Owns the active sessions and the bounded list of reassembled artifacts.
//!
//! Locking:
//! - each session sits behind its own `Mutex`; chunk admission, status
//!   transitions and reassembly for one id run under it
//! - the session map and the artifact list each have a `RwLock`, held only
//!   for lookup/insert/remove, never while hashing or concatenating
//! - lock order is session -> sessions map -> artifact list; while a map
//!   lock is held a session mutex is only ever `try_lock`ed
//! - completion stores the artifact and removes the session before the
//!   session lock is released, so no other caller sees a finished session

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use mosaic_types::{
    ArtifactSummary, ChunkProgress, SessionStatus, SessionSummary, TransferEvent, TransferMethod,
};

use crate::error::{ReconstructionError, TransferError};
use crate::hasher::Fingerprint;
use crate::publisher::EventPublisher;
use crate::reassembler::{Reassembler, ReconstructedArtifact};
use crate::session::{ChunkAdmission, SessionDescriptor, TransferSession};

/// Number of artifacts kept when not configured otherwise.
pub const DEFAULT_RETENTION: usize = 10;

/// Length of the hash prefix carried by `ChunkAccepted`.
const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum retained artifacts; the oldest is evicted first.
    pub retention: usize,
    /// Sessions still receiving with no chunk activity for this long are
    /// evicted by `evict_idle`. `None` keeps them until `reset`.
    pub idle_timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            idle_timeout: None,
        }
    }
}

type SessionHandle = Arc<Mutex<TransferSession>>;

/// Creates, looks up and retires transfer sessions.
#[derive(Clone)]
pub struct TransferRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Active sessions by id. Completed sessions are removed; failed ones stay
    /// until replaced or reset.
    sessions: RwLock<HashMap<String, SessionHandle>>,

    /// Retained artifacts, most recent first.
    artifacts: RwLock<VecDeque<Arc<ReconstructedArtifact>>>,

    publisher: Arc<dyn EventPublisher>,

    config: RegistryConfig,
}

impl TransferRegistry {
    pub fn new(config: RegistryConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        let config = RegistryConfig {
            retention: config.retention.max(1),
            ..config
        };
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                artifacts: RwLock::new(VecDeque::new()),
                publisher,
                config,
            }),
        }
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Register a new session.
    ///
    /// Fails with `AlreadyExists` while a non-terminal session holds the id.
    /// A failed session under the same id is replaced.
    pub async fn init(&self, descriptor: SessionDescriptor) -> Result<SessionSummary, TransferError> {
        let session = TransferSession::create(descriptor)?;
        let summary = session.summary();

        loop {
            let existing = self.inner.sessions.read().await.get(&summary.id).cloned();
            if let Some(existing) = &existing {
                // Waits out any in-flight admission or reassembly.
                if !existing.lock().await.status().is_terminal() {
                    return Err(TransferError::AlreadyExists(summary.id));
                }
            }

            let mut sessions = self.inner.sessions.write().await;
            let unchanged = match (sessions.get(&summary.id), &existing) {
                (None, None) => true,
                (Some(current), Some(seen)) => Arc::ptr_eq(current, seen),
                _ => false,
            };
            if !unchanged {
                // The id changed hands between the two locks; look again.
                continue;
            }
            sessions.insert(summary.id.clone(), Arc::new(Mutex::new(session)));

            // Published under the map lock so it precedes any chunk event.
            self.inner.publisher.publish(TransferEvent::SessionStarted {
                id: summary.id.clone(),
                name: summary.name.clone(),
                declared_size: summary.declared_size,
                total_chunks: summary.total_chunks,
                mime_type: summary.mime_type.clone(),
                transfer_method: summary.transfer_method,
                started_at: summary.started_at,
            });
            break;
        }

        info!(
            transfer_id = %summary.id,
            file_name = %summary.name,
            file_size = summary.declared_size,
            chunks = summary.total_chunks,
            method = %summary.transfer_method,
            "Initialized transfer"
        );

        Ok(summary)
    }

    /// Verify and store one chunk, reassembling the file when it is the last.
    ///
    /// Returns the session's progress after the chunk. When this call
    /// completes the transfer, the returned status is `Completed` (or
    /// `Failed` if reassembly failed) and the session is no longer active.
    pub async fn submit_chunk(
        &self,
        id: &str,
        index: u32,
        data: Bytes,
        hash: &Fingerprint,
    ) -> Result<ChunkProgress, TransferError> {
        let handle = self.session_handle(id).await?;
        let mut session = handle.lock().await;

        // Reset or eviction may have dropped the session while we waited.
        if !self.is_registered(id, &handle).await {
            return Err(TransferError::NotFound(id.to_string()));
        }

        let admission = match session.accept_chunk(index, data, hash) {
            Ok(admission) => admission,
            Err(e) => {
                warn!(transfer_id = %id, chunk_index = index, "Chunk rejected: {}", e);
                return Err(e);
            }
        };

        if admission == ChunkAdmission::Duplicate {
            return Ok(session.progress());
        }

        debug!(
            transfer_id = %id,
            chunk_index = index,
            received = session.received_count(),
            total = session.total_chunks(),
            hash = %hash.short(8),
            "Chunk accepted"
        );

        self.inner.publisher.publish(TransferEvent::ChunkAccepted {
            id: id.to_string(),
            name: session.name().to_string(),
            index,
            hash_prefix: hash.short(HASH_PREFIX_LEN),
            received_chunks: session.received_count(),
            total_chunks: session.total_chunks(),
            transfer_method: session.transfer_method(),
        });

        if !session.is_complete() {
            return Ok(session.progress());
        }

        // Only the call that stores the last chunk gets here: later calls
        // see a status other than Receiving and are rejected.
        session.begin_reconstruction()?;
        self.inner.publisher.publish(TransferEvent::ReconstructionStarted {
            id: id.to_string(),
            name: session.name().to_string(),
        });
        info!(transfer_id = %id, file_name = %session.name(), "Reconstructing file");

        let outcome = Reassembler::reconstruct(&session);
        Ok(self.conclude(&handle, &mut session, outcome).await)
    }

    /// Settle a session that has left `Reconstructing`.
    ///
    /// Runs with the session lock held, so `init` and eviction cannot act on
    /// the id until the artifact is stored and the session removed.
    async fn conclude(
        &self,
        handle: &SessionHandle,
        session: &mut TransferSession,
        outcome: Result<ReconstructedArtifact, ReconstructionError>,
    ) -> ChunkProgress {
        let id = session.id().to_string();

        let artifact = match outcome {
            Ok(artifact) => artifact,
            Err(e) => {
                self.fail(session, e.to_string());
                return session.progress();
            }
        };

        let mut sessions = self.inner.sessions.write().await;
        let registered = sessions
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, handle));
        if !registered {
            drop(sessions);
            warn!(transfer_id = %id, "Registry reset during reconstruction; artifact discarded");
            self.fail(session, "registry reset during reconstruction".to_string());
            return session.progress();
        }

        session.mark_completed();
        sessions.remove(&id);

        let summary = artifact.summary();
        {
            let mut artifacts = self.inner.artifacts.write().await;
            artifacts.push_front(Arc::new(artifact));
            while artifacts.len() > self.inner.config.retention {
                if let Some(evicted) = artifacts.pop_back() {
                    debug!(transfer_id = %evicted.id, file_name = %evicted.name, "Evicted oldest artifact");
                }
            }
        }

        info!(
            transfer_id = %summary.id,
            file_name = %summary.name,
            size = summary.size,
            elapsed_ms = summary.elapsed_ms,
            hash = %&summary.content_hash[..16],
            "File reconstructed"
        );

        self.inner
            .publisher
            .publish(TransferEvent::ReconstructionCompleted { artifact: summary });

        session.progress()
    }

    fn fail(&self, session: &mut TransferSession, reason: String) {
        warn!(transfer_id = %session.id(), "Reconstruction failed: {}", reason);
        session.mark_failed(reason.clone());
        self.inner.publisher.publish(TransferEvent::ReconstructionFailed {
            id: session.id().to_string(),
            reason,
        });
    }

    /// Record that the sender moved to another link.
    ///
    /// Returns the method now in effect. Unchanged methods are a no-op.
    pub async fn switch_method(
        &self,
        id: &str,
        method: TransferMethod,
    ) -> Result<TransferMethod, TransferError> {
        let handle = self.session_handle(id).await?;
        let mut session = handle.lock().await;

        if let Some(switch) = session.switch_method(method) {
            let progress = session.progress().percent();
            info!(
                transfer_id = %id,
                from = %switch.from,
                to = %switch.to,
                received = switch.received_chunks,
                total = session.total_chunks(),
                "Transfer method switched"
            );
            self.inner.publisher.publish(TransferEvent::MethodSwitched {
                id: id.to_string(),
                name: session.name().to_string(),
                from: switch.from,
                to: switch.to,
                progress,
            });
        }

        Ok(session.transfer_method())
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Retained artifacts, most recent first.
    pub async fn list_artifacts(&self) -> Vec<ArtifactSummary> {
        let artifacts = self.inner.artifacts.read().await;
        artifacts.iter().map(|a| a.summary()).collect()
    }

    /// Most recent retained artifact with this id.
    pub async fn get_artifact(&self, id: &str) -> Result<Arc<ReconstructedArtifact>, TransferError> {
        let artifacts = self.inner.artifacts.read().await;
        artifacts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(id.to_string()))
    }

    /// Active sessions ordered by start time.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let handles = self.handles().await;
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.lock().await.summary());
        }
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Current progress of an active session.
    pub async fn progress(&self, id: &str) -> Option<ChunkProgress> {
        let handle = self.session_handle(id).await.ok()?;
        let session = handle.lock().await;
        Some(session.progress())
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn artifact_count(&self) -> usize {
        self.inner.artifacts.read().await.len()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Drop every session and artifact.
    ///
    /// A reassembly already running finishes as `Failed`.
    pub async fn reset(&self) -> Result<(), TransferError> {
        let mut sessions = self.inner.sessions.write().await;
        let mut artifacts = self.inner.artifacts.write().await;
        let dropped_sessions = sessions.len();
        let dropped_artifacts = artifacts.len();
        sessions.clear();
        artifacts.clear();
        self.inner.publisher.publish(TransferEvent::RegistryReset);

        info!(
            sessions = dropped_sessions,
            artifacts = dropped_artifacts,
            "Registry reset"
        );
        Ok(())
    }

    /// Evict stalled sessions using the configured idle timeout.
    ///
    /// Returns the evicted ids; empty when no timeout is configured.
    pub async fn evict_idle(&self) -> Vec<String> {
        let Some(timeout) = self.inner.config.idle_timeout else {
            return Vec::new();
        };
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return Vec::new();
        };
        self.evict_idle_since(Utc::now() - timeout).await
    }

    /// Evict sessions still receiving whose last chunk activity is before `cutoff`.
    pub async fn evict_idle_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.inner.sessions.write().await;
        let mut expired = Vec::new();

        sessions.retain(|_, handle| {
            // Busy sessions are active by definition.
            let Ok(session) = handle.try_lock() else {
                return true;
            };
            if session.status() == SessionStatus::Receiving && session.last_activity_at() < cutoff {
                expired.push((session.progress(), session.name().to_string()));
                return false;
            }
            true
        });

        let mut evicted = Vec::with_capacity(expired.len());
        for (progress, name) in expired {
            info!(
                transfer_id = %progress.id,
                received = progress.received_chunks,
                total = progress.total_chunks,
                "Evicted idle transfer"
            );
            self.inner.publisher.publish(TransferEvent::SessionExpired {
                id: progress.id.clone(),
                name,
                received_chunks: progress.received_chunks,
                total_chunks: progress.total_chunks,
            });
            evicted.push(progress.id);
        }

        evicted
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    async fn session_handle(&self, id: &str) -> Result<SessionHandle, TransferError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(id.to_string()))
    }

    async fn is_registered(&self, id: &str, handle: &SessionHandle) -> bool {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    async fn handles(&self) -> Vec<SessionHandle> {
        let sessions = self.inner.sessions.read().await;
        sessions.values().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
