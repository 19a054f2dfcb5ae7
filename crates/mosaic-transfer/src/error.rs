use mosaic_types::SessionStatus;

/// Errors returned by session and registry operations.
///
/// Every variant is local to one session; none of them leaves other
/// sessions in a different state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transfer already active: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("chunk index {index} out of range (total chunks: {total})")]
    OutOfRange { index: i64, total: u32 },

    #[error("hash mismatch for chunk {index}: expected {expected}, got {actual}")]
    HashMismatch {
        index: u32,
        expected: String,
        actual: String,
    },

    #[error("transfer {id} is {status}, not accepting chunks")]
    InvalidState { id: String, status: SessionStatus },
}

impl TransferError {
    /// Stable code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::OutOfRange { .. } => "out_of_range",
            Self::HashMismatch { .. } => "hash_mismatch",
            Self::InvalidState { .. } => "invalid_state",
        }
    }

    /// Whether resending the same chunk can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::HashMismatch { .. })
    }
}

/// Reassembly failures. Terminal for the session that hit them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconstructionError {
    #[error("missing chunk {0}")]
    MissingChunk(u32),
}
