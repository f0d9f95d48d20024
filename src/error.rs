//! Error types for the LRC repair engine

use thiserror::Error;

use crate::lrc::status::ShardStatus;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, decoding or rebuilding LRC shards
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Input Validation Errors
    // =========================================================================
    /// Bad session parameters or shard index
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Shard payload length does not match the session's shard size
    #[error("Shard size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Illegal shard status change
    #[error("Invalid status transition for shard {index}: {from} -> {to}")]
    InvalidTransition {
        index: usize,
        from: ShardStatus,
        to: ShardStatus,
    },

    /// A requested shard arrived ahead of an earlier request
    #[error("Shard {actual} supplied out of order, expected shard {expected}")]
    UnexpectedShard { expected: usize, actual: usize },

    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// Buffer could not be obtained
    #[error("Allocation of {size} bytes failed")]
    AllocationFailure { size: usize },

    /// Maximum number of concurrent sessions reached
    #[error("Session limit reached: at most {max} concurrent sessions")]
    SessionLimit { max: usize },

    // =========================================================================
    // Reconstruction Errors
    // =========================================================================
    /// The missing-shard pattern exceeds what global recovery can resolve
    #[error("Unrecoverable topology for shard {lost_index}: {missing} original shards missing")]
    UnrecoverableTopology { lost_index: usize, missing: usize },

    /// The algebra engine rejected its input
    #[error("Algebra engine failure: {0}")]
    EngineFailure(String),

    /// The available parity equations do not determine every unknown
    #[error("Insufficient equations: {unknowns} unknown shards, rank {rank}")]
    InsufficientEquations { unknowns: usize, rank: usize },

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Result requested before completion
    #[error("Reconstruction result is not ready")]
    NotReady,

    /// Operation on a freed or unknown session
    #[error("Session handle is stale or has been freed")]
    StaleHandle,

    /// Another caller is driving this session
    #[error("Session is in use by another caller")]
    ConcurrentAccess,
}

impl Error {
    /// Negative status code for callers that speak the integer protocol
    /// (`0` need more, `>0` complete, `<0` error).
    pub fn status_code(&self) -> i16 {
        match self {
            Error::InvalidArgument(_) => -1,
            Error::SizeMismatch { .. } => -2,
            Error::InvalidTransition { .. } => -3,
            Error::UnexpectedShard { .. } => -4,
            Error::AllocationFailure { .. } => -5,
            Error::UnrecoverableTopology { .. } => -6,
            Error::EngineFailure(_) => -7,
            Error::InsufficientEquations { .. } => -8,
            Error::NotReady => -9,
            Error::StaleHandle => -10,
            Error::ConcurrentAccess => -11,
            Error::SessionLimit { .. } => -12,
            Error::Config(_) => -13,
            Error::Io(_) => -14,
            Error::Serialization(_) => -15,
        }
    }

    /// Whether the error comes from input validation and left state untouched
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::SizeMismatch { .. }
                | Error::InvalidTransition { .. }
                | Error::UnexpectedShard { .. }
        )
    }
}

/// Allocate a zeroed buffer, reporting allocator refusal instead of aborting.
pub(crate) fn try_alloc_zeroed(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| Error::AllocationFailure { size })?;
    buf.resize(size, 0);
    Ok(buf)
}
