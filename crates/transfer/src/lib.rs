//! Chunk reassembly for pushed files, plus the storage and verification
//! rules shared by push and pull transfers.
//!
//! A [`TransferSession`] owns the output handle of one in-flight file and
//! serializes every write to it; the [`SessionTable`] guarantees at most
//! one session per file identifier.

mod checksum;
mod codec;
mod progress;
mod session;
mod storage;
mod table;
mod validation;

pub use checksum::{ChecksumAlgorithm, checksum_bytes, file_checksum, verify_checksum, verify_size};
pub use codec::decode_chunk;
pub use progress::Throughput;
pub use session::{ChunkProgress, ChunkWrite, CompletedFile, SessionKind, TransferSession};
pub use storage::{StoragePolicy, destination_path, rename_if_exists};
pub use table::{EvictedSession, SessionTable};
pub use validation::{validate_file_name, validate_group};

use framesink_protocol::constants::error_code;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot decode chunk: {0}")]
    Decode(String),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("a transfer for '{0}' is already active")]
    DuplicateSession(String),

    #[error("transfer of '{0}' already finished")]
    SessionFinished(String),

    #[error("chunk for '{id}' declares {declared} chunks, session expects {expected}")]
    InconsistentCount {
        id: String,
        expected: u32,
        declared: u32,
    },

    #[error("file size ({actual}) does not match sent size ({expected})")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("checksums don't match: received '{actual}', sent '{expected}'")]
    ChecksumMismatch { expected: String, actual: String },
}

impl TransferError {
    /// Wire error code reported to the caller.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(_) => error_code::IO,
            Self::Decode(_) => error_code::DECODE,
            Self::InvalidChunk(_) => error_code::BAD_REQUEST,
            Self::InvalidPath(_) => error_code::INVALID_PATH,
            Self::DuplicateSession(_) | Self::SessionFinished(_) => error_code::DUPLICATE_SESSION,
            Self::InconsistentCount { .. } => error_code::INCONSISTENT_COUNT,
            Self::SizeMismatch { .. } => error_code::SIZE_MISMATCH,
            Self::ChecksumMismatch { .. } => error_code::CHECKSUM_MISMATCH,
        }
    }
}
