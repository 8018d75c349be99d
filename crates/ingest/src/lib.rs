//! The ingestion service: reassembles pushed files, runs pulls, and
//! tells a [`Notifier`] once per delivered file.

mod config;
mod notifier;
mod service;

pub use config::IngestConfig;
pub use notifier::{CommandNotifier, Delivery, LogNotifier, Notifier};
pub use service::{IngestOutcome, IngestService};

use framesink_fetch::FetchError;
use framesink_transfer::TransferError;

/// Errors returned by [`IngestService`] calls.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        Self::Transfer(TransferError::Io(e))
    }
}

impl IngestError {
    /// Wire error code reported to the caller.
    pub fn code(&self) -> i32 {
        match self {
            Self::Transfer(e) => e.code(),
            Self::Fetch(e) => e.code(),
        }
    }
}
