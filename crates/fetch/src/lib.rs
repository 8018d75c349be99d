//! Pull transfers: fetching a completed file from a remote host by
//! running an external tool (`cp`, `scp` or `lftp`) and checking what
//! it left on disk.

mod command;
mod config;
mod executor;
mod method;

pub use command::{CommandLine, build_command, remap_source};
pub use config::{MountRemap, PullConfig, RetryPolicy, ToolPaths, resolve_username};
pub use executor::{PullJob, TransferExecutor, TransferRecord};
pub use method::TransferMethod;

use framesink_protocol::constants::error_code;
use framesink_transfer::TransferError;

/// Errors produced by a pull transfer.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported transfer method '{0}'")]
    UnsupportedMethod(String),

    #[error("failed to launch '{command}': {source}")]
    CommandLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {}", exit_label(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (killed by signal)".into(),
    }
}

impl FetchError {
    /// Wire error code reported to the caller.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(_) => error_code::IO,
            Self::UnsupportedMethod(_) => error_code::UNSUPPORTED_METHOD,
            Self::CommandLaunch { .. } | Self::CommandFailed { .. } => error_code::TRANSFER_COMMAND,
            Self::Transfer(e) => e.code(),
        }
    }
}
