use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use framesink_protocol::FileMetadata;
use framesink_transfer::{ChecksumAlgorithm, Throughput, verify_checksum, verify_size};
use serde::Serialize;

use crate::FetchError;
use crate::command::build_command;
use crate::config::PullConfig;
use crate::method::TransferMethod;

/// One file to fetch.
#[derive(Debug, Clone)]
pub struct PullJob {
    pub remote_path: String,
    pub dest_path: PathBuf,
    pub metadata: FileMetadata,
}

/// What happened during one pull.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub src_host: String,
    pub src_path: String,
    pub dst_host: String,
    pub dst_path: PathBuf,
    pub method: TransferMethod,
    pub command: String,
    pub exit_code: Option<i32>,
    pub bytes: u64,
    /// Computed digest when verification ran, else the sender's value.
    pub checksum: Option<String>,
    #[serde(skip)]
    elapsed: std::time::Duration,
}

impl TransferRecord {
    pub fn throughput(&self) -> Throughput {
        Throughput::new(self.bytes, self.elapsed)
    }
}

/// Runs pull transfers with a fixed [`PullConfig`].
///
/// Every call blocks the current thread until the external tool exits.
#[derive(Debug, Clone)]
pub struct TransferExecutor {
    config: PullConfig,
    local_host: String,
}

impl TransferExecutor {
    pub fn new(config: PullConfig) -> Self {
        let local_host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".into());
        Self { config, local_host }
    }

    pub fn config(&self) -> &PullConfig {
        &self.config
    }

    /// Fetches `job.remote_path` into `job.dest_path`.
    ///
    /// After the tool exits the stored size is checked first, then the
    /// exit status, then the checksum when `verify` is set.
    pub fn fetch(
        &self,
        job: &PullJob,
        verify: Option<ChecksumAlgorithm>,
    ) -> Result<TransferRecord, FetchError> {
        let method: TransferMethod = self.config.method.parse()?;
        let command = build_command(method, &self.config, &job.remote_path, &job.dest_path);
        let command_str = command.to_string();

        tracing::info!(
            %method,
            src = %job.remote_path,
            dst = %job.dest_path.display(),
            "starting pull"
        );
        tracing::debug!(command = %command_str, "running transfer command");

        let started_at = Local::now();
        let start = Instant::now();
        let output = command
            .to_command()
            .stdin(std::process::Stdio::null())
            .output()
            .map_err(|source| {
                tracing::error!(command = %command_str, error = %source, "transfer command failed to launch");
                FetchError::CommandLaunch {
                    command: command_str.clone(),
                    source,
                }
            })?;
        let elapsed = start.elapsed();
        let finished_at = Local::now();
        let exit_code = output.status.code();

        let bytes = stored_size(&job.dest_path)?;
        if let Err(e) = verify_size(job.metadata.size, bytes) {
            tracing::error!(command = %command_str, error = %e, "pulled file has wrong size");
            return Err(e.into());
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                command = %command_str,
                code = ?exit_code,
                stderr = %stderr.trim(),
                "transfer command failed"
            );
            return Err(FetchError::CommandFailed {
                command: command_str,
                code: exit_code,
            });
        }

        let checksum = match verify {
            Some(algorithm) => {
                let mut metadata = job.metadata.clone();
                Some(verify_checksum(&job.dest_path, &mut metadata, algorithm)?)
            }
            None => job.metadata.checksum.clone(),
        };

        Ok(TransferRecord {
            started_at,
            finished_at,
            src_host: self.config.host.clone(),
            src_path: job.remote_path.clone(),
            dst_host: self.local_host.clone(),
            dst_path: job.dest_path.clone(),
            method,
            command: command_str,
            exit_code,
            bytes,
            checksum,
            elapsed,
        })
    }
}

fn stored_size(path: &Path) -> Result<u64, FetchError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
