use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use framesink_fetch::{PullJob, TransferExecutor};
use framesink_protocol::TransferKind;
use framesink_protocol::messages::{NotifyPullRequest, ReceiveChunkRequest};
use framesink_transfer::{
    ChunkProgress, ChunkWrite, EvictedSession, SessionTable, TransferError, decode_chunk,
    destination_path, rename_if_exists, verify_checksum, verify_size,
};

use crate::IngestError;
use crate::config::IngestConfig;
use crate::notifier::{Delivery, Notifier};

/// Result of a successful ingest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Chunk stored; more are expected.
    Pending { remaining: u32 },
    /// File complete, verified and handed to the notifier.
    Completed(PathBuf),
    /// Identifier rejected by the filter; nothing was done.
    Skipped,
}

/// Shared service context used by every dispatch worker.
pub struct IngestService {
    config: IngestConfig,
    sessions: SessionTable,
    executor: TransferExecutor,
    notifier: Arc<dyn Notifier>,
}

impl IngestService {
    pub fn new(config: IngestConfig, notifier: Arc<dyn Notifier>) -> Self {
        let executor = TransferExecutor::new(config.pull.clone());
        Self {
            config,
            sessions: SessionTable::new(),
            executor,
            notifier,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Stores one pushed chunk; the chunk that completes a file also
    /// verifies it and notifies.
    pub fn receive_chunk(&self, req: ReceiveChunkRequest) -> Result<IngestOutcome, IngestError> {
        if !self.config.accepts(&req.id) {
            tracing::debug!(id = %req.id, "identifier filtered out; chunk ignored");
            return Ok(IngestOutcome::Skipped);
        }

        self.store_chunk(&req).inspect_err(|e| {
            tracing::error!(
                id = %req.id,
                seq = req.seq,
                count = req.count,
                method = "push",
                error = %e,
                "failed to process chunk"
            );
        })
    }

    fn store_chunk(&self, req: &ReceiveChunkRequest) -> Result<IngestOutcome, IngestError> {
        if req.count == 0 {
            return Err(TransferError::InvalidChunk("count must be at least 1".into()).into());
        }
        tracing::debug!(id = %req.id, seq = req.seq, count = req.count, offset = req.offset, "processing chunk");

        let dest = self.destination(&req.id, req.group.as_deref())?;
        let data = decode_chunk(&req.buffer, req.compressed)?;

        let session = self.sessions.get_or_create_push(&req.id)?;
        let progress = session.write_chunk(
            &dest,
            &ChunkWrite {
                offset: req.offset,
                count: req.count,
                data: &data,
            },
        )?;

        let done = match progress {
            ChunkProgress::Pending { remaining } => {
                return Ok(IngestOutcome::Pending { remaining });
            }
            ChunkProgress::Complete(done) => done,
        };
        self.sessions.remove(&session);

        let rate = done
            .throughput
            .mb_per_sec()
            .map(|r| format!("{r:.2} MB/s"))
            .unwrap_or_else(|| "n/a".into());
        tracing::info!(
            id = %req.id,
            path = %done.path.display(),
            bytes = done.bytes_written,
            elapsed_secs = format_args!("{:.3}", done.throughput.elapsed.as_secs_f64()),
            rate = %rate,
            "push transfer complete"
        );

        verify_size(req.metadata.size, done.bytes_written)?;
        let mut metadata = req.metadata.clone();
        if let Some(algorithm) = self.config.verification() {
            verify_checksum(&done.path, &mut metadata, algorithm)?;
        }

        self.notifier.notify(&Delivery {
            path: done.path.clone(),
            file_type: req.file_type.clone(),
            group: req.group.clone(),
            metadata,
            kind: TransferKind::Push,
        });
        Ok(IngestOutcome::Completed(done.path))
    }

    /// Fetches a file the sender has finished writing on the pull host.
    pub fn notify_pull(&self, req: NotifyPullRequest) -> Result<IngestOutcome, IngestError> {
        let id = Path::new(&req.remote_path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                TransferError::InvalidPath(format!("no file name in '{}'", req.remote_path))
            })?;

        if !self.config.accepts(&id) {
            tracing::debug!(%id, "identifier filtered out; pull ignored");
            return Ok(IngestOutcome::Skipped);
        }

        self.pull(&id, &req).inspect_err(|e| {
            tracing::error!(
                %id,
                method = %self.config.pull.method,
                remote_path = %req.remote_path,
                error = %e,
                "failed to pull file"
            );
        })
    }

    fn pull(&self, id: &str, req: &NotifyPullRequest) -> Result<IngestOutcome, IngestError> {
        let dest = self.destination(id, req.group.as_deref())?;
        let session = self.sessions.claim_pull(id)?;

        let result = self.run_pull(req, &dest);
        self.sessions.remove(&session);
        let record = result?;

        let rate = record
            .throughput()
            .mb_per_sec()
            .map(|r| format!("{r:.2} MB/s"))
            .unwrap_or_else(|| "n/a".into());
        tracing::info!(
            %id,
            method = %record.method,
            path = %dest.display(),
            bytes = record.bytes,
            rate = %rate,
            "pull transfer complete"
        );

        let mut metadata = req.metadata.clone();
        if metadata.checksum.is_none() {
            metadata.checksum = record.checksum;
        }
        self.notifier.notify(&Delivery {
            path: dest.clone(),
            file_type: req.file_type.clone(),
            group: req.group.clone(),
            metadata,
            kind: TransferKind::Pull,
        });
        Ok(IngestOutcome::Completed(dest))
    }

    fn run_pull(
        &self,
        req: &NotifyPullRequest,
        dest: &Path,
    ) -> Result<framesink_fetch::TransferRecord, IngestError> {
        rename_if_exists(dest)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let job = PullJob {
            remote_path: req.remote_path.clone(),
            dest_path: dest.to_path_buf(),
            metadata: req.metadata.clone(),
        };
        Ok(self.executor.fetch(&job, self.config.verification())?)
    }

    fn destination(&self, id: &str, group: Option<&str>) -> Result<PathBuf, IngestError> {
        Ok(destination_path(
            &self.config.data_dir,
            self.config.storage,
            id,
            group,
        )?)
    }

    /// Drops push sessions that have received nothing for `max_idle`.
    pub fn evict_stalled(&self, max_idle: Duration) -> Vec<EvictedSession> {
        self.sessions.evict_idle(max_idle)
    }

    /// Identifiers with a transfer in progress.
    pub fn active_sessions(&self) -> Vec<String> {
        self.sessions.ids()
    }
}
