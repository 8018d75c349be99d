use std::collections::HashSet;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::TransferError;
use crate::progress::Throughput;
use crate::storage::rename_if_exists;

/// Whether a session reassembles pushed chunks or guards a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Push,
    Pull,
}

/// One decoded chunk to be written at `offset`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkWrite<'a> {
    pub offset: u64,
    /// Total chunk count declared by the sender.
    pub count: u32,
    pub data: &'a [u8],
}

/// A file whose last chunk has been written and flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFile {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub throughput: Throughput,
}

/// Result of writing one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkProgress {
    Pending { remaining: u32 },
    Complete(CompletedFile),
}

/// Reassembly state for one in-flight file.
///
/// All mutation happens under the session's own lock, which is
/// independent of the [`SessionTable`](crate::SessionTable) lock.
pub struct TransferSession {
    id: String,
    kind: SessionKind,
    inner: Mutex<SessionState>,
}

struct SessionState {
    destination: Option<PathBuf>,
    file: Option<File>,
    total_count: u32,
    remaining: u32,
    bytes_written: u64,
    started_at: Option<Instant>,
    last_activity: Instant,
    /// Offsets already written; a repeat is rewritten but not counted.
    received: HashSet<u64>,
    finished: bool,
}

impl TransferSession {
    pub fn new(id: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            id: id.into(),
            kind,
            inner: Mutex::new(SessionState {
                destination: None,
                file: None,
                total_count: 0,
                remaining: 0,
                bytes_written: 0,
                started_at: None,
                last_activity: Instant::now(),
                received: HashSet::new(),
                finished: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn hold_state(&self) -> impl Sized + '_ {
        self.state()
    }

    /// Writes one chunk into the output file at `destination`.
    ///
    /// The first chunk moves any existing file aside, creates missing
    /// parent directories and opens the output; it also fixes the total
    /// chunk count every later chunk must repeat. Completion is decided
    /// from the remaining count observed under the lock, so exactly one
    /// caller receives [`ChunkProgress::Complete`].
    pub fn write_chunk(
        &self,
        destination: &Path,
        chunk: &ChunkWrite<'_>,
    ) -> Result<ChunkProgress, TransferError> {
        if chunk.count == 0 {
            return Err(TransferError::InvalidChunk(format!(
                "chunk for '{}' declares zero chunks",
                self.id
            )));
        }

        let mut state = self.state();
        if state.finished {
            return Err(TransferError::SessionFinished(self.id.clone()));
        }

        if state.file.is_none() {
            rename_if_exists(destination)?;
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(destination)?;
            tracing::debug!(id = %self.id, path = %destination.display(), count = chunk.count, "output opened");
            state.file = Some(file);
            state.destination = Some(destination.to_path_buf());
            state.total_count = chunk.count;
            state.remaining = chunk.count;
            state.bytes_written = 0;
            state.received.clear();
            state.started_at = Some(Instant::now());
        } else if chunk.count != state.total_count {
            return Err(TransferError::InconsistentCount {
                id: self.id.clone(),
                expected: state.total_count,
                declared: chunk.count,
            });
        }

        let file = state.file.as_mut().ok_or_else(|| {
            TransferError::SessionFinished(self.id.clone())
        })?;
        file.seek(SeekFrom::Start(chunk.offset))?;
        file.write_all(chunk.data)?;

        let first_time = state.received.insert(chunk.offset);
        if first_time {
            state.bytes_written += chunk.data.len() as u64;
            state.remaining = state.remaining.saturating_sub(1);
        } else {
            tracing::debug!(id = %self.id, offset = chunk.offset, "offset rewritten");
        }
        state.last_activity = Instant::now();

        if state.remaining > 0 {
            tracing::debug!(
                id = %self.id,
                offset = chunk.offset,
                len = chunk.data.len(),
                remaining = state.remaining,
                "chunk written"
            );
            return Ok(ChunkProgress::Pending {
                remaining: state.remaining,
            });
        }

        state.finished = true;
        let file = state.file.take();
        let elapsed = state
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        let completed = CompletedFile {
            path: state
                .destination
                .clone()
                .unwrap_or_else(|| destination.to_path_buf()),
            bytes_written: state.bytes_written,
            throughput: Throughput::new(state.bytes_written, elapsed),
        };
        drop(state);

        if let Some(file) = file {
            file.sync_all()?;
        }
        Ok(ChunkProgress::Complete(completed))
    }

    /// Returns true when a push session has seen no chunk for `max_idle`.
    pub fn is_idle(&self, max_idle: Duration) -> bool {
        if self.kind != SessionKind::Push {
            return false;
        }
        let state = self.state();
        !state.finished && state.last_activity.elapsed() >= max_idle
    }

    /// Closes the output handle and marks the session finished.
    ///
    /// The partial file stays on disk; its path is returned.
    pub fn abandon(&self) -> Option<PathBuf> {
        let mut state = self.state();
        state.finished = true;
        state.file.take();
        state.destination.clone()
    }

    pub fn bytes_written(&self) -> u64 {
        self.state().bytes_written
    }

    /// Chunks still expected; zero before the first chunk.
    pub fn remaining(&self) -> u32 {
        self.state().remaining
    }
}

impl std::fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
