use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::TransferError;
use crate::session::{SessionKind, TransferSession};

/// A push session dropped by [`SessionTable::evict_idle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedSession {
    pub id: String,
    /// Partial file left on disk, if the first chunk ever arrived.
    pub path: Option<PathBuf>,
    pub bytes_written: u64,
    pub remaining: u32,
}

/// Concurrent map of file identifier to active session.
///
/// The table lock is held only to look up, insert or remove; callers
/// mutate a session through its own lock after releasing this one.
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<String, Arc<TransferSession>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<TransferSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the push session for `id`, creating it if absent.
    ///
    /// Fails with [`TransferError::DuplicateSession`] while a pull for
    /// the same identifier is running.
    pub fn get_or_create_push(&self, id: &str) -> Result<Arc<TransferSession>, TransferError> {
        let mut map = self.map();
        if let Some(existing) = map.get(id) {
            if existing.kind() == SessionKind::Pull {
                return Err(TransferError::DuplicateSession(id.to_string()));
            }
            return Ok(Arc::clone(existing));
        }
        let session = Arc::new(TransferSession::new(id, SessionKind::Push));
        map.insert(id.to_string(), Arc::clone(&session));
        tracing::debug!(id, "push session created");
        Ok(session)
    }

    /// Registers a pull for `id`; any active session is a conflict.
    pub fn claim_pull(&self, id: &str) -> Result<Arc<TransferSession>, TransferError> {
        let mut map = self.map();
        if map.contains_key(id) {
            return Err(TransferError::DuplicateSession(id.to_string()));
        }
        let session = Arc::new(TransferSession::new(id, SessionKind::Pull));
        map.insert(id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<TransferSession>> {
        self.map().get(id).cloned()
    }

    /// Removes `session` if it is still the entry for its identifier.
    ///
    /// A newer session registered under the same id is left alone.
    pub fn remove(&self, session: &Arc<TransferSession>) -> bool {
        let mut map = self.map();
        match map.get(session.id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                map.remove(session.id());
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Identifiers of all active sessions, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.map().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drops push sessions that have been idle for at least `max_idle`.
    ///
    /// Idleness is checked with the table unlocked, since a session lock
    /// can be held across a long disk write.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<EvictedSession> {
        let snapshot: Vec<Arc<TransferSession>> = self.map().values().cloned().collect();
        let candidates: Vec<Arc<TransferSession>> = snapshot
            .into_iter()
            .filter(|s| s.is_idle(max_idle))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let stale: Vec<Arc<TransferSession>> = {
            let mut map = self.map();
            candidates
                .into_iter()
                .filter(|s| match map.get(s.id()) {
                    Some(current) if Arc::ptr_eq(current, s) => {
                        map.remove(s.id());
                        true
                    }
                    _ => false,
                })
                .collect()
        };

        stale
            .into_iter()
            .map(|session| {
                let bytes_written = session.bytes_written();
                let remaining = session.remaining();
                let path = session.abandon();
                tracing::warn!(
                    id = session.id(),
                    bytes_written,
                    remaining,
                    "evicted stalled session"
                );
                EvictedSession {
                    id: session.id().to_string(),
                    path,
                    bytes_written,
                    remaining,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChunkProgress, ChunkWrite};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn get_or_create_returns_same_session() {
        let table = SessionTable::new();
        let a = table.get_or_create_push("a.fits").unwrap();
        let b = table.get_or_create_push("a.fits").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn pull_conflicts_with_push() {
        let table = SessionTable::new();
        table.get_or_create_push("a.fits").unwrap();
        assert!(matches!(
            table.claim_pull("a.fits"),
            Err(TransferError::DuplicateSession(_))
        ));
    }

    #[test]
    fn push_conflicts_with_pull() {
        let table = SessionTable::new();
        table.claim_pull("a.fits").unwrap();
        assert!(matches!(
            table.get_or_create_push("a.fits"),
            Err(TransferError::DuplicateSession(_))
        ));
    }

    #[test]
    fn remove_ignores_replaced_session() {
        let table = SessionTable::new();
        let old = table.get_or_create_push("a.fits").unwrap();
        assert!(table.remove(&old));
        let new = table.get_or_create_push("a.fits").unwrap();
        assert!(!table.remove(&old));
        assert!(table.get("a.fits").is_some());
        assert!(table.remove(&new));
        assert!(table.is_empty());
    }

    #[test]
    fn concurrent_first_chunks_share_one_session() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.fits");
        let table = Arc::new(SessionTable::new());
        let count = 16u32;

        let handles: Vec<_> = (0..count)
            .map(|i| {
                let table = Arc::clone(&table);
                let dest = dest.clone();
                thread::spawn(move || {
                    let data = vec![i as u8; 100];
                    let session = table.get_or_create_push("a.fits").unwrap();
                    let progress = session
                        .write_chunk(
                            &dest,
                            &ChunkWrite {
                                offset: u64::from(i) * 100,
                                count,
                                data: &data,
                            },
                        )
                        .unwrap();
                    matches!(progress, ChunkProgress::Complete(_))
                })
            })
            .collect();

        let completions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|done| *done)
            .count();
        assert_eq!(completions, 1);

        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(bytes.len(), 1600);
        for i in 0..16usize {
            assert!(bytes[i * 100..(i + 1) * 100].iter().all(|b| *b == i as u8));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn evict_idle_drops_stalled_push_sessions() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.fits");
        let table = SessionTable::new();
        let session = table.get_or_create_push("a.fits").unwrap();
        session
            .write_chunk(
                &dest,
                &ChunkWrite {
                    offset: 0,
                    count: 3,
                    data: b"abc",
                },
            )
            .unwrap();
        table.claim_pull("b.fits").unwrap();

        assert!(table.evict_idle(Duration::from_secs(3600)).is_empty());

        let evicted = table.evict_idle(Duration::ZERO);
        assert_eq!(
            evicted,
            vec![EvictedSession {
                id: "a.fits".into(),
                path: Some(dest.clone()),
                bytes_written: 3,
                remaining: 2,
            }]
        );
        assert_eq!(table.ids(), vec!["b.fits".to_string()]);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
    }

    #[test]
    fn eviction_does_not_block_table_on_busy_session() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = TempDir::new().unwrap();
        let table = Arc::new(SessionTable::new());
        let busy = table.get_or_create_push("busy.fits").unwrap();
        busy.write_chunk(
            &dir.path().join("busy.fits"),
            &ChunkWrite {
                offset: 0,
                count: 2,
                data: b"x",
            },
        )
        .unwrap();

        let released = Arc::new(AtomicBool::new(false));
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = {
            let busy = Arc::clone(&busy);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let guard = busy.hold_state();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(500));
                released.store(true, Ordering::SeqCst);
                drop(guard);
            })
        };
        locked_rx.recv().unwrap();

        let evictor = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.evict_idle(Duration::ZERO))
        };
        thread::sleep(Duration::from_millis(50));

        table.claim_pull("other.fits").unwrap();
        assert!(!released.load(Ordering::SeqCst));

        holder.join().unwrap();
        let evicted = evictor.join().unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, "busy.fits");
        assert_eq!(table.ids(), vec!["other.fits".to_string()]);
    }
}
