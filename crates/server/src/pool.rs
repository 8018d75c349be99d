//! Fixed-size pool of OS threads executing queued requests.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio_util::sync::CancellationToken;

use crate::ServerError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool sizing and polling.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    /// How long a worker waits on the queue before rechecking shutdown.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// What a worker thread is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    PollQueue = 1,
    Executing = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::PollQueue,
            2 => Self::Executing,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Queue plus worker threads.
///
/// Requests are never run on the submitting thread. There is no
/// ordering between queued jobs.
pub struct DispatchPool {
    tx: Sender<Job>,
    shutdown: CancellationToken,
    states: Arc<Vec<AtomicU8>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchPool {
    /// Spawns `config.workers` threads named `dispatch-worker-N`.
    pub fn new(config: PoolConfig) -> Result<Self, ServerError> {
        if config.workers == 0 {
            return Err(ServerError::NoWorkers);
        }

        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let shutdown = CancellationToken::new();
        let states: Arc<Vec<AtomicU8>> = Arc::new(
            (0..config.workers)
                .map(|_| AtomicU8::new(WorkerState::Idle as u8))
                .collect(),
        );

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let rx = rx.clone();
            let worker_shutdown = shutdown.clone();
            let states = Arc::clone(&states);
            let poll = config.poll_interval;
            let spawned = std::thread::Builder::new()
                .name(format!("dispatch-worker-{index}"))
                .spawn(move || worker_loop(index, rx, worker_shutdown, states, poll));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shutdown.cancel();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }
        tracing::info!(workers = config.workers, "dispatch pool started");

        Ok(Self {
            tx,
            shutdown,
            states,
            workers: Mutex::new(workers),
        })
    }

    /// Queues a job. Fails once the pool is shutting down.
    pub fn submit<F>(&self, job: F) -> Result<(), ServerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(ServerError::PoolShutDown);
        }
        self.tx
            .send(Box::new(job))
            .map_err(|_| ServerError::PoolShutDown)
    }

    pub fn worker_count(&self) -> usize {
        self.states.len()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states
            .iter()
            .map(|s| WorkerState::from_u8(s.load(Ordering::Acquire)))
            .collect()
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Sets the shutdown flag and joins every worker.
    ///
    /// Running jobs finish; jobs still queued are dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("dispatch worker exited abnormally");
            }
        }
        tracing::info!("dispatch pool stopped");
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn worker_loop(
    index: usize,
    rx: Receiver<Job>,
    shutdown: CancellationToken,
    states: Arc<Vec<AtomicU8>>,
    poll: Duration,
) {
    let state = &states[index];
    let set = |s: WorkerState| state.store(s as u8, Ordering::Release);
    tracing::debug!(worker = index, "dispatch worker started");

    loop {
        set(WorkerState::PollQueue);
        if shutdown.is_cancelled() {
            break;
        }
        match rx.recv_timeout(poll) {
            Ok(job) => {
                set(WorkerState::Executing);
                if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                    tracing::error!(
                        worker = index,
                        panic = panic_message(panic.as_ref()),
                        "job panicked"
                    );
                }
                set(WorkerState::Idle);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    set(WorkerState::Stopped);
    tracing::debug!(worker = index, "dispatch worker stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
