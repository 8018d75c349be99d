//! RPC front end for a framesink sink.
//!
//! Accepts TCP connections carrying newline-delimited JSON envelopes,
//! queues every request on a [`DispatchPool`] of OS threads, and writes
//! each [`Handler`] reply back on the connection it came from.

mod handler;
mod pool;
mod server;

pub use handler::{Handler, dispatch};
pub use pool::{DispatchPool, PoolConfig, WorkerState};
pub use server::{RpcServer, ServerConfig};

/// Errors produced by the server and its worker pool.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dispatch pool is shut down")]
    PoolShutDown,

    #[error("dispatch pool needs at least one worker")]
    NoWorkers,
}
