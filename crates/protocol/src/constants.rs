use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default TCP port a sink listens on for sender calls.
pub const DEFAULT_SINK_PORT: u16 = 15003;

/// Default TCP port of the directory service.
pub const DEFAULT_DIRECTORY_PORT: u16 = 7075;

/// Maximum length of one framed message in bytes (64 MB).
///
/// A chunk travels base64-encoded inside the JSON envelope, so this
/// bounds the raw chunk size at roughly 48 MB.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Largest chunk a compressed buffer may expand to.
pub const MAX_DECODED_CHUNK: usize = MAX_FRAME_LENGTH;

/// Time allowed for a directory service round trip.
pub const DIRECTORY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to write one reply frame back to a sender.
pub const REPLY_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Message type identifier carried in every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Requests from senders to a sink
    #[serde(rename = "receive_chunk")]
    ReceiveChunk,
    #[serde(rename = "notify_pull")]
    NotifyPull,
    #[serde(rename = "echo")]
    Echo,

    // Requests from a sink to the directory service
    #[serde(rename = "register_sink")]
    RegisterSink,
    #[serde(rename = "unregister_sink")]
    UnregisterSink,

    // Responses
    #[serde(rename = "ack")]
    Ack,
    #[serde(rename = "echo_response")]
    EchoResponse,
    #[serde(rename = "error")]
    Error,
}

/// Numeric codes carried in [`RpcError`](crate::envelope::RpcError).
pub mod error_code {
    /// Chunk payload could not be decoded or decompressed.
    pub const DECODE: i32 = 400;
    /// Identifier or partition name would escape the storage directory.
    pub const INVALID_PATH: i32 = 403;
    /// No handler for the request type.
    pub const UNKNOWN_REQUEST: i32 = 404;
    /// Another transfer for the same identifier is active.
    pub const DUPLICATE_SESSION: i32 = 409;
    /// Chunk declared a total that disagrees with the session.
    pub const INCONSISTENT_COUNT: i32 = 412;
    /// Request payload was missing or malformed.
    pub const BAD_REQUEST: i32 = 422;
    /// Local I/O failure while storing the file.
    pub const IO: i32 = 500;
    /// Pull method is not one the sink knows how to run.
    pub const UNSUPPORTED_METHOD: i32 = 501;
    /// External transfer tool failed to launch or exited non-zero.
    pub const TRANSFER_COMMAND: i32 = 502;
    /// The sink is shutting down and refused the request.
    pub const UNAVAILABLE: i32 = 503;
    /// Stored byte count differs from the declared size.
    pub const SIZE_MISMATCH: i32 = 460;
    /// Stored file checksum differs from the declared checksum.
    pub const CHECKSUM_MISMATCH: i32 = 461;
}
