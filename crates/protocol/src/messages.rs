use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::types::FileMetadata;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Delivers one offset-addressed chunk of a file.
///
/// `buffer` stays base64 text on the wire; the sink decodes it (and
/// bzip2-decompresses it when `compressed` is set) so a malformed chunk
/// becomes a typed decode failure rather than an envelope parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveChunkRequest {
    /// File identifier (a bare file name).
    pub id: String,
    pub buffer: String,
    /// Absolute byte offset of this chunk within the file.
    pub offset: u64,
    /// Sender's chunk number; informational only.
    #[serde(default)]
    pub seq: u32,
    /// Total number of chunks the sender will deliver for this file.
    pub count: u32,
    #[serde(default)]
    pub compressed: bool,
    #[serde(rename = "kind", default)]
    pub file_type: String,
    #[serde(default)]
    pub metadata: FileMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl ReceiveChunkRequest {
    /// Builds an uncompressed chunk request around raw bytes.
    pub fn from_bytes(
        id: impl Into<String>,
        data: &[u8],
        offset: u64,
        seq: u32,
        count: u32,
    ) -> Self {
        Self {
            id: id.into(),
            buffer: STANDARD.encode(data),
            offset,
            seq,
            count,
            compressed: false,
            file_type: String::new(),
            metadata: FileMetadata::default(),
            group: None,
        }
    }
}

/// Tells the sink to fetch a completed file from the pull host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyPullRequest {
    pub remote_path: String,
    #[serde(rename = "kind", default)]
    pub file_type: String,
    #[serde(default)]
    pub metadata: FileMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Announces a sink to the directory service.
///
/// The same payload is used for `register_sink` and `unregister_sink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSinkRequest {
    /// `host:port` senders should call.
    pub address: String,
    pub id: String,
    /// Hex HMAC proving knowledge of the data key.
    pub credential: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Successful completion of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: i32,
}

impl AckResponse {
    pub const OK: Self = Self { status: 0 };
}
