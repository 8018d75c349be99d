//! Binds the RPC surface to the ingestion service.

use std::sync::Arc;

use framesink_ingest::{IngestError, IngestOutcome, IngestService};
use framesink_protocol::constants::error_code;
use framesink_protocol::messages::{AckResponse, NotifyPullRequest, ReceiveChunkRequest};
use framesink_protocol::{Message, MessageType};
use framesink_server::Handler;
use serde::de::DeserializeOwned;

/// Sink-specific message handler.
pub struct IngestHandler {
    service: Arc<IngestService>,
}

impl IngestHandler {
    pub fn new(service: Arc<IngestService>) -> Self {
        Self { service }
    }

    fn ack(msg: &Message, result: Result<IngestOutcome, IngestError>) -> Message {
        match result {
            Ok(_) => msg
                .reply(MessageType::Ack, Some(&AckResponse::OK))
                .unwrap_or_else(|e| msg.reply_error(error_code::IO, e.to_string())),
            Err(e) => msg.reply_error(e.code(), e.to_string()),
        }
    }
}

/// Parses the request payload or builds the error reply for it.
fn request<T: DeserializeOwned>(msg: &Message) -> Result<T, Message> {
    msg.require_payload().map_err(|e| {
        tracing::warn!(id = %msg.id, msg_type = ?msg.msg_type, error = %e, "malformed request");
        msg.reply_error(error_code::BAD_REQUEST, e.to_string())
    })
}

impl Handler for IngestHandler {
    fn on_receive_chunk(&self, msg: &Message) -> Message {
        match request::<ReceiveChunkRequest>(msg) {
            Ok(req) => Self::ack(msg, self.service.receive_chunk(req)),
            Err(reply) => reply,
        }
    }

    fn on_notify_pull(&self, msg: &Message) -> Message {
        match request::<NotifyPullRequest>(msg) {
            Ok(req) => Self::ack(msg, self.service.notify_pull(req)),
            Err(reply) => reply,
        }
    }
}
