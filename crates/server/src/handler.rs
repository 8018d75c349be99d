//! Request routing for sink calls.
//!
//! Handlers run on dispatch worker threads, so every method is a plain
//! blocking function returning the reply envelope.

use framesink_protocol::constants::error_code;
use framesink_protocol::{Message, MessageType};

/// Domain logic behind the RPC surface.
///
/// Default implementations reply with "not implemented" so a handler
/// only overrides the calls it serves.
pub trait Handler: Send + Sync + 'static {
    /// Called for `receive_chunk`.
    fn on_receive_chunk(&self, msg: &Message) -> Message {
        msg.reply_error(error_code::UNSUPPORTED_METHOD, "receive_chunk not implemented")
    }

    /// Called for `notify_pull`.
    fn on_notify_pull(&self, msg: &Message) -> Message {
        msg.reply_error(error_code::UNSUPPORTED_METHOD, "notify_pull not implemented")
    }

    /// Called for `echo`; replies with the request payload.
    fn on_echo(&self, msg: &Message) -> Message {
        msg.reply(MessageType::EchoResponse, msg.payload.as_ref())
            .unwrap_or_else(|e| msg.reply_error(error_code::DECODE, e.to_string()))
    }
}

/// Routes `msg` to the matching handler method.
pub fn dispatch<H: Handler + ?Sized>(handler: &H, msg: &Message) -> Message {
    match msg.msg_type {
        MessageType::ReceiveChunk => handler.on_receive_chunk(msg),
        MessageType::NotifyPull => handler.on_notify_pull(msg),
        MessageType::Echo => handler.on_echo(msg),
        ref other => {
            tracing::warn!(id = %msg.id, msg_type = ?other, "unhandled request type");
            msg.reply_error(
                error_code::UNKNOWN_REQUEST,
                format!("no handler for {other:?}"),
            )
        }
    }
}
