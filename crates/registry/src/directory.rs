//! Client side of the directory service.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use framesink_protocol::constants::{DIRECTORY_REQUEST_TIMEOUT, MAX_FRAME_LENGTH};
use framesink_protocol::messages::RegisterSinkRequest;
use framesink_protocol::{Message, MessageType};

use crate::RegistryError;

/// A boxed future returned by directory calls.
pub type DirectoryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + 'a>>;

/// Registry that sinks announce themselves to.
pub trait Directory: Send + Sync {
    fn register<'a>(&'a self, req: &'a RegisterSinkRequest) -> DirectoryFuture<'a>;

    fn unregister<'a>(&'a self, req: &'a RegisterSinkRequest) -> DirectoryFuture<'a>;
}

/// Directory reached over TCP with one JSON envelope per line.
///
/// Each call opens its own connection, so a restarted directory is
/// picked up on the next heartbeat.
#[derive(Debug, Clone)]
pub struct TcpDirectory {
    addr: String,
    timeout: Duration,
}

impl TcpDirectory {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout: DIRECTORY_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, msg_type: MessageType, req: &RegisterSinkRequest) -> Result<(), RegistryError> {
        let msg = Message::new(uuid::Uuid::new_v4().to_string(), msg_type, Some(req))
            .map_err(|e| RegistryError::DirectoryUnavailable(format!("cannot encode request: {e}")))?;

        match tokio::time::timeout(self.timeout, self.exchange(&msg)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::DirectoryUnavailable(format!(
                "{} did not answer within {:?}",
                self.addr, self.timeout
            ))),
        }
    }

    async fn exchange(&self, msg: &Message) -> Result<(), RegistryError> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            RegistryError::DirectoryUnavailable(format!("{what} {}: {e}", self.addr))
        };

        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| unavailable("cannot connect to", &e))?;
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));

        let line = serde_json::to_string(msg)
            .map_err(|e| unavailable("cannot encode request for", &e))?;
        framed
            .send(line)
            .await
            .map_err(|e| unavailable("cannot send to", &e))?;

        let reply = match framed.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(unavailable("cannot read reply from", &e)),
            None => {
                return Err(RegistryError::DirectoryUnavailable(format!(
                    "{} closed the connection without replying",
                    self.addr
                )));
            }
        };

        let reply: Message = serde_json::from_str(&reply)
            .map_err(|e| unavailable("invalid reply from", &e))?;
        if reply.is_error() {
            let detail = reply
                .error
                .map(|e| format!("{} ({})", e.message, e.code))
                .unwrap_or_else(|| "error reply".into());
            return Err(RegistryError::DirectoryUnavailable(format!(
                "{} rejected {:?}: {detail}",
                self.addr, msg.msg_type
            )));
        }
        Ok(())
    }
}

impl Directory for TcpDirectory {
    fn register<'a>(&'a self, req: &'a RegisterSinkRequest) -> DirectoryFuture<'a> {
        Box::pin(self.call(MessageType::RegisterSink, req))
    }

    fn unregister<'a>(&'a self, req: &'a RegisterSinkRequest) -> DirectoryFuture<'a> {
        Box::pin(self.call(MessageType::UnregisterSink, req))
    }
}
