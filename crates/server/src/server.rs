//! TCP listener speaking newline-delimited JSON envelopes.
//!
//! Each line is one [`Message`]. Requests are handed to the
//! [`DispatchPool`]; the connection task only waits for the reply, so
//! replies on one connection come back in request order.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use framesink_protocol::constants::{
    DEFAULT_SINK_PORT, MAX_FRAME_LENGTH, MessageType, REPLY_WRITE_TIMEOUT, error_code,
};
use framesink_protocol::Message;

use crate::ServerError;
use crate::handler::{Handler, dispatch};
use crate::pool::DispatchPool;

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    pub max_frame_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_SINK_PORT,
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

/// The sink's RPC server.
pub struct RpcServer<H: Handler> {
    config: ServerConfig,
    handler: Arc<H>,
    pool: Arc<DispatchPool>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<H: Handler> RpcServer<H> {
    pub fn new(config: ServerConfig, handler: H, pool: Arc<DispatchPool>) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            pool,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Stops accepting and closes open connections.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let addr = SocketAddr::new(self.config.bind, self.config.port);
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("sink listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        tracing::debug!(%peer_addr, "connection opened");
        let (rd, wr) = stream.into_split();
        let max = self.config.max_frame_length;
        let mut reader = FramedRead::new(rd, LinesCodec::new_with_max_length(max));
        let mut writer = FramedWrite::new(wr, LinesCodec::new_with_max_length(max));

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = reader.next() => line,
            };

            let reply = match line {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => self.process(&line).await,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::warn!(%peer_addr, max, "frame too long; discarded");
                    Message::error("", error_code::DECODE, format!("frame exceeds {max} bytes"))
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                None => break,
            };

            let text = serde_json::to_string(&reply)?;
            match tokio::time::timeout(REPLY_WRITE_TIMEOUT, writer.send(text)).await {
                Ok(Ok(())) => {}
                Ok(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                Ok(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::error!(%peer_addr, id = %reply.id, "reply too long to send");
                }
                Err(_) => {
                    tracing::warn!(%peer_addr, "reply write timed out; closing connection");
                    break;
                }
            }
        }

        tracing::debug!(%peer_addr, "connection closed");
        Ok(())
    }

    /// Parses one request line, runs it on the pool and waits for the reply.
    async fn process(&self, line: &str) -> Message {
        let msg: Message = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => return undecodable(line, &e),
        };

        let id = msg.id.clone();
        let msg_type = msg.msg_type.clone();
        let (tx, rx) = oneshot::channel();
        let handler = Arc::clone(&self.handler);
        let submitted = self.pool.submit(move || {
            let reply = dispatch(handler.as_ref(), &msg);
            let _ = tx.send(reply);
        });
        if let Err(e) = submitted {
            tracing::warn!(%id, error = %e, "request refused");
            return Message::error(id, error_code::UNAVAILABLE, e.to_string());
        }

        match rx.await {
            Ok(reply) => reply,
            Err(_) if self.pool.is_shut_down() => {
                Message::error(id, error_code::UNAVAILABLE, "sink is shutting down")
            }
            Err(_) => {
                tracing::error!(%id, ?msg_type, "request ended without a reply");
                Message::error(id, error_code::IO, "request failed without a reply")
            }
        }
    }
}

/// Builds the error reply for a line that is not a valid envelope.
fn undecodable(line: &str, err: &serde_json::Error) -> Message {
    let value: Option<serde_json::Value> = serde_json::from_str(line).ok();
    let id = value
        .as_ref()
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let unknown_type = value
        .as_ref()
        .and_then(|v| v.get("type"))
        .filter(|t| t.is_string())
        .and_then(|t| serde_json::from_value::<MessageType>(t.clone()).err().map(|_| t.clone()));

    match unknown_type {
        Some(t) => {
            tracing::warn!(%id, msg_type = %t, "unknown request type");
            Message::error(id, error_code::UNKNOWN_REQUEST, format!("unknown request type {t}"))
        }
        None => {
            tracing::warn!(%id, error = %err, "undecodable request");
            Message::error(id, error_code::DECODE, format!("invalid envelope: {err}"))
        }
    }
}
