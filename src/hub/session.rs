//! Per-connection reader and writer.
//!
//! Both halves of a socket run as two cooperating futures in one task. The
//! writer drains the session's outbound queue and pings on a timer; the reader
//! enforces the inbound size limit and the pong deadline. Whichever stops first
//! ends the connection, after which the session is unregistered.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;
use uuid::Uuid;

use super::coordinator::{HubHandle, Session};
use super::envelope::Frame;

/// Liveness and sizing for client sockets
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Largest inbound message accepted, in bytes
    pub max_message_bytes: usize,
    /// How often the writer pings
    pub ping_interval: Duration,
    /// How long the reader waits for a pong before giving up
    pub pong_timeout: Duration,
    /// Upper bound on a single socket write
    pub write_timeout: Duration,
    /// Outbound queue depth before the hub evicts the session
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let pong_timeout = Duration::from_secs(60);
        Self {
            max_message_bytes: 512,
            ping_interval: pong_timeout * 9 / 10,
            pong_timeout,
            write_timeout: Duration::from_secs(10),
            outbound_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Protocol limits for the upgraded socket.
    ///
    /// Frames over `max_message_bytes` are refused from their header, before the
    /// payload is buffered.
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: Some(self.max_message_bytes),
            max_frame_size: Some(self.max_message_bytes),
            ..Default::default()
        }
    }
}

/// Why a reader stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEnd {
    Closed,
    PongTimeout,
    TooLarge(usize),
    Error(String),
}

/// Why a writer stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEnd {
    QueueClosed,
    WriteTimeout,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Reader(ReadEnd),
    Writer(WriteEnd),
}

/// Register a new session for `identity` and pump `socket` until it ends.
pub async fn serve_socket<S>(socket: S, identity: Uuid, hub: HubHandle, config: SessionConfig) -> SessionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (session, outbound) = Session::new(identity, config.outbound_capacity);
    let session_id = session.id;
    hub.register(session).await;
    debug!(user_id = %identity, session_id = %session_id, "Client session started");

    let end = run_session(socket, outbound, &config).await;

    hub.unregister(identity, session_id).await;
    debug!(user_id = %identity, session_id = %session_id, ?end, "Client session ended");
    end
}

/// Run the reader and writer over one socket until either stops.
pub async fn run_session<S>(socket: S, outbound: mpsc::Receiver<Frame>, config: &SessionConfig) -> SessionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (sink, stream) = socket.split();
    tokio::select! {
        end = read_loop(stream, config) => SessionEnd::Reader(end),
        end = write_loop(sink, outbound, config) => SessionEnd::Writer(end),
    }
}

async fn read_loop<R>(mut stream: R, config: &SessionConfig) -> ReadEnd
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut deadline = Instant::now() + config.pong_timeout;
    loop {
        let next = match timeout_at(deadline, stream.next()).await {
            Ok(next) => next,
            Err(_) => return ReadEnd::PongTimeout,
        };
        match next {
            None => return ReadEnd::Closed,
            Some(Err(e)) => return ReadEnd::Error(e.to_string()),
            Some(Ok(Message::Close(_))) => return ReadEnd::Closed,
            Some(Ok(Message::Pong(_))) => {
                deadline = Instant::now() + config.pong_timeout;
            }
            Some(Ok(Message::Text(text))) => {
                if text.len() > config.max_message_bytes {
                    return ReadEnd::TooLarge(text.len());
                }
                // Clients only receive; inbound chat goes through HTTP
                debug!(bytes = text.len(), "Ignoring inbound text frame");
            }
            Some(Ok(Message::Binary(data))) => {
                if data.len() > config.max_message_bytes {
                    return ReadEnd::TooLarge(data.len());
                }
            }
            // Pings are answered by tungstenite itself
            Some(Ok(_)) => {}
        }
    }
}

async fn write_loop<W>(mut sink: W, mut outbound: mpsc::Receiver<Frame>, config: &SessionConfig) -> WriteEnd
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame.to_string().into()),
                None => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: "session closed".into(),
                    }));
                    let _ = timeout(config.write_timeout, sink.send(close)).await;
                    return WriteEnd::QueueClosed;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new().into()),
        };

        match timeout(config.write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return WriteEnd::Error(e.to_string()),
            Err(_) => return WriteEnd::WriteTimeout,
        }
    }
}
