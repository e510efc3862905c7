//! Session lifecycle management.
//!
//! A [`Session`] owns one peer connection: it sequences connect and
//! disconnect, owns the background reader task and the write half of the
//! transport, and serializes all state transitions behind one mutex. The
//! framing mode and message handler are fixed at construction; the transport
//! (plain TCP or TLS) is selected at [`start`](Session::start) from the
//! presence of credentials.

use bytes::Bytes;
use conduit_wire::{encode_frame, FrameDecoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{SendError, StartError};
use crate::receive::{ReaderFraming, ReceiveLoop};
use crate::transport::{connect_tcp, Connector, IoStream, TlsCredentials};

/// Receiver of complete inbound frames in fragmented mode.
///
/// Invoked once per frame, each invocation on its own dispatch task;
/// invocations overlap and complete in no particular order. A handler that
/// needs ordered processing must serialize internally. Implemented for any
/// `Fn(Bytes)` closure.
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one received frame payload.
    fn handle(&self, msg: Bytes);
}

impl<F> MessageHandler for F
where
    F: Fn(Bytes) + Send + Sync + 'static,
{
    fn handle(&self, msg: Bytes) {
        self(msg)
    }
}

/// Framing mode of a session, chosen at construction and immutable for the
/// session's life.
#[derive(Clone)]
pub enum Framing {
    /// Messages are split on a delimiter byte and dispatched frame-by-frame
    /// to the handler.
    Fragmented {
        /// Frame delimiter; outbound messages must not contain it
        delimiter: u8,
        /// Maximum message length in bytes, enforced on both directions
        max_len: usize,
        /// Per-frame message handler
        handler: Arc<dyn MessageHandler>,
    },
    /// No message boundaries: every inbound chunk is forwarded verbatim to
    /// the sink and outbound payloads are written unmodified.
    Continuous {
        /// Destination for inbound byte chunks
        sink: mpsc::Sender<Bytes>,
    },
}

/// Lifecycle notifications emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection is established and the reader is running
    Connected {
        /// Peer socket address
        peer: SocketAddr,
    },
    /// The session ended, either by explicit stop or because the peer went
    /// away; the two are not told apart
    Disconnected,
}

/// Configuration for a session.
pub struct SessionConfig {
    /// Framing mode and message destination
    pub framing: Framing,
    /// Optional lifecycle event channel
    pub events: Option<mpsc::Sender<SessionEvent>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

struct SessionState {
    phase: Phase,
    writer: Option<WriteHalf<IoStream>>,
    reader: Option<JoinHandle<()>>,
}

/// One client session: one peer connection, one reader task.
///
/// `start` either fully succeeds or fully rolls back; `stop` is idempotent.
/// A stopped session is terminal, reconnecting requires a new `Session`.
pub struct Session {
    framing: Framing,
    events: Option<mpsc::Sender<SessionEvent>>,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create an idle session with the given framing configuration.
    pub fn new(config: SessionConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            framing: config.framing,
            events: config.events,
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            state: Mutex::new(SessionState {
                phase: Phase::Idle,
                writer: None,
                reader: None,
            }),
        }
    }

    /// Connect to `host:port` and start the background reader.
    ///
    /// With credentials the session runs over TLS, otherwise over plain TCP.
    /// Returns only after either full success (running, reader spawned) or
    /// full rollback; every acquisition step reports its own
    /// [`StartError`] variant and a failure never leaves a resource
    /// half-acquired.
    pub async fn start(
        &self,
        host: &str,
        port: u32,
        credentials: Option<TlsCredentials>,
    ) -> Result<(), StartError> {
        let mut state = self.state.lock().await;

        if state.phase != Phase::Idle {
            return Err(StartError::AlreadyRunning);
        }
        if port == 0 || port > 65535 {
            return Err(StartError::WrongPort(port));
        }

        // Acquisition sequence; failures below unwind by dropping whatever
        // was built so far, the session state is untouched until success.
        let connector = Connector::init(credentials.as_ref())?;
        let tcp = connect_tcp(host, port as u16).await?;
        let peer = tcp.peer_addr().map_err(StartError::Connect)?;
        let stream = connector.connection_init(tcp, host).await?;

        let (read_half, write_half) = tokio::io::split(stream);

        self.shutdown.send_replace(false);
        self.running.store(true, Ordering::Release);

        let reader = ReceiveLoop {
            stream: read_half,
            framing: self.reader_framing(),
            running: Arc::clone(&self.running),
            shutdown: self.shutdown.subscribe(),
            events: self.events.clone(),
            peer,
        };

        state.reader = Some(tokio::spawn(reader.run()));
        state.writer = Some(write_half);
        state.phase = Phase::Running;
        drop(state);

        info!("connected to {}", peer);
        if let Some(events) = &self.events {
            events.send(SessionEvent::Connected { peer }).await.ok();
        }
        Ok(())
    }

    /// Stop the session and release the connection.
    ///
    /// Teardown order: flip the running flag, graceful channel deinit
    /// (close_notify for TLS, FIN for TCP), unblock a parked read, join the
    /// reader (which in turn joins all dispatch tasks). Safe to call any
    /// number of times; later calls are no-ops.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Release);

        let mut state = self.state.lock().await;
        if state.phase == Phase::Running {
            state.phase = Phase::Stopped;
        }

        if let Some(mut writer) = state.writer.take() {
            let _ = writer.shutdown().await;
        }

        self.shutdown.send_replace(true);

        if let Some(reader) = state.reader.take() {
            let _ = reader.await;
            info!("session stopped");
        }
    }

    /// Send one message to the peer.
    ///
    /// In fragmented mode the message is validated locally first: a message
    /// containing the delimiter or exceeding the maximum length is rejected
    /// without writing a single byte. In continuous mode the payload goes
    /// out unmodified.
    pub async fn send_msg(&self, msg: &[u8]) -> Result<(), SendError> {
        if !self.is_running() {
            return Err(SendError::NotRunning);
        }

        let payload = match &self.framing {
            Framing::Fragmented {
                delimiter, max_len, ..
            } => encode_frame(msg, *delimiter, *max_len)?,
            Framing::Continuous { .. } => Bytes::copy_from_slice(msg),
        };

        let mut state = self.state.lock().await;
        let writer = state.writer.as_mut().ok_or(SendError::NotRunning)?;
        writer.write_all(&payload).await.map_err(SendError::Io)?;
        writer.flush().await.map_err(SendError::Io)?;

        debug!("sent {} bytes", payload.len());
        Ok(())
    }

    /// Whether the session is currently running. Lock-free; may briefly
    /// report `true` after a stop has begun.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn reader_framing(&self) -> ReaderFraming {
        match &self.framing {
            Framing::Fragmented {
                delimiter,
                max_len,
                handler,
            } => ReaderFraming::Fragmented {
                decoder: FrameDecoder::new(*delimiter, *max_len),
                handler: Arc::clone(handler),
            },
            Framing::Continuous { sink } => ReaderFraming::Continuous { sink: sink.clone() },
        }
    }
}

impl Drop for Session {
    /// Best-effort teardown: flag the session stopped and unblock the
    /// reader, which releases the connection. `stop().await` gives
    /// deterministic teardown.
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.send_replace(true);
    }
}
