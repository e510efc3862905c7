//! The per-session receive loop and message dispatch.
//!
//! One reader task runs for a session's whole running lifetime. It blocks on
//! the transport read, feeds the framing layer, and spawns one dispatch task
//! per complete frame. Frames are recognized strictly in arrival order;
//! handler execution is concurrent and completion order is unspecified, so a
//! slow handler never stalls the loop.

use bytes::Bytes;
use conduit_wire::FrameDecoder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::{MessageHandler, SessionEvent};
use crate::transport::{IoStream, MAX_CHUNK_SIZE};

/// Reader-side framing state, built from the session's framing config.
pub(crate) enum ReaderFraming {
    /// Delimiter framing with per-frame handler dispatch
    Fragmented {
        decoder: FrameDecoder,
        handler: Arc<dyn MessageHandler>,
    },
    /// Verbatim chunk forwarding into the caller's sink
    Continuous { sink: mpsc::Sender<Bytes> },
}

/// State owned by the reader task.
pub(crate) struct ReceiveLoop {
    pub(crate) stream: ReadHalf<IoStream>,
    pub(crate) framing: ReaderFraming,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) events: Option<mpsc::Sender<SessionEvent>>,
    pub(crate) peer: SocketAddr,
}

impl ReceiveLoop {
    /// Run until the peer disconnects or the session is stopped, then tear
    /// down: flip the running flag, join every in-flight dispatch task,
    /// release the read half and emit the disconnect notification.
    pub(crate) async fn run(mut self) {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let mut chunk = vec![0u8; MAX_CHUNK_SIZE];

        while self.running.load(Ordering::Acquire) {
            let n = tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                result = self.stream.read(&mut chunk) => match result {
                    // An empty read and a read error both mean the peer is
                    // gone; they are never told apart.
                    Ok(0) => {
                        info!("connection to {} closed by peer", self.peer);
                        break;
                    }
                    Err(e) => {
                        info!("connection to {} lost: {}", self.peer, e);
                        break;
                    }
                    Ok(n) => n,
                },
            };

            match &mut self.framing {
                ReaderFraming::Fragmented { decoder, handler } => {
                    decoder.extend(&chunk[..n]);
                    loop {
                        match decoder.decode() {
                            Ok(Some(frame)) => {
                                // Reap finished dispatch tasks before adding
                                // the next one.
                                tasks.retain(|task| !task.is_finished());

                                debug!(
                                    "dispatching {} byte frame from {}",
                                    frame.len(),
                                    self.peer
                                );
                                let handler = Arc::clone(handler);
                                tasks.push(tokio::task::spawn_blocking(move || {
                                    handler.handle(frame)
                                }));
                            }
                            Ok(None) => break,
                            Err(e) => warn!("discarding inbound data from {}: {}", self.peer, e),
                        }
                    }
                }
                ReaderFraming::Continuous { sink } => {
                    let forwarded = Bytes::copy_from_slice(&chunk[..n]);
                    // A full sink parks the loop here, so stop must be able
                    // to interrupt the forward just like a parked read.
                    tokio::select! {
                        biased;

                        _ = self.shutdown.changed() => break,

                        sent = sink.send(forwarded) => if sent.is_err() {
                            warn!("continuous sink closed; ending session with {}", self.peer);
                            break;
                        },
                    }
                }
            }
        }

        self.running.store(false, Ordering::Release);

        let outstanding = tasks.len();
        if outstanding > 0 {
            debug!("waiting for {} in-flight dispatch tasks", outstanding);
        }
        for task in tasks {
            let _ = task.await;
        }

        drop(self.stream);

        if let Some(events) = &self.events {
            // Teardown must not park on a full event channel.
            events.try_send(SessionEvent::Disconnected).ok();
        }

        info!("session with {} ended", self.peer);
    }
}
