//! TCP/TLS client sessions: connect/disconnect lifecycle, receive loop,
//! message dispatch.
//!
//! This crate provides the session engine for conduit clients. One
//! [`Session`] owns one peer connection over one of two transports (plain
//! TCP, or TLS with mutual authentication) that share the same lifecycle,
//! framing and dispatch machinery.
//!
//! ## Features
//!
//! - **Lifecycle**: `start`/`stop` with per-step error codes and full
//!   rollback on any start failure; idempotent, re-entrant-safe stop
//! - **Two framing modes**: delimiter-fragmented messages dispatched to a
//!   handler, or continuous verbatim forwarding into a byte sink
//! - **Concurrent dispatch**: one dispatch task per frame, so a slow handler
//!   never stalls the receive loop
//! - **TLS policy**: TLS 1.3 only, AES-256-GCM only, peer certificate
//!   required and signed directly by the trusted CA
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use conduit_session::{Framing, Session, SessionConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(SessionConfig {
//!     framing: Framing::Fragmented {
//!         delimiter: b'\n',
//!         max_len: 16 * 1024,
//!         handler: Arc::new(|msg: Bytes| {
//!             println!("message from server: {:?}", msg);
//!         }),
//!     },
//!     events: None,
//! });
//!
//! session.start("localhost", 8081, None).await?;
//! session.send_msg(b"Hello server!").await?;
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod session;
pub mod transport;

mod receive;

// Re-export main types
pub use error::{SendError, StartError};
pub use session::{Framing, MessageHandler, Session, SessionConfig, SessionEvent};
pub use transport::{IoStream, TlsCredentials, MAX_CHUNK_SIZE};
