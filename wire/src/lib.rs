//! Delimiter framing codec for conduit sessions.
//!
//! This crate implements the fragmented framing mode used by conduit
//! sessions: outbound messages are terminated with a single configured
//! delimiter byte, inbound byte chunks are accumulated and split back into
//! complete frames.
//!
//! ## Framing rules
//!
//! - A message must not contain the delimiter byte and must not exceed the
//!   configured maximum length; violating either rejects the message before
//!   any bytes reach the wire.
//! - On the receive side, every delimiter occurrence closes one frame and the
//!   remainder becomes the new buffer head.
//! - An accumulated run that would exceed the maximum length is discarded
//!   whole, never forwarded partially; decoding resumes after the next
//!   delimiter.
//!
//! Continuous (unframed) forwarding has no codec and lives entirely in
//! `conduit-session`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fragment;

pub use error::FramingError;
pub use fragment::{encode_frame, FrameDecoder};
