//! Session error types.
//!
//! `start` failures are always surfaced synchronously as a [`StartError`]
//! after a full local rollback; nothing is left half-acquired. Runtime
//! disconnects are not errors at all, they surface as
//! [`SessionEvent::Disconnected`](crate::SessionEvent) and a false
//! `is_running()`.

use conduit_wire::FramingError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`Session::start`](crate::Session::start).
///
/// Each acquisition step has its own variant so callers can tell apart a bad
/// parameter, a bad credential file, a socket-level failure, and a TLS
/// protocol failure.
#[derive(Error, Debug)]
pub enum StartError {
    /// The session is not idle (already running, or stopped and therefore
    /// terminal; construct a new session to reconnect)
    #[error("session is already running or stopped")]
    AlreadyRunning,

    /// Port outside the range 1-65535
    #[error("port {0} is out of range (1-65535)")]
    WrongPort(u32),

    /// The TLS client configuration could not be assembled
    #[error("failed to set up TLS context")]
    SetContext,

    /// The CA certificate file does not exist
    #[error("CA certificate file not found: {0}")]
    WrongCaPath(PathBuf),

    /// The client certificate file does not exist
    #[error("client certificate file not found: {0}")]
    WrongCertPath(PathBuf),

    /// The client private key file does not exist
    #[error("client private key file not found: {0}")]
    WrongKeyPath(PathBuf),

    /// The CA certificate file could not be parsed
    #[error("invalid CA certificate")]
    WrongCaCert,

    /// The client certificate file could not be parsed
    #[error("invalid client certificate")]
    WrongCert,

    /// The client key could not be parsed or does not match the certificate
    #[error("invalid client private key or key/certificate mismatch")]
    WrongKey,

    /// The TCP socket could not be created
    #[error("failed to create socket")]
    CreateSocket(#[source] std::io::Error),

    /// A socket option could not be applied
    #[error("failed to set socket options")]
    SetSocketOpt(#[source] std::io::Error),

    /// Address resolution or the TCP connect itself failed
    #[error("failed to connect")]
    Connect(#[source] std::io::Error),

    /// The logical channel could not be established on the connected socket
    #[error("failed to initialize the connection")]
    ConnectInit,

    /// The TLS handshake failed
    #[error("TLS handshake failed")]
    HandshakeFailed(#[source] std::io::Error),

    /// The peer certificate failed verification during the handshake
    #[error("TLS peer verification failed")]
    HandshakeVerifyFailed,
}

/// Errors returned by [`Session::send_msg`](crate::Session::send_msg).
#[derive(Error, Debug)]
pub enum SendError {
    /// The session is not running
    #[error("session is not running")]
    NotRunning,

    /// The message violates the framing constraints; no bytes were written
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The transport write failed
    #[error("failed to write to the transport")]
    Io(#[source] std::io::Error),
}
