//! Error types for the link layers.

use std::os::fd::RawFd;

use orrery_crypto::CryptoError;
use orrery_wire::WireError;

/// Errors that can occur on a link or listener.
///
/// The raw layer produces the I/O kinds; crypto and wire failures from the
/// layers above nest transparently so callers can still match on them.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The cancellation token was stopped during a blocking operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The peer closed the connection.
    #[error("connection hangup")]
    Hangup,
    /// No resolved address accepted a connection.
    #[error("could not connect to {host}")]
    ConnectFailed { host: String },
    /// No local address could be bound.
    #[error("could not bind a listening socket")]
    BindFailed,
    /// An unexpected OS error.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    /// The descriptor behind a link is not valid; a programmer error.
    #[error("invalid fd: {fd}")]
    InvalidFd { fd: RawFd },
    /// The challenge echo disagreed: the peers hold different passwords.
    #[error("password mismatch")]
    PasswordMismatch,
    /// The link already failed or was torn down; no further I/O is possible.
    #[error("link is closed")]
    Closed,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Wire(#[from] WireError),
}
