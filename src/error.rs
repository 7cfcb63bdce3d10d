//! Error types shared by the coordinator and the client wrapper.
//!
//! Every error here is scoped to a single episode or a single connection. None of them
//! stops the server process: the episode driver logs them and goes back to waiting for
//! the next pair of peers.

use thiserror::Error;

use crate::protocol::Role;

/// Failures while moving frames over a peer connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection (zero-length read, reset, broken pipe).
    #[error("peer disconnected")]
    Disconnected,

    /// A frame exceeded the configured maximum message length.
    #[error("frame of {len} bytes exceeds the {max} bytes limit")]
    FrameTooLarge { len: usize, max: usize },

    /// No frame arrived within the configured receive timeout.
    #[error("timed out waiting for peer")]
    Timeout,

    /// The payload could not be decoded into a known message.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match e.kind() {
            UnexpectedEof | ConnectionReset | ConnectionAborted | BrokenPipe | NotConnected => {
                TransportError::Disconnected
            }
            WouldBlock | TimedOut => TransportError::Timeout,
            _ => TransportError::Io(e),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Malformed(e.to_string())
    }
}

/// Errors that end an episode (or refuse a connection) on the server side.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A second connection claimed a role that is already held.
    #[error("role {0} occupied")]
    RoleConflict(Role),

    /// A peer sent a message of the wrong kind or at the wrong time.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A peer went away during the handshake or while stepping.
    #[error("{0} disconnected")]
    PeerDisconnected(Role),

    /// An action outside [-1, 1] under the rejecting action policy, or a non-finite action.
    #[error("{role} sent out of range action {value}")]
    OutOfRangeAction { role: Role, value: f64 },
}

impl SessionError {
    /// Classifies a transport failure coming from `role`'s connection.
    ///
    /// Anything but a clean disconnect is treated as a protocol violation.
    pub fn from_transport(role: Role, e: TransportError) -> Self {
        match e {
            TransportError::Disconnected => SessionError::PeerDisconnected(role),
            other => SessionError::ProtocolViolation(format!("{role}: {other}")),
        }
    }
}

/// Errors surfaced to agent code by [`Client`](crate::client::Client).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server closed the connection, or the episode was aborted.
    #[error("disconnected from server")]
    Disconnected,

    /// The server refused the role claim.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// The server answered with an unexpected message.
    #[error("unexpected reply from server: {0}")]
    UnexpectedReply(String),

    /// `step` was called before `connect`, or after the episode ended.
    #[error("no episode in progress")]
    NotConnected,

    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Disconnected => ClientError::Disconnected,
            other => ClientError::Transport(other),
        }
    }
}
