//! Transport-level error types covering socket setup, deadlines, and closure.

use core::fmt;

/// Direction of a socket operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Handing a message to the socket
    Send,
    /// Taking a message off the socket
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => f.write_str("send"),
            Self::Receive => f.write_str("receive"),
        }
    }
}

/// Unified error type for socket operations.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// A configured send or receive timeout elapsed.
    Timeout {
        /// Operation that timed out.
        direction: Direction,
    },
    /// The socket or its context has been closed.
    Closed,
    /// Bind or connect to an address failed.
    Address {
        /// Address that was rejected.
        address: String,
        /// Underlying failure.
        source: zmq::Error,
    },
    /// Any other transport failure.
    Socket(zmq::Error),
}

impl TransportError {
    pub(crate) fn from_zmq(err: zmq::Error, direction: Direction) -> Self {
        match err {
            zmq::Error::EAGAIN => Self::Timeout { direction },
            zmq::Error::ETERM | zmq::Error::ENOTSOCK => Self::Closed,
            other => Self::Socket(other),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { direction } => write!(f, "{direction} timed out"),
            Self::Closed => f.write_str("socket closed"),
            Self::Address { address, source } => {
                write!(f, "cannot attach to {address}: {source}")
            }
            Self::Socket(err) => write!(f, "socket error: {err}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Address { source, .. } | Self::Socket(source) => Some(source),
            _ => None,
        }
    }
}

impl From<zmq::Error> for TransportError {
    fn from(err: zmq::Error) -> Self {
        Self::Socket(err)
    }
}
