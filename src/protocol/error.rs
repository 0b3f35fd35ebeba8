//! Service error types

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by endpoints and the services built on them.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Value could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes could not be deserialized into the requested type
    #[error("decode error: {0}")]
    Decode(String),

    /// Signed payload could not be processed (malformed, truncated, bad key)
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Signature present but does not match the payload
    #[error("invalid signature")]
    InvalidSignature,

    /// Broadcast or call envelope is structurally malformed
    #[error("malformed envelope: {0}")]
    Parse(String),

    /// Endpoint configuration rejected
    #[error("endpoint configuration error: {0}")]
    Config(String),

    /// Operation does not apply to this endpoint role
    #[error("operation `{operation}` not supported on a {role}")]
    Unsupported {
        /// Rejected operation
        operation: &'static str,
        /// Role of the endpoint it was attempted on
        role: &'static str,
    },

    /// Underlying socket failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Whether the error is a send or receive deadline elapsing.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout { .. }))
    }

    /// Whether the error came from message processing (encode, decode,
    /// authentication, framing) rather than the transport or configuration.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Encode(_)
                | Self::Decode(_)
                | Self::Authentication(_)
                | Self::InvalidSignature
                | Self::Parse(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
