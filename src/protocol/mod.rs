//! Message pipeline building blocks
//!
//! This module provides payload encoding, message authentication, and the
//! wire envelopes used by the broadcast and call/response patterns.

mod auth;
mod encoder;
pub mod envelope;
mod error;
pub(crate) mod metrics;

pub use auth::Authenticator;
pub use encoder::{BincodeEncoder, Encoder, MsgPackEncoder};
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;

/// Separator between a broadcast tag and its payload.
pub const TAG_SEPARATOR: u8 = b' ';

/// Width of the authentication tag prefixed to signed payloads (HMAC-SHA256).
pub const SIGNATURE_LEN: usize = 32;
