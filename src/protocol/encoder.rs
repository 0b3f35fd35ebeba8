//! Pluggable payload serialization.
//!
//! An [`Encoder`] turns application values into bytes and back. Two
//! strategies ship with the crate:
//!
//! - [`BincodeEncoder`]: compact Rust-native object format. Both peers must
//!   agree on the exact Rust types; this is the default.
//! - [`MsgPackEncoder`]: MessagePack with structs written as maps, readable
//!   by any MessagePack implementation.
//!
//! Serialization library errors never escape this module: they are wrapped
//! into [`Error::Encode`] / [`Error::Decode`] carrying the original text.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Error, Result};

/// Serialization strategy shared by endpoints.
///
/// Implementations are stateless per call and may be shared across any
/// number of endpoints and threads.
pub trait Encoder: Send + Sync + 'static {
    /// Serialize `value` into bytes.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes into a `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Rust-native binary encoding via `bincode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BincodeEncoder;

impl Encoder for BincodeEncoder {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Cross-language MessagePack encoding via `rmp-serde`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgPackEncoder;

impl Encoder for MsgPackEncoder {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}
