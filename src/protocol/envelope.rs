//! Wire envelopes for the two messaging patterns.
//!
//! # Broadcast
//!
//! ```text
//! [TAG (utf-8, no spaces)] [0x20] [PAYLOAD (signed or raw)]
//! ```
//!
//! # Call / response
//!
//! Encoded as one value with the endpoint's encoder, arguments and result
//! inline:
//!
//! ```text
//! request: { name: <string>, args: [<arg>, ...] }
//! reply:   { result: <value or nil>, error: <string or nil> }
//! ```
//!
//! With MessagePack these are plain maps, so any MessagePack peer can call a
//! responder or answer a requester.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{Error, Result, TAG_SEPARATOR};

/// Check that `tag` can be placed on the wire.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.as_bytes().contains(&TAG_SEPARATOR) {
        return Err(Error::Config(format!("tag {tag:?} contains the separator")));
    }
    Ok(())
}

/// Build a broadcast envelope: `tag + b' ' + payload`.
#[must_use]
pub fn broadcast(tag: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tag.len() + 1 + payload.len());
    out.extend_from_slice(tag.as_bytes());
    out.push(TAG_SEPARATOR);
    out.extend_from_slice(payload);
    out
}

/// Split a broadcast envelope at the first separator.
///
/// The payload is returned as a zero-copy slice of `envelope`.
pub fn split_broadcast(envelope: &Bytes) -> Result<(String, Bytes)> {
    let at = envelope
        .iter()
        .position(|&b| b == TAG_SEPARATOR)
        .ok_or_else(|| Error::Parse("broadcast envelope has no tag separator".into()))?;
    let tag = std::str::from_utf8(&envelope[..at])
        .map_err(|e| Error::Parse(format!("tag is not valid UTF-8: {e}")))?;
    Ok((tag.to_owned(), envelope.slice(at + 1..)))
}

/// Call frame sent by a requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request<A> {
    /// Registered name of the call
    pub name: String,
    /// Argument tuple
    pub args: A,
}

impl<A> Request<A> {
    /// Create a request for call `name`.
    pub fn new(name: impl Into<String>, args: A) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Leading field of a [`Request`], decoded before the argument types are
/// known so the call can be routed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestHead {
    /// Registered name of the call
    pub name: String,
}

/// Response frame sent by a responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply<R> {
    /// Return value, present on success
    pub result: Option<R>,
    /// Error description, present on failure
    pub error: Option<String>,
}

impl<R> Reply<R> {
    /// Successful reply carrying `result`.
    #[must_use]
    pub fn success(result: R) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    /// Failed reply carrying an error description.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into a `Result`. A reply with neither slot set is a success
    /// without a value (a unit or nil result); one with both set is
    /// malformed.
    pub fn into_result(self) -> Result<std::result::Result<Option<R>, String>> {
        match (self.result, self.error) {
            (result, None) => Ok(Ok(result)),
            (None, Some(error)) => Ok(Err(error)),
            (Some(_), Some(_)) => Err(Error::Parse("reply carries both result and error".into())),
        }
    }
}
