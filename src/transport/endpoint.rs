//! Endpoint: one socket plus the encode/sign and verify/decode pipeline.
//!
//! ```text
//! outgoing: encode -> sign(*) -> socket send
//! incoming: socket receive -> verify(*) -> decode
//! ```
//!
//! (*) only when an [`Authenticator`] is attached. Signing is all or
//! nothing per endpoint: a peer without the authenticator cannot read
//! signed traffic, and a signing peer rejects unsigned traffic.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};

use super::config::{EndpointConfig, Role};
use super::context::Context;
use super::socket::SocketBinding;
use crate::protocol::metrics::{Metrics, Rejection};
use crate::protocol::{Authenticator, BincodeEncoder, Encoder, Result, SIGNATURE_LEN};

/// Owns one transport socket and its message pipeline.
pub struct Endpoint<E: Encoder = BincodeEncoder> {
    socket: SocketBinding,
    address: String,
    role: Role,
    encoder: Arc<E>,
    authenticator: Option<Arc<Authenticator>>,
}

impl<E: Encoder> Endpoint<E> {
    /// Open a socket of `kind` and attach it per `config`, falling back to
    /// `default_role` when the configuration leaves the role open.
    #[instrument(level = "debug", skip(ctx, kind, config), fields(address = %config.address))]
    pub(crate) fn open(
        ctx: &Context,
        kind: zmq::SocketType,
        config: EndpointConfig<E>,
        default_role: Role,
    ) -> Result<Self> {
        let requested = config.role.unwrap_or(default_role);
        config.validate(requested)?;

        let socket = SocketBinding::open(ctx, kind)?;
        socket.set_send_timeout(config.timeouts.send_millis()?)?;
        socket.set_recv_timeout(config.timeouts.recv_millis()?)?;
        let role = socket.attach(&config.address, requested)?;

        Metrics::record_endpoint_open();
        debug!(%role, authenticated = config.authenticator.is_some(), "endpoint open");
        Ok(Self {
            socket,
            address: config.address,
            role,
            encoder: config.encoder,
            authenticator: config.authenticator,
        })
    }

    /// Encode, sign, and send `value`.
    #[instrument(level = "trace", skip(self, value), fields(address = %self.address))]
    pub fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let payload = self.seal(value)?;
        self.send_raw(&payload)
    }

    /// Receive, verify, and decode one message.
    #[instrument(level = "trace", skip(self), fields(address = %self.address))]
    pub fn receive<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.receive_raw()?;
        self.decode(&payload)
    }

    /// Receive and verify one message, leaving it encoded.
    pub fn receive_raw(&self) -> Result<Bytes> {
        let message = self.recv_envelope()?;
        self.verify(message)
    }

    /// Encode then sign `value`, without sending it.
    pub fn seal<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let encoded = self.encode(value)?;
        Ok(self.sign(encoded))
    }

    /// Serialize `value` with this endpoint's encoder.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        self.encoder.encode(value).inspect_err(|_| {
            Metrics::record_rejection(Rejection::Encode);
        })
    }

    /// Deserialize `bytes` with this endpoint's encoder.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        self.encoder.decode(bytes).inspect_err(|_| {
            Metrics::record_rejection(Rejection::Decode);
        })
    }

    /// Prefix the authentication tag; a no-op without an authenticator.
    #[must_use]
    pub fn sign(&self, payload: Vec<u8>) -> Vec<u8> {
        match &self.authenticator {
            Some(auth) => auth.signed(&payload),
            None => payload,
        }
    }

    /// Check and strip the authentication tag; a no-op without an
    /// authenticator.
    ///
    /// Signature mismatches surface as [`crate::Error::InvalidSignature`];
    /// payloads too short to carry a tag as [`crate::Error::Authentication`].
    pub fn verify(&self, payload: Bytes) -> Result<Bytes> {
        let Some(auth) = &self.authenticator else {
            return Ok(payload);
        };
        match auth.auth(&payload) {
            Ok(()) => Ok(payload.slice(SIGNATURE_LEN..)),
            Err(err) => {
                Metrics::record_rejection(Rejection::Auth);
                Err(err)
            }
        }
    }

    /// Hand already sealed bytes to the transport.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        self.socket.send(bytes)?;
        Metrics::record_sent();
        trace!(len = bytes.len(), "sent");
        Ok(())
    }

    /// Take one message off the transport, unverified.
    pub fn recv_envelope(&self) -> Result<Bytes> {
        let bytes = self.socket.recv()?;
        Metrics::record_received();
        trace!(len = bytes.len(), "received");
        Ok(bytes)
    }

    /// Wait up to `timeout` for an incoming message.
    pub fn poll_readable(&self, timeout: Duration) -> Result<bool> {
        Ok(self.socket.poll_readable(timeout)?)
    }

    /// Configured address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Resolved address, e.g. the port chosen for `tcp://host:*`.
    #[must_use]
    pub fn last_endpoint(&self) -> Option<String> {
        self.socket.last_endpoint()
    }

    /// Role actually taken (a failed bind falls back to connect).
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether messages are signed and verified.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticator.is_some()
    }

    /// Shared encoder.
    #[must_use]
    pub fn encoder(&self) -> &Arc<E> {
        &self.encoder
    }

    pub(crate) fn socket(&self) -> &SocketBinding {
        &self.socket
    }

    /// Close the socket. Dropping the endpoint has the same effect.
    pub fn close(self) {
        debug!(address = %self.address, "endpoint closed");
    }
}

impl<E: Encoder> Drop for Endpoint<E> {
    fn drop(&mut self) {
        Metrics::record_endpoint_close();
    }
}

impl<E: Encoder> fmt::Debug for Endpoint<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("role", &self.role)
            .field("kind", &self.socket.kind())
            .field("authenticated", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}
