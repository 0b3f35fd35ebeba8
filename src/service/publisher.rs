//! Broadcast sender.

use serde::Serialize;
use tracing::{instrument, trace};

use crate::protocol::{BincodeEncoder, Encoder, Result, envelope};
use crate::transport::{Context, Endpoint, EndpointConfig, Role};

/// Fire-and-forget broadcaster; binds its address by default.
#[derive(Debug)]
pub struct Publisher<E: Encoder = BincodeEncoder> {
    endpoint: Endpoint<E>,
}

impl Publisher<BincodeEncoder> {
    /// Bind a publisher on `address` with default settings.
    pub fn new(ctx: &Context, address: impl Into<String>) -> Result<Self> {
        EndpointConfig::new(address).publisher(ctx)
    }
}

impl<E: Encoder> EndpointConfig<E> {
    /// Open a publisher (default role: bind).
    pub fn publisher(self, ctx: &Context) -> Result<Publisher<E>> {
        let endpoint = Endpoint::open(ctx, zmq::PUB, self, Role::Bind)?;
        Ok(Publisher { endpoint })
    }
}

impl<E: Encoder> Publisher<E> {
    /// Encode and sign `value`, then attach `tag`.
    pub fn build_payload<T: Serialize + ?Sized>(&self, tag: &str, value: &T) -> Result<Vec<u8>> {
        envelope::validate_tag(tag)?;
        let payload = self.endpoint.seal(value)?;
        Ok(envelope::broadcast(tag, &payload))
    }

    /// Broadcast `value` to every subscriber of `tag`.
    ///
    /// Delivery is whatever the transport offers: subscribers that are not
    /// yet connected, or whose queues are full, miss the message.
    #[instrument(level = "trace", skip(self, value), fields(address = %self.endpoint.address()))]
    pub fn publish<T: Serialize + ?Sized>(&self, tag: &str, value: &T) -> Result<()> {
        let payload = self.build_payload(tag, value)?;
        self.endpoint.send_raw(&payload)?;
        trace!(tag, "published");
        Ok(())
    }

    /// Underlying endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint<E> {
        &self.endpoint
    }

    /// Close the socket.
    pub fn close(self) {
        self.endpoint.close();
    }
}
