//! Call/response client.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{instrument, trace, warn};

use crate::protocol::envelope::{Reply, Request};
use crate::protocol::{BincodeEncoder, Encoder, Result};
use crate::transport::{Context, Endpoint, EndpointConfig, Role};

/// `(result, error)`: exactly one side is populated.
pub type CallResult<R> = (Option<R>, Option<String>);

/// Issues named calls to a [`Responder`](super::Responder) and waits for
/// the reply. Connects to its address by default.
#[derive(Debug)]
pub struct Requester<E: Encoder = BincodeEncoder> {
    endpoint: Endpoint<E>,
}

impl Requester<BincodeEncoder> {
    /// Connect a requester to `address` with default settings.
    pub fn new(ctx: &Context, address: impl Into<String>) -> Result<Self> {
        EndpointConfig::new(address).requester(ctx)
    }
}

impl<E: Encoder> EndpointConfig<E> {
    /// Open a requester (default role: connect).
    pub fn requester(self, ctx: &Context) -> Result<Requester<E>> {
        let endpoint = Endpoint::open(ctx, zmq::REQ, self, Role::Connect)?;
        endpoint.socket().relax_request_state()?;
        Ok(Requester { endpoint })
    }
}

impl<E: Encoder> Requester<E> {
    /// Call `name` with the argument tuple `args`.
    ///
    /// Never fails outright: encoding, transport, authentication and
    /// decoding problems come back in the error slot together with errors
    /// reported by the responder. A call whose result is nil on the wire
    /// (a unit result over MessagePack) returns `(None, None)`.
    ///
    /// ```no_run
    /// # use zmqservice::{Context, Requester};
    /// let ctx = Context::new();
    /// let requester = Requester::new(&ctx, "tcp://127.0.0.1:5555")?;
    /// let (sum, error) = requester.call::<_, i64>("add", (2i64, 3i64));
    /// assert_eq!((sum, error), (Some(5), None));
    /// # Ok::<(), zmqservice::Error>(())
    /// ```
    pub fn call<A: Serialize, R: DeserializeOwned>(&self, name: &str, args: A) -> CallResult<R> {
        match self.try_call(name, &args) {
            Ok(Ok(value)) => (value, None),
            Ok(Err(reported)) => (None, Some(reported)),
            Err(err) => {
                warn!(call = name, error = %err, "call failed");
                (None, Some(err.to_string()))
            }
        }
    }

    /// Like [`call`](Self::call), keeping local failures apart from errors
    /// reported by the responder: the outer `Err` is a local failure, the
    /// inner one the responder's error text.
    #[instrument(level = "debug", skip(self, args), fields(address = %self.endpoint.address()))]
    pub fn try_call<A, R>(
        &self,
        name: &str,
        args: &A,
    ) -> Result<std::result::Result<Option<R>, String>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.endpoint.send(&Request::new(name, args))?;
        let reply: Reply<R> = self.endpoint.receive()?;
        trace!("reply received");
        reply.into_result()
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
