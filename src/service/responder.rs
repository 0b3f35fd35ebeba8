//! Call/response server.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use super::{Fault, HandlerError, Outcome, Service, guarded};
use crate::protocol::envelope::{Reply, Request, RequestHead};
use crate::protocol::metrics::{Metrics, Rejection};
use crate::protocol::{BincodeEncoder, Encoder, Result};
use crate::transport::{Context, Endpoint, EndpointConfig, Role};

type Handler = Box<dyn FnMut(&[u8]) -> std::result::Result<Vec<u8>, Fault> + Send>;

struct Registration {
    description: Option<String>,
    handler: Handler,
}

/// Answers named calls. Binds its address by default.
///
/// Every request that was received gets exactly one reply, whether or not
/// it could be authenticated, decoded, routed, or handled. A reply the
/// transport refused is kept and sent again before the next request is
/// taken.
pub struct Responder<E: Encoder = BincodeEncoder> {
    endpoint: Endpoint<E>,
    registry: BTreeMap<String, Registration>,
    unsent: Option<Vec<u8>>,
}

impl Responder<BincodeEncoder> {
    /// Bind a responder on `address` with default settings.
    pub fn new(ctx: &Context, address: impl Into<String>) -> Result<Self> {
        EndpointConfig::new(address).responder(ctx)
    }
}

impl<E: Encoder> EndpointConfig<E> {
    /// Open a responder (default role: bind).
    pub fn responder(self, ctx: &Context) -> Result<Responder<E>> {
        let endpoint = Endpoint::open(ctx, zmq::REP, self, Role::Bind)?;
        Ok(Responder {
            endpoint,
            registry: BTreeMap::new(),
            unsent: None,
        })
    }
}

impl<E: Encoder> Responder<E> {
    /// Answer calls named `name` with `handler`, which receives the decoded
    /// argument tuple. Registering a name again replaces its handler.
    pub fn register<A, R, F>(&mut self, name: &str, handler: F)
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: FnMut(A) -> std::result::Result<R, HandlerError> + Send + 'static,
    {
        self.insert(name, None, handler);
    }

    /// Like [`register`](Self::register), recording a human-readable
    /// description of the call.
    pub fn register_described<A, R, F>(&mut self, name: &str, description: impl Into<String>, handler: F)
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: FnMut(A) -> std::result::Result<R, HandlerError> + Send + 'static,
    {
        self.insert(name, Some(description.into()), handler);
    }

    fn insert<A, R, F>(&mut self, name: &str, description: Option<String>, mut handler: F)
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: FnMut(A) -> std::result::Result<R, HandlerError> + Send + 'static,
    {
        let encoder = Arc::clone(self.endpoint.encoder());
        let handler: Handler = Box::new(move |frame: &[u8]| {
            let request: Request<A> = encoder.decode(frame).map_err(Fault::Decode)?;
            let result = guarded(|| handler(request.args)).map_err(Fault::Handler)?;
            encoder.encode(&Reply::success(result)).map_err(Fault::Encode)
        });
        let previous = self
            .registry
            .insert(name.to_owned(), Registration { description, handler });
        debug!(call = name, replaced = previous.is_some(), "registered");
    }

    /// Registered call names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn descriptions(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.registry
            .iter()
            .map(|(name, reg)| (name.as_str(), reg.description.as_deref()))
    }

    /// Close the socket.
    pub fn close(self) {
        self.endpoint.close();
    }

    /// Work out the reply for one received message: the encoded reply, or
    /// the error text to report.
    fn answer(&mut self, raw: bytes::Bytes) -> (Outcome, std::result::Result<Vec<u8>, String>) {
        let (frame, head) = match self.endpoint.verify(raw).and_then(|frame| {
            let head: RequestHead = self.endpoint.decode(&frame)?;
            Ok((frame, head))
        }) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(error = %err, "responder rejected request");
                let text = format!("rejected request: {err}");
                return (Outcome::Failed(err), Err(text));
            }
        };

        let name = head.name;
        let Some(registration) = self.registry.get_mut(&name) else {
            Metrics::record_rejection(Rejection::Unroutable);
            warn!(call = %name, "no call registered under this name");
            let text = format!("unknown call {name:?}");
            return (Outcome::Unroutable { route: name }, Err(text));
        };

        match (registration.handler)(&frame[..]) {
            Ok(reply) => {
                debug!(call = %name, "handled");
                (Outcome::Delivered { route: name }, Ok(reply))
            }
            Err(Fault::Decode(err)) => {
                Metrics::record_rejection(Rejection::Decode);
                warn!(call = %name, error = %err, "invalid call arguments");
                let text = format!("invalid arguments for {name:?}: {err}");
                (Outcome::Failed(err), Err(text))
            }
            Err(Fault::Encode(err)) => {
                Metrics::record_rejection(Rejection::Encode);
                error!(call = %name, error = %err, "cannot encode call result");
                let text = format!("cannot encode result of {name:?}: {err}");
                (Outcome::Failed(err), Err(text))
            }
            Err(Fault::Handler(reason)) => {
                Metrics::record_rejection(Rejection::Handler);
                error!(call = %name, %reason, "call handler failed");
                let text = reason.clone();
                (Outcome::HandlerFailed { route: name, reason }, Err(text))
            }
        }
    }

    /// Send a sealed reply, keeping it for a retry if the transport refuses.
    fn deliver(&mut self, sealed: Vec<u8>) -> Result<()> {
        match self.endpoint.send_raw(&sealed) {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(error = %err, "reply not sent; retrying before the next receive");
                self.unsent = Some(sealed);
                Err(err)
            }
        }
    }
}

impl<E: Encoder> Service for Responder<E> {
    type Encoder = E;

    fn endpoint(&self) -> &Endpoint<E> {
        &self.endpoint
    }

    #[instrument(level = "trace", skip(self), fields(address = %self.endpoint.address()))]
    fn process(&mut self) -> Outcome {
        if let Err(err) = self.flush() {
            return Outcome::Failed(err);
        }
        let raw = match self.endpoint.recv_envelope() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "responder receive failed");
                return Outcome::Failed(err);
            }
        };

        let (outcome, reply) = self.answer(raw);
        let encoded = match reply {
            Ok(encoded) => encoded,
            Err(text) => match self.endpoint.encode(&Reply::<()>::failure(text)) {
                Ok(encoded) => encoded,
                Err(err) => {
                    error!(error = %err, "cannot encode reply");
                    return Outcome::Failed(err);
                }
            },
        };
        let sealed = self.endpoint.sign(encoded);
        match self.deliver(sealed) {
            Ok(()) => outcome,
            Err(err) => Outcome::Failed(err),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(sealed) = self.unsent.take() {
            self.deliver(sealed)?;
            debug!("pending reply sent");
        }
        Ok(())
    }
}

impl<E: Encoder> std::fmt::Debug for Responder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("endpoint", &self.endpoint)
            .field("calls", &self.names().collect::<Vec<_>>())
            .field("reply_pending", &self.unsent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::protocol::Authenticator;

    /// A responder plus a raw REQ endpoint; sends never block, so both
    /// sides can be driven from the test thread.
    fn pair(ctx: &Context, addr: &str) -> (Responder, Endpoint) {
        let mut responder = EndpointConfig::new(addr)
            .recv_timeout(Duration::from_secs(1))
            .responder(ctx)
            .unwrap();
        responder.register("add", |(x, y): (i64, i64)| Ok(x + y));
        responder.register("fail", |(): ()| Err::<(), HandlerError>("out of cheese".into()));
        responder.register("explode", |(): ()| -> std::result::Result<(), HandlerError> {
            panic!("kaboom")
        });
        let client = EndpointConfig::new(addr)
            .recv_timeout(Duration::from_secs(1))
            .connect();
        let client = Endpoint::open(ctx, zmq::REQ, client, Role::Connect).unwrap();
        (responder, client)
    }

    fn exchange<A: Serialize, R: DeserializeOwned>(
        responder: &mut Responder,
        client: &Endpoint,
        name: &str,
        args: &A,
    ) -> (Outcome, Reply<R>) {
        client.send(&Request::new(name, args)).unwrap();
        let outcome = responder.process();
        let reply: Reply<R> = client.receive().unwrap();
        (outcome, reply)
    }

    #[test]
    fn registered_call_is_answered() {
        let ctx = Context::new();
        let (mut responder, client) = pair(&ctx, "inproc://responder-add");
        let (outcome, reply) = exchange::<_, i64>(&mut responder, &client, "add", &(2i64, 3i64));
        assert!(outcome.is_delivered());
        assert_eq!(reply.into_result().unwrap(), Ok(Some(5)));
    }

    #[test]
    fn unknown_name_gets_error_reply() {
        let ctx = Context::new();
        let (mut responder, client) = pair(&ctx, "inproc://responder-unknown");
        let (outcome, reply) = exchange::<_, i64>(&mut responder, &client, "sub", &(2i64, 3i64));
        assert!(matches!(outcome, Outcome::Unroutable { ref route } if route == "sub"));
        assert_eq!(reply.result, None);
        assert!(reply.error.unwrap().contains("sub"));
    }

    #[test]
    fn handler_errors_and_panics_become_replies() {
        let ctx = Context::new();
        let (mut responder, client) = pair(&ctx, "inproc://responder-fail");

        let (outcome, reply) = exchange::<_, ()>(&mut responder, &client, "fail", &());
        assert!(matches!(outcome, Outcome::HandlerFailed { .. }));
        assert_eq!(reply.error.as_deref(), Some("out of cheese"));

        let (outcome, reply) = exchange::<_, ()>(&mut responder, &client, "explode", &());
        assert!(matches!(outcome, Outcome::HandlerFailed { .. }));
        assert_eq!(reply.error.as_deref(), Some("handler panicked: kaboom"));

        // still serving
        let (outcome, _) = exchange::<_, i64>(&mut responder, &client, "add", &(1i64, 1i64));
        assert!(outcome.is_delivered());
    }

    #[test]
    fn wrong_argument_shape_gets_error_reply() {
        let ctx = Context::new();
        let (mut responder, client) = pair(&ctx, "inproc://responder-args");
        let (outcome, reply) = exchange::<_, i64>(&mut responder, &client, "add", &true);
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert!(reply.error.unwrap().starts_with("invalid arguments"));
    }

    #[test]
    fn unauthenticated_request_is_still_answered() {
        let ctx = Context::new();
        let addr = "inproc://responder-auth";
        let mut responder = EndpointConfig::new(addr)
            .authenticator(Authenticator::new("secret"))
            .recv_timeout(Duration::from_secs(1))
            .responder(&ctx)
            .unwrap();
        responder.register("add", |(x, y): (i64, i64)| Ok(x + y));
        let client = EndpointConfig::new(addr).recv_timeout(Duration::from_secs(1));
        let client = Endpoint::open(&ctx, zmq::REQ, client, Role::Connect).unwrap();

        client.send(&Request::new("add", (1i64, 2i64))).unwrap();
        let outcome = responder.process();
        assert!(matches!(outcome, Outcome::Failed(ref e) if e.is_protocol()));
        // the reply exists even though this client cannot read a signed frame
        assert!(client.receive_raw().is_ok());
    }

    /// Take a request by hand and leave its reply pending, as after a send
    /// the transport refused.
    fn leave_reply_pending(responder: &mut Responder, client: &Endpoint, sum: i64) {
        client.send(&Request::new("add", (sum, 0i64))).unwrap();
        responder.endpoint.recv_envelope().unwrap();
        let sealed = responder.endpoint.seal(&Reply::success(sum)).unwrap();
        responder.unsent = Some(sealed);
    }

    #[test]
    fn pending_reply_is_sent_before_the_next_request() {
        let ctx = Context::new();
        let (mut responder, client) = pair(&ctx, "inproc://responder-pending");
        leave_reply_pending(&mut responder, &client, 7);

        responder.flush().unwrap();
        assert!(responder.unsent.is_none());
        let reply: Reply<i64> = client.receive().unwrap();
        assert_eq!(reply.into_result().unwrap(), Ok(Some(7)));

        let (outcome, reply) = exchange::<_, i64>(&mut responder, &client, "add", &(2i64, 3i64));
        assert!(outcome.is_delivered());
        assert_eq!(reply.result, Some(5));
    }

    #[test]
    fn run_recovers_a_pending_reply() {
        let ctx = Context::new();
        let (mut responder, client) = pair(&ctx, "inproc://responder-pending-run");
        leave_reply_pending(&mut responder, &client, 7);

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let server = thread::spawn(move || responder.run(&flag));

        let reply: Reply<i64> = client.receive().unwrap();
        assert_eq!(reply.result, Some(7));
        client.send(&Request::new("add", (2i64, 3i64))).unwrap();
        let reply: Reply<i64> = client.receive().unwrap();
        assert_eq!(reply.result, Some(5));

        stop.store(true, Ordering::Release);
        server.join().unwrap().unwrap();
    }

    #[test]
    fn registry_lists_sorted_names_with_descriptions() {
        let ctx = Context::new();
        let mut responder = Responder::new(&ctx, "inproc://responder-registry").unwrap();
        responder.register_described("mul", "multiply two integers", |(x, y): (i64, i64)| Ok(x * y));
        responder.register("add", |(x, y): (i64, i64)| Ok(x + y));
        responder.register_described("add", "add two integers", |(x, y): (i64, i64)| Ok(x + y));

        assert_eq!(responder.names().collect::<Vec<_>>(), vec!["add", "mul"]);
        assert_eq!(
            responder.descriptions().collect::<Vec<_>>(),
            vec![
                ("add", Some("add two integers")),
                ("mul", Some("multiply two integers"))
            ]
        );
    }
}
