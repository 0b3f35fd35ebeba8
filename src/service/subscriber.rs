//! Broadcast receiver and tag dispatcher.
//!
//! Routing is a first-match prefix scan over subscriptions in registration
//! order: the first registered tag that is a prefix of the incoming tag
//! wins. With `log` registered before `logcap`, a message tagged `logcap`
//! goes to the `log` handler. This mirrors the transport's own prefix
//! filtering.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use super::{Fault, HandlerError, Outcome, Service, guarded};
use crate::protocol::metrics::{Metrics, Rejection};
use crate::protocol::{BincodeEncoder, Encoder, Error, Result, envelope};
use crate::transport::{Context, Endpoint, EndpointConfig, Role};

type Dispatch = Box<dyn FnMut(&str, &[u8]) -> std::result::Result<(), Fault> + Send>;

struct Subscription {
    tag: String,
    description: Option<String>,
    dispatch: Dispatch,
}

/// Receives broadcasts and invokes the handler registered for their tag.
/// Connects to its address by default.
pub struct Subscriber<E: Encoder = BincodeEncoder> {
    endpoint: Endpoint<E>,
    subscriptions: Vec<Subscription>,
}

impl Subscriber<BincodeEncoder> {
    /// Connect a subscriber to `address` with default settings.
    pub fn new(ctx: &Context, address: impl Into<String>) -> Result<Self> {
        EndpointConfig::new(address).subscriber(ctx)
    }
}

impl<E: Encoder> EndpointConfig<E> {
    /// Open a subscriber (default role: connect).
    pub fn subscriber(self, ctx: &Context) -> Result<Subscriber<E>> {
        let endpoint = Endpoint::open(ctx, zmq::SUB, self, Role::Connect)?;
        Ok(Subscriber {
            endpoint,
            subscriptions: Vec::new(),
        })
    }
}

impl<E: Encoder> Subscriber<E> {
    /// Receive messages tagged with `tag` (or any tag it prefixes) and pass
    /// them to `handler` as `(incoming_tag, value)`.
    ///
    /// Subscribing again to the same tag replaces its handler and keeps its
    /// position in the routing order.
    pub fn subscribe<T, F>(&mut self, tag: &str, handler: F) -> Result<()>
    where
        T: DeserializeOwned + 'static,
        F: FnMut(&str, T) -> std::result::Result<(), HandlerError> + Send + 'static,
    {
        self.insert(tag, None, handler)
    }

    /// Like [`subscribe`](Self::subscribe), recording a human-readable
    /// description of the subscription.
    pub fn subscribe_described<T, F>(
        &mut self,
        tag: &str,
        description: impl Into<String>,
        handler: F,
    ) -> Result<()>
    where
        T: DeserializeOwned + 'static,
        F: FnMut(&str, T) -> std::result::Result<(), HandlerError> + Send + 'static,
    {
        self.insert(tag, Some(description.into()), handler)
    }

    /// Call registration belongs to responders.
    pub fn register<F>(&mut self, _name: &str, _handler: F) -> Result<()> {
        Err(Error::Unsupported {
            operation: "register",
            role: "subscriber",
        })
    }

    fn insert<T, F>(&mut self, tag: &str, description: Option<String>, mut handler: F) -> Result<()>
    where
        T: DeserializeOwned + 'static,
        F: FnMut(&str, T) -> std::result::Result<(), HandlerError> + Send + 'static,
    {
        envelope::validate_tag(tag)?;
        let encoder = Arc::clone(self.endpoint.encoder());
        let dispatch: Dispatch = Box::new(move |incoming: &str, payload: &[u8]| {
            let value: T = encoder.decode(payload).map_err(Fault::Decode)?;
            guarded(|| handler(incoming, value)).map_err(Fault::Handler)
        });

        if let Some(existing) = self.subscriptions.iter_mut().find(|s| s.tag == tag) {
            existing.description = description;
            existing.dispatch = dispatch;
            return Ok(());
        }
        self.endpoint.socket().subscribe(tag.as_bytes())?;
        debug!(tag, "subscribed");
        self.subscriptions.push(Subscription {
            tag: tag.to_owned(),
            description,
            dispatch,
        });
        Ok(())
    }

    /// Index of the first subscription whose tag prefixes `incoming`.
    fn route(&self, incoming: &str) -> Option<usize> {
        self.subscriptions
            .iter()
            .position(|s| incoming.starts_with(s.tag.as_str()))
    }

    /// Registered tag that would handle a message tagged `incoming`.
    #[must_use]
    pub fn route_for(&self, incoming: &str) -> Option<&str> {
        self.route(incoming)
            .map(|index| self.subscriptions[index].tag.as_str())
    }

    /// Subscribed tags in routing order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(|s| s.tag.as_str())
    }

    /// `(tag, description)` pairs in routing order.
    pub fn descriptions(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.subscriptions
            .iter()
            .map(|s| (s.tag.as_str(), s.description.as_deref()))
    }

    /// Close the socket.
    pub fn close(self) {
        self.endpoint.close();
    }
}

impl<E: Encoder> Service for Subscriber<E> {
    type Encoder = E;

    fn endpoint(&self) -> &Endpoint<E> {
        &self.endpoint
    }

    fn process(&mut self) -> Outcome {
        let raw = match self.endpoint.recv_envelope() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "subscriber receive failed");
                return Outcome::Failed(err);
            }
        };

        let (tag, payload) = match envelope::split_broadcast(&raw) {
            Ok(parts) => parts,
            Err(err) => {
                Metrics::record_rejection(Rejection::Decode);
                warn!(error = %err, "subscriber dropped malformed envelope");
                return Outcome::Failed(err);
            }
        };

        let Some(index) = self.route(&tag) else {
            Metrics::record_rejection(Rejection::Unroutable);
            warn!(tag = %tag, "no subscription matches tag");
            return Outcome::Unroutable { route: tag };
        };

        let payload = match self.endpoint.verify(payload) {
            Ok(payload) => payload,
            Err(err) => {
                error!(tag = %tag, error = %err, "subscriber error while authenticating message");
                return Outcome::Failed(err);
            }
        };

        let subscription = &mut self.subscriptions[index];
        match (subscription.dispatch)(&tag, &payload) {
            Ok(()) => {
                debug!(tag = %tag, subscription = %subscription.tag, "delivered");
                Outcome::Delivered { route: tag }
            }
            Err(Fault::Decode(err) | Fault::Encode(err)) => {
                Metrics::record_rejection(Rejection::Decode);
                warn!(tag = %tag, error = %err, "subscriber error while decoding message");
                Outcome::Failed(err)
            }
            Err(Fault::Handler(reason)) => {
                Metrics::record_rejection(Rejection::Handler);
                error!(tag = %tag, %reason, "subscription handler failed");
                Outcome::HandlerFailed { route: tag, reason }
            }
        }
    }
}

impl<E: Encoder> std::fmt::Debug for Subscriber<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("endpoint", &self.endpoint)
            .field("tags", &self.tags().collect::<Vec<_>>())
            .finish()
    }
}
