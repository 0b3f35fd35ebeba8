//! Lightweight messaging services over ZeroMQ.
//!
//! Two patterns are provided on top of a common [`Endpoint`] pipeline
//! (`encode -> sign -> send`, `receive -> verify -> decode`):
//!
//! - **broadcast**: a [`Publisher`] sends `tag + ' ' + payload`, a
//!   [`Subscriber`] dispatches on the first registered tag that prefixes the
//!   incoming one;
//! - **call/response**: a [`Requester`] sends a named call, a [`Responder`]
//!   answers every call with exactly one `(result, error)` reply.
//!
//! Payloads are serialized by a pluggable [`Encoder`] (bincode by default,
//! MessagePack for cross-language peers) and optionally signed with a shared
//! secret through an [`Authenticator`] (HMAC-SHA256).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::thread;
//! use zmqservice::{Context, Requester, Responder, Service};
//!
//! let ctx = Context::new();
//!
//! let mut responder = Responder::new(&ctx, "tcp://127.0.0.1:5555")?;
//! responder.register("add", |(x, y): (i64, i64)| Ok(x + y));
//! thread::spawn(move || responder.process());
//!
//! let requester = Requester::new(&ctx, "tcp://127.0.0.1:5555")?;
//! assert_eq!(requester.call::<_, i64>("add", (2i64, 3i64)), (Some(5), None));
//! # Ok::<(), zmqservice::Error>(())
//! ```
//!
//! # Signing
//!
//! ```rust,no_run
//! use zmqservice::{Authenticator, Context, EndpointConfig, MsgPackEncoder};
//!
//! let ctx = Context::new();
//! let publisher = EndpointConfig::new("tcp://*:5556")
//!     .encoder(MsgPackEncoder)
//!     .authenticator(Authenticator::new("shared secret"))
//!     .publisher(&ctx)?;
//! publisher.publish("log", "hello")?;
//! # Ok::<(), zmqservice::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod protocol;
pub mod service;
pub mod transport;

pub use protocol::{
    Authenticator, BincodeEncoder, Encoder, Error, MetricsSnapshot, MsgPackEncoder, Result,
};
pub use service::{
    BufferedHandle, BufferedSubscriber, CallResult, HandlerError, Outcome, Publisher, Requester,
    Responder, Service, Subscriber,
};
pub use transport::{Context, ContextFactory, Endpoint, EndpointConfig, Role, Timeouts};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Snapshot of the process-wide pipeline counters.
#[must_use]
pub fn metrics_snapshot() -> MetricsSnapshot {
    protocol::metrics::Metrics::totals()
}
