//! Messaging patterns built on [`Endpoint`]: broadcast (publish/subscribe)
//! and call/response (request/reply).

mod buffered;
mod publisher;
mod requester;
mod responder;
mod subscriber;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::protocol::{Encoder, Error, Result};
use crate::transport::{Endpoint, TransportError};

pub use buffered::{BufferedHandle, BufferedSubscriber};
pub use publisher::Publisher;
pub use requester::{CallResult, Requester};
pub use responder::Responder;
pub use subscriber::Subscriber;

/// How long [`Service::run`] waits for a message before rechecking the
/// stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error type application handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What happened to the message taken by one processing step.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Routed to a handler that completed.
    Delivered {
        /// Incoming tag or call name
        route: String,
    },
    /// No handler is registered for the tag or call name.
    Unroutable {
        /// Incoming tag or call name
        route: String,
    },
    /// The handler returned an error or panicked.
    HandlerFailed {
        /// Incoming tag or call name
        route: String,
        /// Error text reported by the handler
        reason: String,
    },
    /// The message never reached a handler (transport, authentication,
    /// framing, or decoding failure).
    Failed(Error),
}

impl Outcome {
    /// Whether a handler ran to completion.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Tag or call name the message was addressed to, when known.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        match self {
            Self::Delivered { route }
            | Self::Unroutable { route }
            | Self::HandlerFailed { route, .. } => Some(route),
            Self::Failed(_) => None,
        }
    }
}

/// A long-running receive loop.
pub trait Service {
    /// Encoder of the underlying endpoint.
    type Encoder: Encoder;

    /// Endpoint the service reads from.
    fn endpoint(&self) -> &Endpoint<Self::Encoder>;

    /// Receive and dispatch exactly one message. Never panics and never
    /// fails: every problem is logged and reported in the [`Outcome`].
    fn process(&mut self) -> Outcome;

    /// Retry output an earlier step could not send. A socket still holding
    /// such output never polls readable.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Process messages until `stop` is set.
    ///
    /// The flag is checked at least every [`POLL_INTERVAL`]. Returns an
    /// error only if the socket itself becomes unusable.
    fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        info!(address = self.endpoint().address(), "service started");
        while !stop.load(Ordering::Acquire) {
            match self.flush() {
                Ok(()) => {}
                Err(Error::Transport(TransportError::Closed)) => break,
                Err(_) => {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
            }
            match self.endpoint().poll_readable(POLL_INTERVAL) {
                Ok(true) => {
                    self.process();
                }
                Ok(false) => {}
                Err(Error::Transport(TransportError::Closed)) => break,
                Err(err) => return Err(err),
            }
        }
        info!(address = self.endpoint().address(), "service stopped");
        Ok(())
    }
}

/// Why a registered handler did not produce a value.
#[derive(Debug)]
pub(crate) enum Fault {
    Decode(Error),
    Encode(Error),
    Handler(String),
}

/// Run application code, turning errors and panics into a description.
pub(crate) fn guarded<T>(
    f: impl FnOnce() -> std::result::Result<T, HandlerError>,
) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("handler panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "non-string panic payload"
    }
}
