//! Subscriber that reads on a background thread and dispatches on the
//! caller's thread.
//!
//! The I/O thread only decodes and queues; handlers run when the owner
//! calls [`BufferedHandle::dispatch_next`]. A single FIFO queue keeps
//! per-tag order intact.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::{HandlerError, Service, Subscriber, guarded};
use crate::protocol::metrics::{Metrics, Rejection};
use crate::protocol::{BincodeEncoder, Encoder, Error, Result};
use crate::transport::TransportError;

/// `(registered tag, incoming tag, decoded value)`
type Queued = (String, String, Box<dyn Any + Send>);

type LocalHandler = Box<dyn FnMut(&str, Box<dyn Any + Send>) -> std::result::Result<(), HandlerError>>;

/// A [`Subscriber`] whose handlers run away from the socket thread.
pub struct BufferedSubscriber<E: Encoder = BincodeEncoder> {
    subscriber: Subscriber<E>,
    sender: Sender<Queued>,
    receiver: Receiver<Queued>,
    handlers: HashMap<String, LocalHandler>,
}

impl<E: Encoder> BufferedSubscriber<E> {
    /// Wrap a subscriber that has not been started yet.
    #[must_use]
    pub fn new(subscriber: Subscriber<E>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            subscriber,
            sender,
            receiver,
            handlers: HashMap::new(),
        }
    }

    /// Route `tag` to `handler`. Decoding happens on the I/O thread; the
    /// handler itself runs inside [`BufferedHandle::dispatch_next`] and so
    /// need not be `Send`.
    pub fn subscribe<T, F>(&mut self, tag: &str, mut handler: F) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(&str, T) -> std::result::Result<(), HandlerError> + 'static,
    {
        let sender = self.sender.clone();
        let registered = tag.to_owned();
        self.subscriber.subscribe(tag, move |incoming: &str, value: T| {
            sender
                .send((registered.clone(), incoming.to_owned(), Box::new(value)))
                .map_err(|_| HandlerError::from("dispatch queue closed"))
        })?;
        self.handlers.insert(
            tag.to_owned(),
            Box::new(move |incoming: &str, value: Box<dyn Any + Send>| {
                let value = value
                    .downcast::<T>()
                    .map_err(|_| HandlerError::from("queued value has an unexpected type"))?;
                handler(incoming, *value)
            }),
        );
        Ok(())
    }

    /// Move the subscriber onto its own thread and start receiving.
    pub fn start(self) -> Result<BufferedHandle> {
        let Self {
            mut subscriber,
            sender,
            receiver,
            handlers,
        } = self;
        drop(sender);

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("zmqservice-subscriber".into())
            .spawn(move || subscriber.run(&flag))
            .map_err(|e| Error::Config(format!("cannot start subscriber thread: {e}")))?;
        debug!("buffered subscriber started");

        Ok(BufferedHandle {
            receiver,
            handlers,
            stop,
            worker: Some(worker),
        })
    }
}

/// Owner side of a started [`BufferedSubscriber`].
pub struct BufferedHandle {
    receiver: Receiver<Queued>,
    handlers: HashMap<String, LocalHandler>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl BufferedHandle {
    /// Run the handler for the next queued message.
    ///
    /// Waits up to `timeout` (forever with `None`). Returns the message's
    /// incoming tag, `None` if nothing arrived in time, or
    /// [`TransportError::Closed`] once the I/O thread has exited and the
    /// queue is drained. Handler failures are logged, not returned.
    pub fn dispatch_next(&mut self, timeout: Option<Duration>) -> Result<Option<String>> {
        let next = match timeout {
            None => self.receiver.recv().ok(),
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(queued) => Some(queued),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => None,
            },
        };
        let Some((registered, incoming, value)) = next else {
            return Err(TransportError::Closed.into());
        };

        if let Some(handler) = self.handlers.get_mut(&registered) {
            if let Err(reason) = guarded(|| handler(&incoming, value)) {
                Metrics::record_rejection(Rejection::Handler);
                error!(tag = %incoming, %reason, "subscription handler failed");
            }
        }
        Ok(Some(incoming))
    }

    /// Whether the I/O thread is still receiving.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the I/O thread and wait for it. Messages still queued are
    /// discarded.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        if let Ok(result) = worker.join() {
            debug!("buffered subscriber stopped");
            result
        } else {
            error!("subscriber thread panicked");
            Err(TransportError::Closed.into())
        }
    }
}

impl Drop for BufferedHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl std::fmt::Debug for BufferedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedHandle")
            .field("tags", &self.handlers.keys().collect::<Vec<_>>())
            .field("running", &self.is_running())
            .finish()
    }
}
