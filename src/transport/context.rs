//! Fork-aware transport context.
//!
//! A ZeroMQ context owns I/O threads and connection state that must not be
//! carried across `fork`. [`Context`] remembers the process that created it
//! and refuses to open sockets anywhere else; [`ContextFactory`] hands out
//! the current context and replaces it after a process-identity change.

use std::fmt;
use std::sync::Mutex;

use tracing::debug;

use super::error::TransportError;
use crate::protocol::{Error, Result};

/// Connection factory shared by every endpoint of one process.
#[derive(Clone)]
pub struct Context {
    inner: zmq::Context,
    pid: u32,
}

impl Context {
    /// Create a context owned by the current process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: zmq::Context::new(),
            pid: std::process::id(),
        }
    }

    /// Process that created this context.
    #[must_use]
    pub fn process_id(&self) -> u32 {
        self.pid
    }

    /// Whether the context was inherited across a fork.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.pid != std::process::id()
    }

    pub(crate) fn socket(&self, kind: zmq::SocketType) -> Result<zmq::Socket> {
        if self.is_stale() {
            return Err(Error::Config(format!(
                "transport context belongs to process {}, current process is {}",
                self.pid,
                std::process::id()
            )));
        }
        self.inner
            .socket(kind)
            .map_err(|e| Error::Transport(TransportError::Socket(e)))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("pid", &self.pid).finish()
    }
}

/// Hands out one [`Context`] per process, recreating it after a fork.
#[derive(Debug, Default)]
pub struct ContextFactory {
    current: Mutex<Option<Context>>,
}

impl ContextFactory {
    /// Create an empty factory; the first call to [`context`](Self::context)
    /// initializes the transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current context for this process.
    pub fn context(&self) -> Context {
        let mut guard = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ctx) = guard.as_ref().filter(|ctx| !ctx.is_stale()) {
            return ctx.clone();
        }
        if let Some(stale) = guard.take() {
            debug!(
                inherited_from = stale.process_id(),
                "replacing transport context after fork"
            );
            // Terminating an inherited context would block on the parent's I/O threads.
            std::mem::forget(stale);
        }
        let fresh = Context::new();
        *guard = Some(fresh.clone());
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_belongs_to_this_process() {
        let ctx = Context::new();
        assert_eq!(ctx.process_id(), std::process::id());
        assert!(!ctx.is_stale());
        assert!(ctx.socket(zmq::PUB).is_ok());
    }

    #[test]
    fn stale_context_refuses_sockets() {
        let mut ctx = Context::new();
        ctx.pid = ctx.pid.wrapping_add(1);
        assert!(ctx.is_stale());
        assert!(matches!(ctx.socket(zmq::SUB), Err(Error::Config(_))));
    }

    #[test]
    fn factory_reuses_context_within_a_process() {
        let factory = ContextFactory::new();
        let a = factory.context();
        let b = factory.context();
        assert_eq!(a.process_id(), b.process_id());
        assert!(a.socket(zmq::REQ).is_ok());
        assert!(b.socket(zmq::REP).is_ok());
    }

    #[test]
    fn factory_replaces_stale_context() {
        let factory = ContextFactory::new();
        {
            let mut guard = factory.current.lock().unwrap();
            let mut inherited = Context::new();
            inherited.pid = inherited.pid.wrapping_add(1);
            *guard = Some(inherited);
        }
        let ctx = factory.context();
        assert!(!ctx.is_stale());
    }
}
