//! Minimal ZeroMQ socket wrapper.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use super::config::Role;
use super::context::Context;
use super::error::{Direction, TransportError};
use crate::protocol::{Error, Result};

/// One owned ZeroMQ socket attached to an address.
pub struct SocketBinding {
    socket: zmq::Socket,
    kind: zmq::SocketType,
}

impl SocketBinding {
    /// Open a socket of `kind`. Linger is zero so closing never blocks on
    /// undelivered messages.
    pub(crate) fn open(ctx: &Context, kind: zmq::SocketType) -> Result<Self> {
        let socket = ctx.socket(kind)?;
        socket.set_linger(0).map_err(TransportError::from)?;
        Ok(Self { socket, kind })
    }

    /// Bind or connect to `address`; returns the role actually taken.
    ///
    /// A failed bind falls back to connecting, so two symmetric peers can
    /// share one configuration.
    pub(crate) fn attach(&self, address: &str, role: Role) -> Result<Role> {
        if role == Role::Bind {
            match self.socket.bind(address) {
                Ok(()) => return Ok(Role::Bind),
                Err(err) => {
                    tracing::warn!(address, error = %err, "bind failed; connecting instead");
                }
            }
        }
        self.socket
            .connect(address)
            .map_err(|source| TransportError::Address {
                address: address.to_owned(),
                source,
            })?;
        Ok(Role::Connect)
    }

    /// Set the send deadline in milliseconds.
    pub(crate) fn set_send_timeout(&self, millis: Option<i32>) -> Result<()> {
        self.socket
            .set_sndtimeo(millis.unwrap_or(-1))
            .map_err(|e| Error::Transport(e.into()))
    }

    /// Set the receive deadline in milliseconds.
    pub(crate) fn set_recv_timeout(&self, millis: Option<i32>) -> Result<()> {
        self.socket
            .set_rcvtimeo(millis.unwrap_or(-1))
            .map_err(|e| Error::Transport(e.into()))
    }

    /// Deliver only messages starting with `prefix` (SUB sockets).
    pub(crate) fn subscribe(&self, prefix: &[u8]) -> Result<()> {
        self.socket
            .set_subscribe(prefix)
            .map_err(|e| Error::Transport(e.into()))
    }

    /// Let a REQ socket send again after an unanswered request and drop
    /// replies that belong to an earlier request.
    pub(crate) fn relax_request_state(&self) -> Result<()> {
        self.socket
            .set_req_relaxed(true)
            .and_then(|()| self.socket.set_req_correlate(true))
            .map_err(|e| Error::Transport(e.into()))
    }

    /// Send one message.
    pub fn send(&self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        self.socket
            .send(bytes, 0)
            .map_err(|e| TransportError::from_zmq(e, Direction::Send))
    }

    /// Receive one message (blocking up to the receive deadline).
    pub fn recv(&self) -> std::result::Result<Bytes, TransportError> {
        self.socket
            .recv_bytes(0)
            .map(Bytes::from)
            .map_err(|e| TransportError::from_zmq(e, Direction::Receive))
    }

    /// Wait up to `timeout` for a message to become readable.
    pub fn poll_readable(&self, timeout: Duration) -> std::result::Result<bool, TransportError> {
        let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let mut items = [self.socket.as_poll_item(zmq::POLLIN)];
        zmq::poll(&mut items, millis).map_err(|e| TransportError::from_zmq(e, Direction::Receive))?;
        Ok(items[0].is_readable())
    }

    /// Resolved address of the last bind or connect.
    pub fn last_endpoint(&self) -> Option<String> {
        self.socket.get_last_endpoint().ok().and_then(|ep| ep.ok())
    }

    /// Socket kind.
    #[must_use]
    pub fn kind(&self) -> zmq::SocketType {
        self.kind
    }
}

impl fmt::Debug for SocketBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketBinding")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_connect_pair() {
        let ctx = Context::new();
        let rep = SocketBinding::open(&ctx, zmq::REP).unwrap();
        assert_eq!(rep.attach("inproc://socket-pair", Role::Bind).unwrap(), Role::Bind);
        let req = SocketBinding::open(&ctx, zmq::REQ).unwrap();
        assert_eq!(
            req.attach("inproc://socket-pair", Role::Connect).unwrap(),
            Role::Connect
        );

        req.send(b"ping").unwrap();
        assert_eq!(rep.recv().unwrap().as_ref(), b"ping");
        rep.send(b"pong").unwrap();
        assert_eq!(req.recv().unwrap().as_ref(), b"pong");
    }

    #[test]
    fn second_bind_falls_back_to_connect() {
        let ctx = Context::new();
        let first = SocketBinding::open(&ctx, zmq::PUB).unwrap();
        assert_eq!(first.attach("inproc://socket-taken", Role::Bind).unwrap(), Role::Bind);
        let second = SocketBinding::open(&ctx, zmq::SUB).unwrap();
        assert_eq!(
            second.attach("inproc://socket-taken", Role::Bind).unwrap(),
            Role::Connect
        );
    }

    #[test]
    fn receive_deadline_surfaces_as_timeout() {
        let ctx = Context::new();
        let rep = SocketBinding::open(&ctx, zmq::REP).unwrap();
        rep.attach("inproc://socket-idle", Role::Bind).unwrap();
        rep.set_recv_timeout(Some(20)).unwrap();
        assert!(matches!(
            rep.recv(),
            Err(TransportError::Timeout {
                direction: Direction::Receive
            })
        ));
    }

    #[test]
    fn poll_reports_idle_socket() {
        let ctx = Context::new();
        let sub = SocketBinding::open(&ctx, zmq::SUB).unwrap();
        sub.attach("inproc://socket-poll", Role::Bind).unwrap();
        assert!(!sub.poll_readable(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn ephemeral_tcp_port_is_reported() {
        let ctx = Context::new();
        let rep = SocketBinding::open(&ctx, zmq::REP).unwrap();
        rep.attach("tcp://127.0.0.1:*", Role::Bind).unwrap();
        let endpoint = rep.last_endpoint().unwrap();
        assert!(endpoint.starts_with("tcp://127.0.0.1:"));
        assert!(!endpoint.ends_with(":*"));
    }
}
