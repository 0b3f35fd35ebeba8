//! Endpoint configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{Authenticator, BincodeEncoder, Encoder, Error, Result};

/// Whether an endpoint binds its address or connects to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Listen on the address; peers connect to it.
    Bind,
    /// Connect to a peer listening on the address.
    Connect,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => f.write_str("bind"),
            Self::Connect => f.write_str("connect"),
        }
    }
}

/// Send and receive deadlines. `None` blocks indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for handing a message to the transport.
    pub send: Option<Duration>,
    /// Deadline for a message to arrive.
    pub recv: Option<Duration>,
}

impl Timeouts {
    /// Block indefinitely in both directions.
    pub const NONE: Self = Self {
        send: None,
        recv: None,
    };

    /// Create a `(send, recv)` timeout pair.
    #[must_use]
    pub const fn new(send: Option<Duration>, recv: Option<Duration>) -> Self {
        Self { send, recv }
    }

    pub(crate) fn send_millis(&self) -> Result<Option<i32>> {
        self.send.map(|d| to_millis("send", d)).transpose()
    }

    pub(crate) fn recv_millis(&self) -> Result<Option<i32>> {
        self.recv.map(|d| to_millis("receive", d)).transpose()
    }
}

fn to_millis(which: &str, timeout: Duration) -> Result<i32> {
    i32::try_from(timeout.as_millis()).map_err(|_| {
        Error::Config(format!(
            "{which} timeout of {timeout:?} exceeds the transport limit of {} ms",
            i32::MAX
        ))
    })
}

/// Everything needed to open an endpoint.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use zmqservice::{Authenticator, Context, EndpointConfig, MsgPackEncoder};
///
/// let ctx = Context::new();
/// let publisher = EndpointConfig::new("tcp://127.0.0.1:5554")
///     .encoder(MsgPackEncoder)
///     .authenticator(Authenticator::new("secret"))
///     .send_timeout(Duration::from_millis(500))
///     .publisher(&ctx)?;
/// # Ok::<(), zmqservice::Error>(())
/// ```
#[derive(Clone)]
pub struct EndpointConfig<E: Encoder = BincodeEncoder> {
    pub(crate) address: String,
    pub(crate) role: Option<Role>,
    pub(crate) encoder: Arc<E>,
    pub(crate) authenticator: Option<Arc<Authenticator>>,
    pub(crate) timeouts: Timeouts,
}

impl EndpointConfig<BincodeEncoder> {
    /// Start a configuration for `address` with the default encoder, no
    /// authentication, the pattern's default role, and no timeouts.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: None,
            encoder: Arc::new(BincodeEncoder),
            authenticator: None,
            timeouts: Timeouts::NONE,
        }
    }
}

impl<E: Encoder> EndpointConfig<E> {
    /// Use `encoder` for payloads.
    #[must_use]
    pub fn encoder<F: Encoder>(self, encoder: F) -> EndpointConfig<F> {
        self.shared_encoder(Arc::new(encoder))
    }

    /// Use an encoder instance shared with other endpoints.
    #[must_use]
    pub fn shared_encoder<F: Encoder>(self, encoder: Arc<F>) -> EndpointConfig<F> {
        EndpointConfig {
            address: self.address,
            role: self.role,
            encoder,
            authenticator: self.authenticator,
            timeouts: self.timeouts,
        }
    }

    /// Sign outgoing and verify incoming messages.
    #[must_use]
    pub fn authenticator(mut self, authenticator: impl Into<Arc<Authenticator>>) -> Self {
        self.authenticator = Some(authenticator.into());
        self
    }

    /// Override the pattern's default role.
    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Shorthand for `role(Role::Bind)`.
    #[must_use]
    pub fn bind(self) -> Self {
        self.role(Role::Bind)
    }

    /// Shorthand for `role(Role::Connect)`.
    #[must_use]
    pub fn connect(self) -> Self {
        self.role(Role::Connect)
    }

    /// Set both timeouts.
    #[must_use]
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Fail sends that cannot complete within `timeout`.
    #[must_use]
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send = Some(timeout);
        self
    }

    /// Fail receives that see no message within `timeout`.
    #[must_use]
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.recv = Some(timeout);
        self
    }

    /// Address this configuration points at.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check the configuration against the role it will be opened with.
    pub(crate) fn validate(&self, role: Role) -> Result<()> {
        let Some((scheme, rest)) = self.address.split_once("://") else {
            return Err(Error::Config(format!(
                "address {:?} is missing a transport scheme",
                self.address
            )));
        };
        if scheme.is_empty() || rest.is_empty() {
            return Err(Error::Config(format!(
                "address {:?} is incomplete",
                self.address
            )));
        }
        if role == Role::Connect && scheme == "tcp" && has_wildcard(rest) {
            return Err(Error::Config(format!(
                "cannot connect to wildcard address {:?}",
                self.address
            )));
        }
        self.timeouts.send_millis()?;
        self.timeouts.recv_millis()?;
        Ok(())
    }
}

fn has_wildcard(host_port: &str) -> bool {
    let (host, port) = host_port.rsplit_once(':').unwrap_or((host_port, ""));
    host == "*" || port == "*"
}

impl<E: Encoder> fmt::Debug for EndpointConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("address", &self.address)
            .field("role", &self.role)
            .field("authenticated", &self.authenticator.is_some())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
