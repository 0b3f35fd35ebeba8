//! ZeroMQ transport binding: context, sockets, and the endpoint pipeline.

mod config;
mod context;
mod endpoint;
mod error;
mod socket;

pub use config::{EndpointConfig, Role, Timeouts};
pub use context::{Context, ContextFactory};
pub use endpoint::Endpoint;
pub use error::{Direction, TransportError};
pub use socket::SocketBinding;
