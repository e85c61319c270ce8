//! # switchyard-gateway
//!
//! One HTTP listener, many independent JSON-RPC sessions.
//!
//! Each client session gets its own [`Engine`](switchyard_core::Engine)
//! instance behind a [`Channel`]. The [`Dispatcher`] picks the channel for an
//! exchange from the `mcp-session-id` header and the HTTP verb; channels
//! report establishment and closure back to the [`SessionRegistry`] through
//! one-shot [`SessionHooks`].

pub mod body;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod streamable;

#[cfg(test)]
mod testutil;

pub use channel::{Channel, ChannelFactory, ChannelRequest, SESSION_HEADER};
pub use config::{ConfigError, ServerConfig};
pub use dispatcher::Dispatcher;
pub use error::{ChannelError, GatewayError};
pub use hooks::{ClosedSignal, EstablishedSignal, SessionHooks};
pub use registry::{SessionEntry, SessionRegistry};
pub use server::Gateway;
pub use streamable::StreamableChannel;
