//! Reference [`Channel`](crate::channel::Channel): JSON-RPC over streamable HTTP.
//!
//! POST carries client messages and returns the engine's replies as JSON.
//! GET opens a server-sent-event stream of messages the engine pushes on its
//! own. DELETE ends the session.

mod channel;
mod sse;

pub use channel::StreamableChannel;

use std::sync::Arc;

use crate::channel::{Channel, ChannelFactory};

/// Factory producing a [`StreamableChannel`] per session.
pub fn factory() -> ChannelFactory {
    Arc::new(|hooks| StreamableChannel::new(hooks) as Arc<dyn Channel>)
}
