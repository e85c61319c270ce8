//! # switchyard-core
//!
//! Shared vocabulary for the gateway: session ids, JSON-RPC wire types and the
//! [`Engine`](engine::Engine) contract that protocol implementations satisfy.

pub mod engine;
pub mod errors;
pub mod ids;
pub mod jsonrpc;

pub use engine::{session_factory, Engine, Peer, PeerLink, SessionFactory};
pub use errors::PeerError;
pub use ids::SessionId;
