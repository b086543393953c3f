//! Browser Tool Bridge - WebSocket Transport
//!
//! Connects a long-lived tool-serving process to a browser extension over
//! an intermittently-connected WebSocket.
//!
//! # Architecture
//!
//! The two sides are deliberately asymmetric:
//!
//! 1. The server ([`server::RequestBridge`]) is single-peer: one browser,
//!    one debugging session, one pending-request table keyed by
//!    correlation ID.
//! 2. The client side ([`client::ClientManager`]) is multi-server: it
//!    holds one socket per port in the allocator's range, because it
//!    cannot know in advance which port the server's allocation race
//!    produced.
//!
//! Do not generalize the server to multi-peer without re-deriving the
//! pending-table semantics - a correlation ID alone would be ambiguous
//! across peers.

pub mod client;
pub mod port;
pub mod protocol;
pub mod server;

pub use client::{ClientManager, HandlerError, ReconnectingClient, RequestHandler, StatusSource};
pub use port::{bind_first_free, PortError};
pub use protocol::{Action, Envelope, ErrorInfo, ResponseEnvelope, StatusEnvelope, TabInfo};
pub use server::{BridgeConfig, BridgeError, RequestBridge};
