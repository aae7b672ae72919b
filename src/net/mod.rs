//! Networking: websocket transport, connection manager and HTTP collaborators.
//!
//! SYSTEM CONTEXT
//! ==============
//! `socket` wraps one physical connection, `manager` owns the two scoped
//! sockets plus reconnect policy, `registry` fans incoming envelopes out to
//! feature handlers, `ws` is the tokio-tungstenite connector and `api` the
//! HTTP client for persistence and membership calls.

pub mod api;
pub mod manager;
pub mod registry;
pub mod scope;
pub mod socket;
pub mod ws;

#[cfg(test)]
#[path = "mock_test.rs"]
pub(crate) mod mock;

pub use manager::ConnectionManager;
pub use registry::{HandlerRegistry, HandlerSet};
pub use scope::{ConnectionScope, ConnectionState, Credentials, ScopeTarget};
pub use socket::{ABNORMAL_CLOSURE, Connector, EventSink, Link, NORMAL_CLOSURE, OpenRequest, SocketEvent};
