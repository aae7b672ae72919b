//! Real-time sync engine for a collaborative chat and sketching client.
//!
//! The crate owns everything between the user's pointer and the wire: two
//! scoped WebSocket connections with reconnection, a handler registry that
//! fans validated envelopes out to features, and the sketch protocol that
//! turns strokes into throttled region updates and replays peers' regions.
//! Rendering is delegated to a [`sketch::Surface`]; the HTTP API is reached
//! through [`net::api::ApiClient`].
//!
//! Everything runs on one thread. Handles are `Rc`-based and callbacks are
//! driven by a [`timers::Timers`] implementation, which is a tokio `LocalSet`
//! in production and a hand-advanced wheel in tests.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`client`] | Per-session wiring of manager, feeds and sketch protocol |
//! | [`config`] | Environment-driven settings and reconnect backoff policy |
//! | [`net`] | Transport socket, connection manager, handler registry, HTTP client |
//! | [`sketch`] | Local sketch state, region derivation, throttling, sync protocol |
//! | [`state`] | Chat, membership and channel-directory feeds |
//! | [`timers`] | Timer capability with tokio and manual implementations |
//!
//! Wire types live in the `envelopes` crate and are re-exported here.

pub mod client;
pub mod config;
pub mod net;
pub mod sketch;
pub mod state;
pub mod timers;

pub use client::{Session, SyncClient};
pub use config::{BackoffPolicy, ConfigError, SyncConfig};
pub use envelopes;
