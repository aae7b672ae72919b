//! Connection scopes, per-scope state and the credentials that select a socket.

use std::fmt;

/// A connection lifecycle domain with its own socket and handler registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionScope {
    /// Global, per-session socket (channel lifecycle, online counts).
    System,
    /// Socket bound to the joined channel; rebound on channel switch.
    Channel,
}

impl ConnectionScope {
    pub const ALL: [Self; 2] = [Self::System, Self::Channel];
}

impl fmt::Display for ConnectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Channel => f.write_str("channel"),
        }
    }
}

/// Lifecycle state of one scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for, or running, reconnect attempt `n` (1-based).
    Reconnecting(u32),
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// What a scope connects to. Channel scope carries the channel name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeTarget {
    System,
    Channel(String),
}

impl ScopeTarget {
    #[must_use]
    pub fn scope(&self) -> ConnectionScope {
        match self {
            Self::System => ConnectionScope::System,
            Self::Channel(_) => ConnectionScope::Channel,
        }
    }

    /// Endpoint path below the websocket base URL.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::System => "/ws/system".to_owned(),
            Self::Channel(name) => format!("/ws/{name}"),
        }
    }
}

/// Token plus target. Two connects with equal credentials are the same connect.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub target: ScopeTarget,
}

impl Credentials {
    #[must_use]
    pub fn system(token: impl Into<String>) -> Self {
        Self { token: token.into(), target: ScopeTarget::System }
    }

    #[must_use]
    pub fn channel(token: impl Into<String>, channel: impl Into<String>) -> Self {
        Self { token: token.into(), target: ScopeTarget::Channel(channel.into()) }
    }

    #[must_use]
    pub fn scope(&self) -> ConnectionScope {
        self.target.scope()
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("token", &"<redacted>").field("target", &self.target).finish()
    }
}
