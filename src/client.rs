//! Application context for one signed-in user.
//!
//! DESIGN
//! ======
//! `SyncClient` is the explicit replacement for a process-wide connection
//! singleton: it constructs one [`ConnectionManager`] and hands clones of it
//! to every feature (system feed, channel feed, sketch protocol). Dropping
//! every clone of the client drops the manager; `shutdown` closes sockets
//! and unregisters handlers first.

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

use std::fmt;
use std::rc::Rc;

use envelopes::{Content, Envelope};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::net::{ConnectionManager, ConnectionScope, Connector};
use crate::sketch::{SketchSync, Surface};
use crate::state::{ChannelFeed, SystemFeed};
use crate::timers::Timers;

/// Who is connected, and with what token.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
}

impl Session {
    #[must_use]
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self { token: token.into(), username: username.into() }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("username", &self.username).field("token", &"<redacted>").finish()
    }
}

/// Manager, feeds and sketch protocol wired for one session.
#[derive(Clone)]
pub struct SyncClient {
    session: Rc<Session>,
    manager: ConnectionManager,
    system: SystemFeed,
    channel: ChannelFeed,
    sketch: SketchSync,
}

impl SyncClient {
    #[must_use]
    pub fn new(
        config: &SyncConfig,
        session: Session,
        connector: Rc<dyn Connector>,
        timers: Rc<dyn Timers>,
        surface: Box<dyn Surface>,
    ) -> Self {
        let manager = ConnectionManager::new(config, connector, Rc::clone(&timers));
        let system = SystemFeed::new(manager.clone());
        let channel = ChannelFeed::new(manager.clone());
        let sketch = SketchSync::new(manager.clone(), timers, &session.username, config.throttle_window, surface);
        Self { session: Rc::new(session), manager, system, channel, sketch }
    }

    /// Open the system socket.
    pub fn start(&self) {
        info!(user = %self.session.username, "starting session");
        self.manager.connect_system(&self.session.token);
    }

    /// Rebind every channel feature to `channel_name` and open its socket.
    pub fn join_channel(&self, channel_name: &str) {
        info!(channel = channel_name, "joining channel");
        self.channel.reset(Some(channel_name));
        self.sketch.bind_channel(channel_name);
        self.manager.connect_channel(&self.session.token, channel_name);
    }

    pub fn leave_channel(&self) {
        self.manager.disconnect(ConnectionScope::Channel);
        self.channel.reset(None);
        self.sketch.unbind();
    }

    /// Send a `TEXT` message to the joined channel.
    pub fn send_chat(&self, body: &str) -> bool {
        self.send_content(Content::Text(body.to_owned()))
    }

    /// Send an `IMAGE` message carrying an uploaded image URL.
    pub fn send_image(&self, url: &str) -> bool {
        self.send_content(Content::Image(url.to_owned()))
    }

    fn send_content(&self, content: Content) -> bool {
        let Some(channel) = self.manager.channel_name() else {
            warn!(kind = %content.kind(), "no channel joined; message not sent");
            return false;
        };
        self.manager.send(&Envelope::new(channel, self.session.username.as_str(), content))
    }

    /// Close both sockets and unregister every feature.
    pub fn shutdown(&self) {
        self.sketch.teardown();
        self.channel.detach();
        self.system.detach();
        self.manager.disconnect_all();
        info!(user = %self.session.username, "session closed");
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    #[must_use]
    pub fn system(&self) -> &SystemFeed {
        &self.system
    }

    #[must_use]
    pub fn channel(&self) -> &ChannelFeed {
        &self.channel
    }

    #[must_use]
    pub fn sketch(&self) -> &SketchSync {
        &self.sketch
    }
}
