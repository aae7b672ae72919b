//! System-scope feed: channel directory and global online count.

#[cfg(test)]
#[path = "system_test.rs"]
mod system_test;

use std::cell::RefCell;
use std::rc::Rc;

use envelopes::{ChannelAction, ChannelInfo, ChannelUpdate, SystemUserStatus};
use indexmap::IndexMap;
use tracing::info;

use crate::net::{ConnectionManager, ConnectionScope, HandlerSet};

pub const HANDLER_KEY: &str = "system-feed";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemState {
    /// Known channels keyed by name.
    pub channels: IndexMap<String, ChannelInfo>,
    /// Last reported global online count, if any arrived yet.
    pub online_users: Option<u32>,
    pub connected: bool,
}

impl SystemState {
    pub fn apply_channel_update(&mut self, update: &ChannelUpdate) {
        let name = update.channel.name.clone();
        match update.action {
            ChannelAction::Created => {
                info!(channel = %name, "channel created");
                self.channels.insert(name, update.channel.clone());
            }
            ChannelAction::Deleted => {
                info!(channel = %name, "channel deleted");
                self.channels.shift_remove(&name);
            }
        }
    }

    pub fn apply_user_count(&mut self, status: SystemUserStatus) {
        self.online_users = Some(status.count);
    }
}

/// Keeps a [`SystemState`] current from system-scope envelopes.
#[derive(Clone)]
pub struct SystemFeed {
    manager: ConnectionManager,
    state: Rc<RefCell<SystemState>>,
}

impl SystemFeed {
    #[must_use]
    pub fn new(manager: ConnectionManager) -> Self {
        let state = Rc::new(RefCell::new(SystemState::default()));
        let (updates, counts, status) = (Rc::downgrade(&state), Rc::downgrade(&state), Rc::downgrade(&state));
        let handlers = HandlerSet::new()
            .on_channel_update(move |_, update| {
                if let Some(state) = updates.upgrade() {
                    state.borrow_mut().apply_channel_update(update);
                }
            })
            .on_system_user_status(move |_, count| {
                if let Some(state) = counts.upgrade() {
                    state.borrow_mut().apply_user_count(*count);
                }
            })
            .on_connection_change(move |connected| {
                if let Some(state) = status.upgrade() {
                    state.borrow_mut().connected = connected;
                }
            });
        manager.add_handlers(ConnectionScope::System, HANDLER_KEY, handlers);
        Self { manager, state }
    }

    pub fn detach(&self) {
        self.manager.remove_handlers(ConnectionScope::System, HANDLER_KEY);
    }

    /// Seed the directory, e.g. from an HTTP listing.
    pub fn set_channels(&self, channels: impl IntoIterator<Item = ChannelInfo>) {
        self.state.borrow_mut().channels = channels.into_iter().map(|c| (c.name.clone(), c)).collect();
    }

    #[must_use]
    pub fn snapshot(&self) -> SystemState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.state.borrow().channels.keys().cloned().collect()
    }

    #[must_use]
    pub fn online_users(&self) -> Option<u32> {
        self.state.borrow().online_users
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }
}
