//! Channel-scope feed: chat history, membership and presence.

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use envelopes::{Content, Envelope, MemberAction, MemberUpdate, Presence, UserStatus};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::net::{ConnectionManager, ConnectionScope, HandlerSet};

/// Handler key under which the feed registers on the channel scope.
pub const HANDLER_KEY: &str = "channel-feed";

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatBody {
    Text(String),
    /// URL of an uploaded image.
    Image(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub timestamp: i64,
    pub body: ChatBody,
}

impl ChatMessage {
    fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let body = match &envelope.content {
            Content::Text(text) => ChatBody::Text(text.clone()),
            Content::Image(url) => ChatBody::Image(url.clone()),
            _ => return None,
        };
        Some(Self { username: envelope.username.clone(), timestamp: envelope.timestamp, body })
    }
}

/// What the client knows about the joined channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub channel_name: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Username to admin flag, in the order members were first seen.
    pub members: IndexMap<String, bool>,
    pub online: IndexSet<String>,
    pub connected: bool,
}

impl ChannelState {
    #[must_use]
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self { channel_name: Some(channel_name.into()), ..Self::default() }
    }

    /// Fold one envelope into the state. Returns whether anything changed.
    ///
    /// Envelopes addressed to a different channel are ignored.
    pub fn apply(&mut self, envelope: &Envelope) -> bool {
        if self.channel_name.as_deref() != Some(envelope.channel_name.as_str()) {
            trace!(channel = %envelope.channel_name, "envelope for another channel ignored");
            return false;
        }
        match &envelope.content {
            Content::Text(_) | Content::Image(_) => {
                self.messages.extend(ChatMessage::from_envelope(envelope));
                true
            }
            Content::MemberUpdate(update) => match update.action {
                MemberAction::Added | MemberAction::RoleChanged => {
                    self.members.insert(update.username.clone(), update.is_admin) != Some(update.is_admin)
                }
            },
            Content::UserStatus(status) => match status.action {
                Presence::Online => self.online.insert(status.username.clone()),
                Presence::Offline => self.online.shift_remove(&status.username),
            },
            Content::ChannelUpdate(_) | Content::SystemUserStatus(_) | Content::Sketch(_) => false,
        }
    }

    /// Replace chat history with `history`, keeping live messages newer than
    /// its last entry.
    pub fn load_history(&mut self, history: &[Envelope]) {
        let loaded: Vec<ChatMessage> = history
            .iter()
            .filter(|e| self.channel_name.as_deref() == Some(e.channel_name.as_str()))
            .filter_map(ChatMessage::from_envelope)
            .collect();
        let horizon = loaded.last().map_or(i64::MIN, |m| m.timestamp);
        let live = std::mem::replace(&mut self.messages, loaded);
        self.messages.extend(live.into_iter().filter(|m| m.timestamp > horizon));
    }

    #[must_use]
    pub fn is_admin(&self, username: &str) -> bool {
        self.members.get(username).copied().unwrap_or(false)
    }
}

// =============================================================================
// FEED
// =============================================================================

/// Keeps a [`ChannelState`] current from channel-scope envelopes.
#[derive(Clone)]
pub struct ChannelFeed {
    manager: ConnectionManager,
    state: Rc<RefCell<ChannelState>>,
}

impl ChannelFeed {
    /// Create the feed and register it on the channel scope.
    #[must_use]
    pub fn new(manager: ConnectionManager) -> Self {
        let feed = Self { manager, state: Rc::new(RefCell::new(ChannelState::default())) };
        feed.attach();
        feed
    }

    fn attach(&self) {
        let handlers = HandlerSet::new()
            .on_chat(apply_with::<str>(&self.state))
            .on_member_update(apply_with::<MemberUpdate>(&self.state))
            .on_user_status(apply_with::<UserStatus>(&self.state))
            .on_connection_change({
                let weak = Rc::downgrade(&self.state);
                move |connected| {
                    if let Some(state) = weak.upgrade() {
                        state.borrow_mut().connected = connected;
                    }
                }
            });
        self.manager.add_handlers(ConnectionScope::Channel, HANDLER_KEY, handlers);
    }

    pub fn detach(&self) {
        self.manager.remove_handlers(ConnectionScope::Channel, HANDLER_KEY);
    }

    /// Start over for `channel_name`, or for no channel.
    pub fn reset(&self, channel_name: Option<&str>) {
        let connected = self.manager.is_connected(ConnectionScope::Channel)
            && self.manager.channel_name().as_deref() == channel_name;
        let mut state = self.state.borrow_mut();
        *state = ChannelState { channel_name: channel_name.map(str::to_owned), connected, ..ChannelState::default() };
        debug!(channel = ?channel_name, "channel feed reset");
    }

    pub fn load_history(&self, history: &[Envelope]) {
        self.state.borrow_mut().load_history(history);
    }

    #[must_use]
    pub fn snapshot(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn channel_name(&self) -> Option<String> {
        self.state.borrow().channel_name.clone()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.borrow().messages.clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }
}

fn apply_with<T: ?Sized + 'static>(state: &Rc<RefCell<ChannelState>>) -> impl Fn(&Envelope, &T) + 'static {
    let weak: Weak<RefCell<ChannelState>> = Rc::downgrade(state);
    move |envelope, _| {
        if let Some(state) = weak.upgrade() {
            state.borrow_mut().apply(envelope);
        }
    }
}
