//! Handler registry: per-scope fan-out of incoming envelopes.
//!
//! DESIGN
//! ======
//! Features register a [`HandlerSet`] under a string key. A set carries one
//! optional callback per message category; a set without a callback for a
//! category never sees envelopes of that category. Registering under an
//! existing key replaces the previous set in place.
//!
//! Dispatch iterates over a snapshot of the registered sets, so a handler may
//! add or remove registrations (including its own) while being invoked.

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;

use std::fmt;
use std::rc::Rc;

use envelopes::{ChannelUpdate, Content, Envelope, MemberUpdate, MessageKind, SketchCommand, SystemUserStatus, UserStatus};
use indexmap::IndexMap;

use super::scope::ConnectionScope;

type Typed<T> = Option<Rc<dyn Fn(&Envelope, &T)>>;

/// Optional callbacks, one per message category, plus a connection hook.
#[derive(Clone, Default)]
pub struct HandlerSet {
    chat: Option<Rc<dyn Fn(&Envelope, &str)>>,
    member_update: Typed<MemberUpdate>,
    user_status: Typed<UserStatus>,
    channel_update: Typed<ChannelUpdate>,
    system_user_status: Typed<SystemUserStatus>,
    sketch: Typed<SketchCommand>,
    connection: Option<Rc<dyn Fn(bool)>>,
}

impl HandlerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// TEXT and IMAGE envelopes; the second argument is the text or image URL.
    #[must_use]
    pub fn on_chat(mut self, f: impl Fn(&Envelope, &str) + 'static) -> Self {
        self.chat = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_member_update(mut self, f: impl Fn(&Envelope, &MemberUpdate) + 'static) -> Self {
        self.member_update = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_user_status(mut self, f: impl Fn(&Envelope, &UserStatus) + 'static) -> Self {
        self.user_status = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_channel_update(mut self, f: impl Fn(&Envelope, &ChannelUpdate) + 'static) -> Self {
        self.channel_update = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_system_user_status(mut self, f: impl Fn(&Envelope, &SystemUserStatus) + 'static) -> Self {
        self.system_user_status = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_sketch(mut self, f: impl Fn(&Envelope, &SketchCommand) + 'static) -> Self {
        self.sketch = Some(Rc::new(f));
        self
    }

    /// Called with `true` when the scope connects and `false` when a
    /// connected scope goes down.
    #[must_use]
    pub fn on_connection_change(mut self, f: impl Fn(bool) + 'static) -> Self {
        self.connection = Some(Rc::new(f));
        self
    }

    /// Whether this set has a callback for `kind`.
    #[must_use]
    pub fn accepts(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::Text | MessageKind::Image => self.chat.is_some(),
            MessageKind::MemberUpdate => self.member_update.is_some(),
            MessageKind::UserStatus => self.user_status.is_some(),
            MessageKind::ChannelUpdate => self.channel_update.is_some(),
            MessageKind::SystemUserStatus => self.system_user_status.is_some(),
            MessageKind::Sketch => self.sketch.is_some(),
        }
    }

    /// Invoke the matching callback. Returns whether one ran.
    pub fn dispatch(&self, envelope: &Envelope) -> bool {
        match &envelope.content {
            Content::Text(body) | Content::Image(body) => call(self.chat.as_ref(), |f| f(envelope, body.as_str())),
            Content::MemberUpdate(update) => call(self.member_update.as_ref(), |f| f(envelope, update)),
            Content::UserStatus(status) => call(self.user_status.as_ref(), |f| f(envelope, status)),
            Content::ChannelUpdate(update) => call(self.channel_update.as_ref(), |f| f(envelope, update)),
            Content::SystemUserStatus(status) => call(self.system_user_status.as_ref(), |f| f(envelope, status)),
            Content::Sketch(command) => call(self.sketch.as_ref(), |f| f(envelope, command)),
        }
    }

    /// Invoke the connection hook. Returns whether one ran.
    pub fn notify_connection(&self, connected: bool) -> bool {
        call(self.connection.as_ref(), |f| f(connected))
    }
}

fn call<F: ?Sized>(callback: Option<&Rc<F>>, invoke: impl FnOnce(&F)) -> bool {
    match callback {
        Some(f) => {
            invoke(f);
            true
        }
        None => false,
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = MessageKind::ALL.iter().filter(|k| self.accepts(**k)).map(|k| k.as_str()).collect();
        f.debug_struct("HandlerSet").field("kinds", &kinds).field("connection", &self.connection.is_some()).finish()
    }
}

/// Keyed handler sets for both scopes, in registration order.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    system: IndexMap<String, Rc<HandlerSet>>,
    channel: IndexMap<String, Rc<HandlerSet>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, scope: ConnectionScope) -> &IndexMap<String, Rc<HandlerSet>> {
        match scope {
            ConnectionScope::System => &self.system,
            ConnectionScope::Channel => &self.channel,
        }
    }

    fn scope_mut(&mut self, scope: ConnectionScope) -> &mut IndexMap<String, Rc<HandlerSet>> {
        match scope {
            ConnectionScope::System => &mut self.system,
            ConnectionScope::Channel => &mut self.channel,
        }
    }

    /// Register `set` under `key`. Returns `true` if it replaced an earlier set.
    pub fn add(&mut self, scope: ConnectionScope, key: impl Into<String>, set: HandlerSet) -> bool {
        self.scope_mut(scope).insert(key.into(), Rc::new(set)).is_some()
    }

    /// Returns `true` if a set was registered under `key`.
    pub fn remove(&mut self, scope: ConnectionScope, key: &str) -> bool {
        self.scope_mut(scope).shift_remove(key).is_some()
    }

    /// The sets registered for `scope` at this moment.
    #[must_use]
    pub fn snapshot(&self, scope: ConnectionScope) -> Vec<Rc<HandlerSet>> {
        self.scope(scope).values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self, scope: ConnectionScope) -> usize {
        self.scope(scope).len()
    }

    #[must_use]
    pub fn is_empty(&self, scope: ConnectionScope) -> bool {
        self.scope(scope).is_empty()
    }

    #[must_use]
    pub fn contains(&self, scope: ConnectionScope, key: &str) -> bool {
        self.scope(scope).contains_key(key)
    }
}
