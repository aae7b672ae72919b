//! Dual-scope connection manager.
//!
//! DESIGN
//! ======
//! One manager per session owns at most one socket per [`ConnectionScope`].
//! The system socket lives for the whole session; the channel socket is
//! rebound whenever the user switches channels. Each scope has its own
//! connection lock, reconnect counter and handler registry, so a stalled
//! channel handshake never blocks the system scope.
//!
//! STATE MACHINE
//! =============
//! `Disconnected -> Connecting -> Connected`, and on an abnormal close
//! `Connected -> Reconnecting(n) -> Connected | Disconnected`.
//!
//! - A close with code 1000 ends the scope without retry.
//! - A close within `fast_failure` of the attempt starting is a rejection
//!   (bad token, unknown channel) and is never retried.
//! - Otherwise up to `max_attempts` reconnects are scheduled with delays
//!   `min(base * 2^n, cap)`; after that the scope gives up and the counter
//!   resets.
//!
//! Every socket carries an id and its events are routed through a weak
//! handle, so events from a superseded socket are dropped and a dropped
//! manager never receives callbacks.

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use envelopes::{Envelope, MessageKind};
use tracing::{debug, error, info, trace, warn};

use super::registry::{HandlerRegistry, HandlerSet};
use super::scope::{ConnectionScope, ConnectionState, Credentials, ScopeTarget};
use super::socket::{Connector, EventSink, Lifecycle, NORMAL_CLOSURE, SocketEvent, SocketId, TransportSocket};
use crate::config::{BackoffPolicy, SyncConfig};
use crate::timers::{TimerHandle, Timers};

#[derive(Default)]
struct ScopeSlot {
    state: ConnectionState,
    credentials: Option<Credentials>,
    socket: Option<TransportSocket>,
    /// Held from socket creation until it opens or closes.
    locked: bool,
    attempts: u32,
    attempt_started: Option<Instant>,
    reconnect_timer: Option<TimerHandle>,
}

struct Shared {
    ws_url: String,
    backoff: BackoffPolicy,
    connector: Rc<dyn Connector>,
    timers: Rc<dyn Timers>,
    next_socket: Cell<u64>,
    system: RefCell<ScopeSlot>,
    channel: RefCell<ScopeSlot>,
    registry: RefCell<HandlerRegistry>,
}

impl Shared {
    fn slot(&self, scope: ConnectionScope) -> &RefCell<ScopeSlot> {
        match scope {
            ConnectionScope::System => &self.system,
            ConnectionScope::Channel => &self.channel,
        }
    }
}

enum CloseOutcome {
    Stop,
    Retry(Duration),
}

/// Cheap-to-clone handle to the session's connections.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Rc<Shared>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: &SyncConfig, connector: Rc<dyn Connector>, timers: Rc<dyn Timers>) -> Self {
        Self {
            shared: Rc::new(Shared {
                ws_url: config.ws_url.clone(),
                backoff: config.backoff,
                connector,
                timers,
                next_socket: Cell::new(0),
                system: RefCell::new(ScopeSlot::default()),
                channel: RefCell::new(ScopeSlot::default()),
                registry: RefCell::new(HandlerRegistry::new()),
            }),
        }
    }

    fn from_weak(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    pub fn connect_system(&self, token: &str) {
        self.connect(Credentials::system(token));
    }

    pub fn connect_channel(&self, token: &str, channel: &str) {
        self.connect(Credentials::channel(token, channel));
    }

    /// Connect the scope selected by `credentials`.
    ///
    /// Repeating the active credentials while connected or mid-handshake is
    /// a no-op. Different credentials close the current socket normally and
    /// open a new one; any pending reconnect is cancelled.
    pub fn connect(&self, credentials: Credentials) {
        let scope = credentials.scope();
        let (previous, timer, was_connected) = {
            let mut slot = self.shared.slot(scope).borrow_mut();
            if slot.credentials.as_ref() == Some(&credentials) && (slot.state.is_connected() || slot.locked) {
                debug!(%scope, state = ?slot.state, "connect ignored; credentials already active");
                return;
            }
            let was_connected = slot.state.is_connected();
            slot.credentials = Some(credentials);
            slot.attempts = 0;
            slot.locked = false;
            (slot.socket.take(), slot.reconnect_timer.take(), was_connected)
        };

        if let Some(timer) = timer {
            self.shared.timers.clear_timeout(timer);
        }
        if let Some(mut socket) = previous {
            debug!(%scope, socket = %socket.id(), "closing superseded socket");
            socket.close();
        }
        self.open_socket(scope);
        if was_connected {
            self.notify_status(scope, false);
        }
    }

    /// Close `scope` normally and forget its credentials.
    pub fn disconnect(&self, scope: ConnectionScope) {
        let (socket, timer, was_connected) = {
            let mut slot = self.shared.slot(scope).borrow_mut();
            let was_connected = slot.state.is_connected();
            slot.credentials = None;
            slot.locked = false;
            slot.attempts = 0;
            slot.attempt_started = None;
            slot.state = ConnectionState::Disconnected;
            (slot.socket.take(), slot.reconnect_timer.take(), was_connected)
        };

        if let Some(timer) = timer {
            self.shared.timers.clear_timeout(timer);
        }
        if let Some(mut socket) = socket {
            socket.close();
            info!(%scope, "disconnected");
        }
        if was_connected {
            self.notify_status(scope, false);
        }
    }

    pub fn disconnect_all(&self) {
        for scope in ConnectionScope::ALL {
            self.disconnect(scope);
        }
    }

    /// Send on the channel socket. Returns whether the frame was handed to
    /// the transport.
    ///
    /// `CHANNEL_UPDATE` is server-originated and always refused.
    pub fn send(&self, envelope: &Envelope) -> bool {
        if envelope.kind() == MessageKind::ChannelUpdate {
            error!(channel = %envelope.channel_name, "refusing to send CHANNEL_UPDATE from the client");
            return false;
        }
        let slot = self.shared.channel.borrow();
        match slot.socket.as_ref() {
            Some(socket) if socket.is_open() => socket.send(envelope),
            _ => {
                error!(kind = %envelope.kind(), state = ?slot.state, "channel socket not connected; dropping send");
                false
            }
        }
    }

    #[must_use]
    pub fn state(&self, scope: ConnectionScope) -> ConnectionState {
        self.shared.slot(scope).borrow().state
    }

    #[must_use]
    pub fn is_connected(&self, scope: ConnectionScope) -> bool {
        self.state(scope).is_connected()
    }

    /// Channel the channel scope is bound to, if any.
    #[must_use]
    pub fn channel_name(&self) -> Option<String> {
        self.shared.channel.borrow().credentials.as_ref().and_then(|c| match &c.target {
            ScopeTarget::Channel(name) => Some(name.clone()),
            ScopeTarget::System => None,
        })
    }

    /// Register `handlers` for `scope` under `key`, replacing any set with
    /// the same key.
    pub fn add_handlers(&self, scope: ConnectionScope, key: &str, handlers: HandlerSet) {
        if self.shared.registry.borrow_mut().add(scope, key, handlers) {
            debug!(%scope, key, "replaced handler set");
        }
    }

    /// Returns whether a set was registered under `key`.
    pub fn remove_handlers(&self, scope: ConnectionScope, key: &str) -> bool {
        self.shared.registry.borrow_mut().remove(scope, key)
    }

    #[must_use]
    pub fn handler_count(&self, scope: ConnectionScope) -> usize {
        self.shared.registry.borrow().len(scope)
    }

    fn open_socket(&self, scope: ConnectionScope) {
        let credentials = {
            let mut slot = self.shared.slot(scope).borrow_mut();
            if slot.locked {
                debug!(%scope, "connection attempt already in flight");
                return;
            }
            let Some(credentials) = slot.credentials.clone() else {
                return;
            };
            slot.locked = true;
            slot.attempt_started = Some(self.shared.timers.now());
            if slot.attempts == 0 {
                slot.state = ConnectionState::Connecting;
            }
            credentials
        };

        let id = SocketId(self.shared.next_socket.get());
        self.shared.next_socket.set(id.0 + 1);
        let socket = TransportSocket::connect(
            self.shared.connector.as_ref(),
            id,
            &self.shared.ws_url,
            &credentials,
            self.event_sink(scope, id),
        );
        self.shared.slot(scope).borrow_mut().socket = Some(socket);
    }

    fn event_sink(&self, scope: ConnectionScope, id: SocketId) -> EventSink {
        let weak = Rc::downgrade(&self.shared);
        Rc::new(move |event| {
            if let Some(manager) = Self::from_weak(&weak) {
                manager.on_socket_event(scope, id, event);
            }
        })
    }

    fn on_socket_event(&self, scope: ConnectionScope, id: SocketId, event: SocketEvent) {
        let lifecycle = {
            let mut slot = self.shared.slot(scope).borrow_mut();
            match slot.socket.as_mut() {
                Some(socket) if socket.id() == id => socket.accept(event),
                _ => {
                    trace!(%scope, socket = %id, "event from retired socket ignored");
                    return;
                }
            }
        };

        match lifecycle {
            Some(Lifecycle::Opened) => self.handle_open(scope),
            Some(Lifecycle::Received(envelope)) => self.dispatch(scope, &envelope),
            Some(Lifecycle::Closed { code }) => self.handle_close(scope, code),
            None => {}
        }
    }

    fn handle_open(&self, scope: ConnectionScope) {
        {
            let mut slot = self.shared.slot(scope).borrow_mut();
            slot.state = ConnectionState::Connected;
            slot.attempts = 0;
            slot.locked = false;
        }
        info!(%scope, "connected");
        self.notify_status(scope, true);
    }

    fn handle_close(&self, scope: ConnectionScope, code: u16) {
        let now = self.shared.timers.now();
        let backoff = self.shared.backoff;
        let (outcome, was_connected) = {
            let mut slot = self.shared.slot(scope).borrow_mut();
            let was_connected = slot.state.is_connected();
            slot.socket = None;
            slot.locked = false;
            let elapsed = slot.attempt_started.map_or(Duration::MAX, |started| now.saturating_duration_since(started));

            let outcome = if code == NORMAL_CLOSURE {
                info!(%scope, "closed normally");
                CloseOutcome::Stop
            } else if elapsed < backoff.fast_failure {
                warn!(
                    %scope,
                    code,
                    elapsed_ms = elapsed.as_millis(),
                    "connection rejected immediately; not retrying (invalid token or channel?)"
                );
                CloseOutcome::Stop
            } else if slot.attempts < backoff.max_attempts {
                let delay = backoff.delay_for(slot.attempts);
                slot.attempts += 1;
                slot.state = ConnectionState::Reconnecting(slot.attempts);
                info!(%scope, code, attempt = slot.attempts, delay_ms = delay.as_millis(), "scheduling reconnect");
                CloseOutcome::Retry(delay)
            } else {
                warn!(%scope, code, attempts = slot.attempts, "giving up reconnecting");
                CloseOutcome::Stop
            };

            if matches!(outcome, CloseOutcome::Stop) {
                slot.attempts = 0;
                slot.state = ConnectionState::Disconnected;
            }
            (outcome, was_connected)
        };

        if let CloseOutcome::Retry(delay) = outcome {
            let weak = Rc::downgrade(&self.shared);
            let timer = self.shared.timers.set_timeout(
                delay,
                Box::new(move || {
                    if let Some(manager) = Self::from_weak(&weak) {
                        manager.reconnect(scope);
                    }
                }),
            );
            self.shared.slot(scope).borrow_mut().reconnect_timer = Some(timer);
        }
        if was_connected {
            self.notify_status(scope, false);
        }
    }

    fn reconnect(&self, scope: ConnectionScope) {
        let attempt = {
            let mut slot = self.shared.slot(scope).borrow_mut();
            slot.reconnect_timer = None;
            if slot.credentials.is_none() {
                return;
            }
            slot.attempts
        };
        debug!(%scope, attempt, "reconnecting");
        self.open_socket(scope);
    }

    fn dispatch(&self, scope: ConnectionScope, envelope: &Envelope) {
        let handlers = self.shared.registry.borrow().snapshot(scope);
        let delivered = handlers.iter().filter(|set| set.dispatch(envelope)).count();
        if delivered == 0 {
            debug!(%scope, kind = %envelope.kind(), "no handler for envelope");
        }
    }

    fn notify_status(&self, scope: ConnectionScope, connected: bool) {
        let handlers = self.shared.registry.borrow().snapshot(scope);
        for set in &handlers {
            set.notify_connection(connected);
        }
    }
}
