//! One physical duplex connection for one scope.
//!
//! A [`Connector`] opens the raw link and reports lifecycle through an
//! [`EventSink`] callback; [`TransportSocket`] sits on top of it and turns the
//! raw event stream into exactly one open, any number of validated envelopes
//! and exactly one close.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error to the caller. A refused handshake arrives
//! as a close event, a malformed payload is logged and dropped, and a send on
//! a socket that is not open is logged and reported as `false`.

#[cfg(test)]
#[path = "socket_test.rs"]
mod socket_test;

use std::fmt;
use std::rc::Rc;

use envelopes::{Envelope, decode_envelope, encode_envelope};
use tracing::{debug, error, trace, warn};

use super::scope::{ConnectionScope, Credentials};

/// Close code for a deliberate, clean shutdown. Never triggers a reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the connection dropped or never opened.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when the peer closed without a status.
pub const NO_STATUS_CLOSURE: u16 = 1005;

/// Raw lifecycle events reported by a connector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Error(String),
    Close { code: u16 },
}

/// Callback through which a connector reports events for one socket.
pub type EventSink = Rc<dyn Fn(SocketEvent)>;

/// Where to connect and which token to present at handshake.
#[derive(Clone)]
pub struct OpenRequest {
    pub url: String,
    /// Sent as the `Sec-WebSocket-Protocol` header, never in the URL.
    pub token: String,
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequest").field("url", &self.url).field("token", &"<redacted>").finish()
    }
}

/// Outgoing half of an opened physical connection.
pub trait Link {
    /// Queue a text frame. Returns `false` if the link is gone.
    fn send_text(&self, text: String) -> bool;
    /// Close with the given code.
    fn close(&self, code: u16);
}

/// Opens physical connections.
///
/// Events for the returned link must be delivered after `open` returns,
/// never from inside it.
pub trait Connector {
    fn open(&self, request: OpenRequest, events: EventSink) -> Box<dyn Link>;
}

/// Identity of one physical connection; retired sockets keep their id so
/// late events can be recognised and ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub(crate) u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketPhase {
    Connecting,
    Open,
    Closed,
}

/// Filtered lifecycle signal handed to the connection manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Opened,
    Received(Envelope),
    Closed { code: u16 },
}

/// A scoped socket: one link plus the phase filter and envelope codec.
pub struct TransportSocket {
    id: SocketId,
    scope: ConnectionScope,
    phase: SocketPhase,
    link: Box<dyn Link>,
}

impl TransportSocket {
    /// Open the scope endpoint below `base_url` for `credentials`.
    pub fn connect(
        connector: &dyn Connector,
        id: SocketId,
        base_url: &str,
        credentials: &Credentials,
        events: EventSink,
    ) -> Self {
        let scope = credentials.scope();
        let url = format!("{}{}", base_url.trim_end_matches('/'), credentials.target.path());
        debug!(%scope, socket = %id, %url, "opening socket");
        let link = connector.open(OpenRequest { url, token: credentials.token.clone() }, events);
        Self { id, scope, phase: SocketPhase::Connecting, link }
    }

    #[must_use]
    pub fn id(&self) -> SocketId {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> SocketPhase {
        self.phase
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase == SocketPhase::Open
    }

    /// Encode and transmit. Returns whether the frame was handed to the link.
    pub fn send(&self, envelope: &Envelope) -> bool {
        if !self.is_open() {
            error!(scope = %self.scope, socket = %self.id, kind = %envelope.kind(), "socket not open; dropping send");
            return false;
        }
        let text = match encode_envelope(envelope) {
            Ok(text) => text,
            Err(e) => {
                error!(scope = %self.scope, error = %e, "failed to encode envelope");
                return false;
            }
        };
        if self.link.send_text(text) {
            true
        } else {
            error!(scope = %self.scope, socket = %self.id, "link refused frame");
            false
        }
    }

    /// Close with [`NORMAL_CLOSURE`]. Idempotent.
    pub fn close(&mut self) {
        if self.phase != SocketPhase::Closed {
            self.link.close(NORMAL_CLOSURE);
            self.phase = SocketPhase::Closed;
        }
    }

    /// Fold one raw event into the socket phase.
    ///
    /// Returns the lifecycle signal the manager must act on, if any. Opens
    /// after the first, messages outside the open phase and anything after
    /// close are swallowed.
    pub fn accept(&mut self, event: SocketEvent) -> Option<Lifecycle> {
        match (self.phase, event) {
            (SocketPhase::Connecting, SocketEvent::Open) => {
                self.phase = SocketPhase::Open;
                Some(Lifecycle::Opened)
            }
            (SocketPhase::Open, SocketEvent::Message(text)) => match decode_envelope(&text) {
                Ok(envelope) => Some(Lifecycle::Received(envelope)),
                Err(e) => {
                    error!(scope = %self.scope, socket = %self.id, error = %e, "dropping invalid payload");
                    None
                }
            },
            (SocketPhase::Connecting | SocketPhase::Open, SocketEvent::Close { code }) => {
                self.phase = SocketPhase::Closed;
                Some(Lifecycle::Closed { code })
            }
            (_, SocketEvent::Error(message)) => {
                warn!(scope = %self.scope, socket = %self.id, %message, "socket error");
                None
            }
            (phase, event) => {
                trace!(scope = %self.scope, socket = %self.id, ?phase, ?event, "ignoring out-of-phase event");
                None
            }
        }
    }
}
