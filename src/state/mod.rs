//! Client-side feeds kept current from the two socket scopes.
//!
//! DESIGN
//! ======
//! Each feed owns a plain state struct behind `Rc<RefCell<_>>` and registers
//! its own [`HandlerSet`](crate::net::HandlerSet) with the connection
//! manager. Feeds never talk to each other; the sketch protocol is a sibling
//! registration on the channel scope.

pub mod channel;
pub mod system;

pub use channel::{ChannelFeed, ChannelState, ChatBody, ChatMessage};
pub use system::{SystemFeed, SystemState};
