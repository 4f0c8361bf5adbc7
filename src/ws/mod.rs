//! Session-scoped realtime channel.
//!
//! One `SessionConnection` per active session. Inbound JSON frames are parsed
//! into `ServerEvent` and handed to the handlers registered for their
//! `EventKind`, in the order the transport delivered them.

mod connection;
mod message;

pub use connection::{Handler, SessionConnection};
pub use message::{channel_url, ChannelRole, ClientMessage, EventKind, ServerEvent, StudentUpdate};
