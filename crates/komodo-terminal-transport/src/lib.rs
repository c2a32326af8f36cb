//! Authenticated duplex channels for Komodo terminals.
//!
//! Provides:
//! - Channel protocol (login acknowledgment, frames, events, state machine)
//! - WebSocket channel, sender handle and connector

pub mod protocol;
pub mod websocket;

pub use protocol::{
    ChannelEvent, ChannelState, CloseReason, ConnectionState, Frame, LOGGED_IN,
};
pub use websocket::{
    ChannelError, ChannelHandler, DuplexChannel, DuplexConnector, DuplexSender,
};
