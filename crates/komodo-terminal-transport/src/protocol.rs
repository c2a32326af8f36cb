//! Duplex channel protocol: frames, events and the login state machine.

use bytes::Bytes;
use tokio_tungstenite::tungstenite::{Message, protocol::CloseFrame};

use crate::websocket::ChannelError;

/// Text frame acknowledging the login frame.
pub const LOGGED_IN: &str = "LOGGED_IN";

/// Payload frame exchanged with the remote terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Opaque binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::text(text),
            Frame::Binary(data) => Self::binary(data),
        }
    }
}

/// Close code and reason sent by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Websocket close code, e.g. `1000` for a normal close.
    pub code: u16,
    /// Free-form reason text, possibly empty.
    pub reason: String,
}

impl From<CloseFrame> for CloseReason {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.as_str().to_owned(),
        }
    }
}

/// Lifecycle of one duplex channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket not yet open.
    Connecting,
    /// Login frame sent, waiting for `LOGGED_IN`.
    AwaitingLogin,
    /// Handshake complete; frames are opaque payload.
    Authenticated,
    /// Socket closed. Absorbing.
    Closed,
    /// Transport failed. Only moves on to `Closed`.
    Errored,
}

/// Event delivered to the channel owner, in arrival order.
#[derive(Debug)]
pub enum ChannelEvent {
    /// Socket open and login frame sent.
    Open,
    /// `LOGGED_IN` received.
    Login,
    /// Payload frame after login.
    Message(Frame),
    /// Frame received while still awaiting `LOGGED_IN`.
    ///
    /// Still payload for the caller; it is reported separately so the
    /// handshake anomaly can be observed.
    PreLogin(Frame),
    /// Transport failure. Always followed by `Closed`.
    Error(ChannelError),
    /// Socket closed. Delivered exactly once.
    Closed(Option<CloseReason>),
}

/// Login state machine, fed with raw socket events.
#[derive(Debug)]
pub struct ChannelState {
    state: ConnectionState,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelState {
    /// Fresh machine in [`ConnectionState::Connecting`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::trace!(from = ?self.state, to = ?next, "Channel state transition");
        self.state = next;
    }

    /// Socket opened and login frame sent.
    pub fn opened(&mut self) -> ChannelEvent {
        self.transition(ConnectionState::AwaitingLogin);
        ChannelEvent::Open
    }

    /// Interpret one inbound websocket message.
    ///
    /// Returns `None` for control traffic (ping/pong) and for anything
    /// arriving after close.
    pub fn receive(&mut self, message: Message) -> Option<ChannelEvent> {
        if matches!(
            self.state,
            ConnectionState::Closed | ConnectionState::Errored
        ) {
            return None;
        }
        let frame = match message {
            Message::Text(text) => {
                if self.state == ConnectionState::AwaitingLogin && text.as_str() == LOGGED_IN {
                    self.transition(ConnectionState::Authenticated);
                    return Some(ChannelEvent::Login);
                }
                Frame::Text(text.as_str().to_owned())
            }
            Message::Binary(data) => Frame::Binary(data),
            Message::Close(frame) => {
                self.transition(ConnectionState::Closed);
                return Some(ChannelEvent::Closed(frame.map(CloseReason::from)));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return None,
        };

        if self.state == ConnectionState::Authenticated {
            Some(ChannelEvent::Message(frame))
        } else {
            tracing::warn!(
                len = frame.as_bytes().len(),
                "Frame received before LOGGED_IN, forwarding"
            );
            Some(ChannelEvent::PreLogin(frame))
        }
    }

    /// Transport error while reading.
    pub fn failed(&mut self, error: ChannelError) -> Option<ChannelEvent> {
        if matches!(
            self.state,
            ConnectionState::Closed | ConnectionState::Errored
        ) {
            return None;
        }
        self.transition(ConnectionState::Errored);
        Some(ChannelEvent::Error(error))
    }

    /// Socket stream ended, or the close owed after an error.
    pub fn ended(&mut self) -> Option<ChannelEvent> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        self.transition(ConnectionState::Closed);
        Some(ChannelEvent::Closed(None))
    }
}
