//! Authenticated websocket channels.
//!
//! A channel sends the login frame as soon as the socket opens, then
//! reports events through [`DuplexChannel::next_event`] or a
//! [`ChannelHandler`]. After `LOGGED_IN` it is a raw duplex pipe.

use std::sync::Arc;

use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    stream::{self, BoxStream, SplitSink, SplitStream},
};
use komodo_terminal_core::{ClientConfig, CredentialSource, Credentials, QueryError};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use url::Url;
use uuid::Uuid;

use crate::protocol::{ChannelEvent, ChannelState, CloseReason, ConnectionState, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel error.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Neither a JWT nor a complete API key pair is held.
    #[error("No credentials available for login")]
    MissingCredentials,
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Invalid query: {0}")]
    Query(#[from] QueryError),
    #[error("Failed to serialize login frame: {0}")]
    Login(#[from] serde_json::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Write attempted after the channel was closed.
    #[error("Channel closed")]
    Closed,
}

/// Callbacks for a channel driven by [`DuplexChannel::run`].
///
/// Callbacks run on the reading task and should return quickly.
pub trait ChannelHandler: Send {
    /// Socket open, login frame sent.
    fn on_open(&mut self) {}

    /// `LOGGED_IN` received. Fires at most once.
    fn on_login(&mut self) {}

    /// Inbound payload frame.
    fn on_message(&mut self, frame: Frame);

    /// A frame arrived before `LOGGED_IN`. Called just before the same
    /// frame is passed to [`ChannelHandler::on_message`].
    fn on_handshake_anomaly(&mut self, _frame: &Frame) {}

    /// Transport failure; `on_close` follows.
    fn on_error(&mut self, _error: &ChannelError) {}

    /// Socket closed. Fires exactly once.
    fn on_close(&mut self, _reason: Option<CloseReason>) {}
}

impl ChannelError {
    fn from_write(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(tungstenite::error::ProtocolError::SendAfterClosing) => {
                Self::Closed
            }
            other => Self::WebSocket(other),
        }
    }
}

struct SinkHalf {
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

/// Write half of a channel. Cheap to clone; clones share the close state.
#[derive(Clone)]
pub struct DuplexSender {
    inner: Arc<Mutex<SinkHalf>>,
}

impl DuplexSender {
    fn new(sink: SplitSink<WsStream, Message>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkHalf {
                sink,
                closed: false,
            })),
        }
    }

    /// Send a frame.
    ///
    /// # Errors
    /// Returns [`ChannelError::Closed`] once the channel was closed from
    /// either side, or the write error otherwise.
    pub async fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        let mut half = self.inner.lock().await;
        if half.closed {
            return Err(ChannelError::Closed);
        }
        half.sink
            .send(frame.into())
            .await
            .map_err(ChannelError::from_write)
    }

    /// Send a text frame.
    ///
    /// # Errors
    /// Returns error if the socket is closed or the write fails.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        self.send(Frame::Text(text.into())).await
    }

    /// Send a binary frame.
    ///
    /// # Errors
    /// Returns error if the socket is closed or the write fails.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), ChannelError> {
        self.send(Frame::Binary(data.into())).await
    }

    /// Start the close handshake. The reading side sees `Closed` once the
    /// peer answers.
    ///
    /// # Errors
    /// Returns error if the close frame cannot be written.
    pub async fn close(&self) -> Result<(), ChannelError> {
        let mut half = self.inner.lock().await;
        if half.closed {
            return Ok(());
        }
        half.closed = true;
        half.sink.close().await.map_err(ChannelError::from_write)
    }
}

/// One authenticated websocket channel, owned by its caller.
pub struct DuplexChannel {
    id: Uuid,
    sender: DuplexSender,
    receiver: SplitStream<WsStream>,
    state: ChannelState,
    pending: Option<ChannelEvent>,
}

impl DuplexChannel {
    /// Open a socket to `url` and send the login frame for `credentials`.
    ///
    /// The first event returned by [`Self::next_event`] is `Open`.
    ///
    /// # Errors
    /// Returns error if the socket cannot be opened or the login frame
    /// cannot be sent.
    pub async fn open(url: &Url, credentials: &Credentials) -> Result<Self, ChannelError> {
        let id = Uuid::new_v4();
        let login = credentials.login_message().to_json()?;
        let mut state = ChannelState::new();

        tracing::debug!(channel_id = %id, url = %url, "Opening duplex channel");
        let (socket, _response) = connect_async(url.as_str()).await.inspect_err(|e| {
            tracing::error!(channel_id = %id, url = %url, "WebSocket connect failed: {e}");
        })?;
        let (sink, receiver) = socket.split();
        let sender = DuplexSender::new(sink);

        sender.send(Frame::Text(login)).await?;
        let open = state.opened();

        Ok(Self {
            id,
            sender,
            receiver,
            state,
            pending: Some(open),
        })
    }

    /// Id used in log output for this channel.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Lifecycle state as of the last delivered event.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state.state()
    }

    /// Handle for writing to the channel.
    #[must_use]
    pub fn sender(&self) -> DuplexSender {
        self.sender.clone()
    }

    /// Wait for the next event. Returns `None` once `Closed` was delivered.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.state.state() {
                ConnectionState::Closed => return None,
                ConnectionState::Errored => return self.state.ended(),
                _ => {}
            }
            match self.receiver.next().await {
                Some(Ok(message)) => {
                    if let Some(event) = self.state.receive(message) {
                        if matches!(event, ChannelEvent::Login) {
                            tracing::debug!(channel_id = %self.id, "Duplex channel authenticated");
                        }
                        return Some(event);
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(channel_id = %self.id, "WebSocket error: {e}");
                    return self.state.failed(e.into());
                }
                None => {
                    tracing::debug!(channel_id = %self.id, "Duplex channel ended");
                    return self.state.ended();
                }
            }
        }
    }

    /// Drive the channel to completion, dispatching every event to `handler`.
    pub async fn run<H: ChannelHandler + ?Sized>(mut self, handler: &mut H) {
        while let Some(event) = self.next_event().await {
            match event {
                ChannelEvent::Open => handler.on_open(),
                ChannelEvent::Login => handler.on_login(),
                ChannelEvent::Message(frame) => handler.on_message(frame),
                ChannelEvent::PreLogin(frame) => {
                    handler.on_handshake_anomaly(&frame);
                    handler.on_message(frame);
                }
                ChannelEvent::Error(error) => handler.on_error(&error),
                ChannelEvent::Closed(reason) => handler.on_close(reason),
            }
        }
    }

    /// The channel as a stream of events.
    #[must_use]
    pub fn into_events(self) -> BoxStream<'static, ChannelEvent> {
        stream::unfold(self, |mut channel| async move {
            let event = channel.next_event().await?;
            Some((event, channel))
        })
        .boxed()
    }
}

/// Opens channels under one base URL with caller-held credentials.
#[derive(Clone)]
pub struct DuplexConnector {
    config: ClientConfig,
    credentials: Arc<dyn CredentialSource>,
}

impl DuplexConnector {
    /// Connector for `config`, reading credentials from `credentials` on
    /// every connect.
    #[must_use]
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// Connect to `path` with `query` form-encoded into the URL.
    ///
    /// Credentials are read at call time.
    ///
    /// # Errors
    /// Returns error if no credentials are held, the URL is invalid or the
    /// socket cannot be opened.
    pub async fn connect(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<DuplexChannel, ChannelError> {
        let credentials = self
            .credentials
            .credentials()
            .ok_or(ChannelError::MissingCredentials)?;
        let url = self.config.ws_url(path, query)?;
        DuplexChannel::open(&url, &credentials).await
    }
}
