use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;
use uuid::Uuid;

use super::frame::{Command, Frame, FrameError};
use crate::config::ClientConfig;
use crate::error::{with_retry, ReconnectPolicy};

/// Callback receiving the raw body of each message on a subscription.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid push channel url: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("no answer from the broker within {0:?}")]
    Timeout(Duration),
    #[error("broker rejected the connection: {0}")]
    Rejected(String),
    #[error("bad frame from broker: {0}")]
    Frame(#[from] FrameError),
    #[error("unexpected {0} frame while connecting")]
    UnexpectedFrame(Command),
    #[error("connection closed by broker")]
    Closed,
    #[error("push channel is not connected")]
    NotConnected,
}

/// Handle of a live subscription, consumed by [`PushChannel::unsubscribe`].
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: String,
    topic: String,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

struct SubscriptionEntry {
    topic: String,
    handler: MessageHandler,
}

struct Connection {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    session: Option<String>,
}

impl Connection {
    /// Let the writer flush queued frames, then stop both tasks.
    async fn shutdown(mut self) {
        let _ = timeout(Duration::from_secs(1), &mut self.writer).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// A single STOMP-over-WebSocket connection to the message broker.
///
/// Subscriptions are multiplexed over the connection; each `MESSAGE` frame
/// is handed to the handler of the subscription it names, in arrival order,
/// from one reader task.
pub struct PushChannel {
    ws_url: Url,
    client_id: String,
    connect_timeout: Duration,
    reconnect: ReconnectPolicy,
    state: Arc<RwLock<ChannelState>>,
    epoch: Arc<AtomicU64>,
    connection: tokio::sync::Mutex<Option<Connection>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    subscriptions: Arc<DashMap<String, SubscriptionEntry>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannel")
            .field("ws_url", &self.ws_url.as_str())
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl PushChannel {
    /// Create a disconnected channel with a freshly generated client token.
    pub fn new(ws_url: Url, connect_timeout: Duration, reconnect: ReconnectPolicy) -> Self {
        Self {
            ws_url,
            client_id: Uuid::new_v4().to_string(),
            connect_timeout,
            reconnect,
            state: Arc::new(RwLock::new(ChannelState::Disconnected)),
            epoch: Arc::new(AtomicU64::new(0)),
            connection: tokio::sync::Mutex::new(None),
            outbound: Mutex::new(None),
            subscriptions: Arc::new(DashMap::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let ws_url = config.ws_endpoint()?;
        Ok(Self::new(ws_url, config.connect_timeout, config.reconnect.clone()))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Session name the broker assigned in its `CONNECTED` frame, if any.
    pub async fn session_name(&self) -> Option<String> {
        self.connection
            .lock()
            .await
            .as_ref()
            .and_then(|c| c.session.clone())
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Endpoint including the `username` query parameter.
    pub fn endpoint(&self) -> Url {
        let mut url = self.ws_url.clone();
        url.query_pairs_mut().append_pair("username", &self.client_id);
        url
    }

    /// Open the connection unless it is already open.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if slot.is_some() && self.is_connected() {
            return Ok(());
        }
        // a connection the broker closed on us
        drop(slot.take());

        self.set_state(ChannelState::Connecting);
        let endpoint = self.endpoint();

        let this = self;
        let endpoint = &endpoint;
        let opened = with_retry(&self.reconnect, move || async move {
            this.open(endpoint).await.map_err(anyhow::Error::from)
        })
        .await;

        match opened {
            Ok((connection, outbound)) => {
                tracing::info!(
                    "push channel connected to {} as {}",
                    self.ws_url,
                    self.client_id
                );
                // subscriptions outlive a connection the broker dropped
                for entry in self.subscriptions.iter() {
                    let frame = Frame::subscribe(entry.key(), &entry.topic).encode();
                    if outbound.send(Message::Text(frame.into())).is_ok() {
                        tracing::info!("resubscribed to {} ({})", entry.topic, entry.key());
                    }
                }
                *self.outbound.lock() = Some(outbound);
                *slot = Some(connection);
                self.set_state(ChannelState::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("push channel connect to {} failed: {:#}", self.ws_url, e);
                self.set_state(ChannelState::Disconnected);
                Err(e).with_context(|| format!("connecting to {}", self.ws_url))
            }
        }
    }

    async fn open(
        &self,
        endpoint: &Url,
    ) -> Result<(Connection, mpsc::UnboundedSender<Message>), PushError> {
        let (ws_stream, _) = timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(endpoint.as_str()),
        )
        .await
        .map_err(|_| PushError::Timeout(self.connect_timeout))??;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => return Err(PushError::InvalidUrl(endpoint.to_string())),
        };
        ws_tx
            .send(Message::Text(Frame::connect(&host, &self.client_id).encode().into()))
            .await?;

        let connected = timeout(self.connect_timeout, async {
            while let Some(msg) = ws_rx.next().await {
                match msg? {
                    Message::Text(text) => {
                        let frame = match Frame::parse(text.as_str()) {
                            Err(FrameError::Empty) => continue,
                            other => other?,
                        };
                        return match frame.command {
                            Command::Connected => Ok(frame),
                            Command::Error => Err(PushError::Rejected(
                                frame.get("message").unwrap_or(frame.body.as_str()).to_string(),
                            )),
                            other => Err(PushError::UnexpectedFrame(other)),
                        };
                    }
                    Message::Close(_) => return Err(PushError::Closed),
                    _ => {}
                }
            }
            Err(PushError::Closed)
        })
        .await
        .map_err(|_| PushError::Timeout(self.connect_timeout))??;

        let session = connected.get("user-name").map(str::to_string);

        let (outbound, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if ws_tx.send(msg).await.is_err() || closing {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        let subscriptions = self.subscriptions.clone();
        let state = self.state.clone();
        let epoch = self.epoch.clone();
        let my_epoch = epoch.load(Ordering::SeqCst);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => dispatch(&subscriptions, text.as_str()),
                    Ok(Message::Close(reason)) => {
                        tracing::info!("push channel closed by broker: {:?}", reason);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("push channel read failed: {}", e);
                        break;
                    }
                }
            }
            if epoch.load(Ordering::SeqCst) == my_epoch {
                *state.write() = ChannelState::Disconnected;
            }
        });

        Ok((
            Connection {
                reader,
                writer,
                session,
            },
            outbound,
        ))
    }

    /// Subscribe `handler` to `topic`. The handler receives raw bodies.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Result<Subscription, PushError>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let outbound = self.sender()?;
        let id = format!(
            "sub-{}",
            self.next_subscription.fetch_add(1, Ordering::Relaxed)
        );

        self.subscriptions.insert(
            id.clone(),
            SubscriptionEntry {
                topic: topic.to_string(),
                handler: Arc::new(handler),
            },
        );

        let frame = Frame::subscribe(&id, topic).encode();
        if outbound.send(Message::Text(frame.into())).is_err() {
            self.subscriptions.remove(&id);
            return Err(PushError::Closed);
        }

        tracing::info!("subscribed to {} ({})", topic, id);
        Ok(Subscription {
            id,
            topic: topic.to_string(),
        })
    }

    /// Stop delivery for `subscription`.
    pub fn unsubscribe(&self, subscription: Subscription) -> Result<(), PushError> {
        if self.subscriptions.remove(&subscription.id).is_none() {
            return Ok(());
        }
        tracing::info!("unsubscribed from {} ({})", subscription.topic, subscription.id);

        match self.sender() {
            Ok(outbound) => {
                let frame = Frame::unsubscribe(&subscription.id).encode();
                outbound
                    .send(Message::Text(frame.into()))
                    .map_err(|_| PushError::Closed)
            }
            // nothing left to tell the broker
            Err(_) => Ok(()),
        }
    }

    /// Publish a `SEND` frame to `destination`.
    pub fn send(&self, destination: &str, content_type: &str, body: &str) -> Result<(), PushError> {
        let frame = Frame::send(destination, content_type, body).encode();
        self.sender()?
            .send(Message::Text(frame.into()))
            .map_err(|_| PushError::Closed)
    }

    /// Close the connection and drop every subscription.
    pub async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let outbound = self.outbound.lock().take();
        if let Some(connection) = slot.take() {
            if let Some(tx) = outbound {
                let receipt = format!("disconnect-{}", self.client_id);
                let _ = tx.send(Message::Text(Frame::disconnect(&receipt).encode().into()));
                let _ = tx.send(Message::Close(None));
            }
            connection.shutdown().await;
            tracing::info!("push channel disconnected");
        }

        self.subscriptions.clear();
        self.set_state(ChannelState::Disconnected);
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<Message>, PushError> {
        if !self.is_connected() {
            return Err(PushError::NotConnected);
        }
        self.outbound.lock().clone().ok_or(PushError::NotConnected)
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.write() = state;
    }
}

/// Route one inbound frame to the subscriptions it addresses.
fn dispatch(subscriptions: &DashMap<String, SubscriptionEntry>, raw: &str) {
    let frame = match Frame::parse(raw) {
        Ok(frame) => frame,
        Err(FrameError::Empty) => return,
        Err(e) => {
            tracing::warn!("dropping unparsable frame: {}", e);
            return;
        }
    };

    match frame.command {
        Command::Message => {
            let handlers: Vec<MessageHandler> =
                match frame.get("subscription").and_then(|id| subscriptions.get(id)) {
                    Some(entry) => vec![entry.handler.clone()],
                    None => {
                        let destination = frame.get("destination");
                        subscriptions
                            .iter()
                            .filter(|entry| Some(entry.topic.as_str()) == destination)
                            .map(|entry| entry.handler.clone())
                            .collect()
                    }
                };

            if handlers.is_empty() {
                tracing::debug!(
                    "no subscriber for message on {:?}",
                    frame.get("destination")
                );
            }
            // handlers run outside the map guards so they may unsubscribe
            for handler in handlers {
                handler(&frame.body);
            }
        }
        Command::Error => {
            tracing::warn!(
                "broker error: {}",
                frame.get("message").unwrap_or(frame.body.as_str())
            );
        }
        Command::Receipt => {
            tracing::debug!("receipt {:?}", frame.get("receipt-id"));
        }
        other => {
            tracing::debug!("ignoring {} frame", other);
        }
    }
}
