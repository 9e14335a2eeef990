//! The realtime client: owns at most one transport connection to the push
//! channel, recovers from abnormal termination with bounded linear backoff,
//! and fans inbound envelopes out to registered subscribers by event type.

use std::fmt;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::auth::{self, CredentialProvider};
use crate::backoff::ReconnectBackoff;
use crate::config::Settings;
use crate::endpoint;
use crate::error::{RealtimeError, Result};
use crate::message::Envelope;
use crate::subscription::{EventCallback, SubscriptionRegistry};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Close code for an intentional closure; anything else is abnormal and
/// takes the retry path.
const NORMAL_CLOSE_CODE: u16 = 1000;
/// Code recorded when the transport ends without a close frame.
const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Observable state of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// How a driven session ended.
enum SessionEnd {
    /// The owner called `disconnect()`
    Shutdown,
    /// The server closed with code 1000; no retry
    NormalClose,
    /// Abnormal close, transport error, or EOF; eligible for retry
    Abnormal,
}

/// Client for the platform's realtime push channel.
///
/// Cheap to clone; all clones share the same connection, registry, and
/// observable state. Consumers never receive the transport itself, only
/// this surface.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    settings: Settings,
    credentials: Arc<dyn CredentialProvider>,
    registry: SubscriptionRegistry,
    status_tx: watch::Sender<ConnectionStatus>,
    message_tx: watch::Sender<Option<Envelope>>,
    last_error: RwLock<Option<RealtimeError>>,
    /// Sender feeding the active session task; None while disconnected
    outbound: RwLock<Option<mpsc::Sender<Message>>>,
    /// Set to true by `disconnect()`; cancels reads and pending reconnects
    shutdown: watch::Sender<bool>,
    /// Serializes concurrent `connect()` calls
    connect_gate: Mutex<()>,
}

impl RealtimeClient {
    /// Create a client with a credential provider derived from settings.
    pub fn new(settings: Settings) -> Self {
        let credentials = auth::from_settings(&settings.auth);
        Self::with_credentials(settings, credentials)
    }

    pub fn with_credentials(settings: Settings, credentials: Arc<dyn CredentialProvider>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (message_tx, _) = watch::channel(None);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(ClientInner {
                settings,
                credentials,
                registry: SubscriptionRegistry::new(),
                status_tx,
                message_tx,
                last_error: RwLock::new(None),
                outbound: RwLock::new(None),
                shutdown,
                connect_gate: Mutex::new(()),
            }),
        }
    }

    /// Open the connection. Idempotent: when a connection is already open
    /// (or opening), resolves without creating a duplicate transport.
    ///
    /// A handshake failure is returned to the caller and never schedules
    /// a retry; retries are driven solely by abnormal closure of an
    /// established connection.
    pub async fn connect(&self) -> Result<()> {
        let _gate = self.inner.connect_gate.lock().await;

        match self.status() {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => return Ok(()),
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
        }
        // A session task may still be draining after a transport error
        if self.inner.outbound.read().await.is_some() {
            return Ok(());
        }

        self.inner.shutdown.send_replace(false);
        // Subscribe before spawning so a disconnect racing the spawn is
        // still observed by the session task.
        let shutdown_rx = self.inner.shutdown.subscribe();
        self.inner.set_status(ConnectionStatus::Connecting);

        let stream = match open_socket(&self.inner).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Connection attempt failed");
                self.inner.record_error(e.clone()).await;
                self.inner.set_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        let session_id = Uuid::new_v4();
        let outbound_rx = self.inner.install_outbound().await;
        self.inner.set_status(ConnectionStatus::Connected);
        tracing::info!(
            session_id = %session_id,
            host = %self.inner.settings.endpoint.host,
            "Push channel connected"
        );

        tokio::spawn(run_loop(
            self.inner.clone(),
            stream,
            outbound_rx,
            shutdown_rx,
            session_id,
        ));
        Ok(())
    }

    /// Close the connection with a normal close code. Cancels any pending
    /// reconnect timer; auto-reconnect is never triggered by this path.
    pub async fn disconnect(&self) {
        tracing::info!("Disconnect requested");
        self.inner.shutdown.send_replace(true);
        self.inner.set_status(ConnectionStatus::Disconnected);
    }

    /// Serialize and write a message to the transport. Returns `false`
    /// without queueing when the client is not connected or the message
    /// cannot be serialized; never panics.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if !self.is_connected() {
            tracing::debug!("Dropping outbound message: not connected");
            return false;
        }

        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };

        let guard = self.inner.outbound.read().await;
        match guard.as_ref() {
            Some(tx) => tx.try_send(Message::text(text)).is_ok(),
            None => false,
        }
    }

    /// Register a callback for an event type. Callbacks for the same type
    /// are invoked in registration order.
    pub fn on(&self, event_type: &str, callback: EventCallback) {
        self.inner.registry.on(event_type, callback);
    }

    /// Unregister a callback by identity; unknown callbacks are a no-op.
    pub fn off(&self, event_type: &str, callback: &EventCallback) {
        self.inner.registry.off(event_type, callback);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Watch connection status transitions (for status indicators).
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// The most recently received envelope, if any.
    pub fn last_message(&self) -> Option<Envelope> {
        self.inner.message_tx.borrow().clone()
    }

    /// Watch inbound envelopes as they arrive.
    pub fn message_watch(&self) -> watch::Receiver<Option<Envelope>> {
        self.inner.message_tx.subscribe()
    }

    /// The most recent transport or close error, retained across the
    /// terminal disconnected state for inspection.
    pub async fn last_error(&self) -> Option<RealtimeError> {
        self.inner.last_error.read().await.clone()
    }
}

impl ClientInner {
    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "Connection status changed");
        }
    }

    async fn record_error(&self, error: RealtimeError) {
        *self.last_error.write().await = Some(error);
    }

    async fn install_outbound(&self) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
        *self.outbound.write().await = Some(tx);
        rx
    }

    async fn clear_outbound(&self) {
        *self.outbound.write().await = None;
    }

    /// Parse an inbound text frame and fan it out to subscribers. A frame
    /// that is not a valid envelope is dropped here and never reaches any
    /// callback.
    fn handle_text(&self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed inbound message");
                return;
            }
        };

        self.message_tx.send_replace(Some(envelope.clone()));

        let delivered = self.registry.dispatch(&envelope.event_type, &envelope.payload);
        tracing::debug!(
            event_type = %envelope.event_type,
            delivered,
            "Envelope dispatched"
        );
    }
}

/// Perform the WebSocket handshake against the configured endpoint.
async fn open_socket(inner: &ClientInner) -> Result<WsStream> {
    let token = inner.credentials.bearer_token().await;
    let url = endpoint::build_url(&inner.settings.endpoint, token.as_deref());

    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| RealtimeError::Handshake(e.to_string()))?;

    Ok(stream)
}

/// Session task: drives the established connection and, on abnormal
/// termination, retries with linear backoff until the attempt budget runs
/// out or the owner disconnects.
#[tracing::instrument(
    name = "realtime.session",
    skip(inner, stream, outbound_rx, shutdown_rx),
    fields(session_id = %session_id)
)]
async fn run_loop(
    inner: Arc<ClientInner>,
    mut stream: WsStream,
    mut outbound_rx: mpsc::Receiver<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
    session_id: Uuid,
) {
    let mut backoff = ReconnectBackoff::new(inner.settings.reconnect.clone());

    loop {
        let end = drive_connection(&inner, &mut stream, &mut outbound_rx, &mut shutdown_rx).await;
        inner.clear_outbound().await;

        match end {
            SessionEnd::Shutdown => {
                tracing::info!("Session closed by client");
                inner.set_status(ConnectionStatus::Disconnected);
                return;
            }
            SessionEnd::NormalClose => {
                tracing::info!("Server closed the connection normally");
                inner.set_status(ConnectionStatus::Disconnected);
                return;
            }
            SessionEnd::Abnormal => {}
        }

        (stream, outbound_rx) = match reconnect(&inner, &mut shutdown_rx, &mut backoff).await {
            Some(reconnected) => reconnected,
            None => return,
        };
    }
}

/// Re-establish the connection after an abnormal termination. Returns
/// `None` when the attempt budget is exhausted or a disconnect cancels the
/// pending timer.
async fn reconnect(
    inner: &Arc<ClientInner>,
    shutdown_rx: &mut watch::Receiver<bool>,
    backoff: &mut ReconnectBackoff,
) -> Option<(WsStream, mpsc::Receiver<Message>)> {
    loop {
        let delay = match backoff.next_delay() {
            Some(delay) => delay,
            None => {
                let attempts = backoff.attempt();
                tracing::error!(attempts, "Reconnect attempts exhausted, giving up");
                inner
                    .record_error(RealtimeError::ReconnectExhausted { attempts })
                    .await;
                inner.set_status(ConnectionStatus::Disconnected);
                return None;
            }
        };

        inner.set_status(ConnectionStatus::Connecting);
        tracing::info!(
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow_and_update() {
                    tracing::info!("Pending reconnect cancelled by disconnect");
                    inner.set_status(ConnectionStatus::Disconnected);
                    return None;
                }
            }
        }

        // A disconnect that raced the timer expiry must still win
        if *shutdown_rx.borrow_and_update() {
            inner.set_status(ConnectionStatus::Disconnected);
            return None;
        }

        match open_socket(inner).await {
            Ok(stream) => {
                backoff.reset();
                let outbound_rx = inner.install_outbound().await;
                inner.set_status(ConnectionStatus::Connected);
                tracing::info!("Reconnected");
                return Some((stream, outbound_rx));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reconnect attempt failed");
                inner.record_error(e).await;
            }
        }
    }
}

/// Drive one established connection until it ends.
async fn drive_connection(
    inner: &Arc<ClientInner>,
    stream: &mut WsStream,
    outbound_rx: &mut mpsc::Receiver<Message>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow_and_update() {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    if let Err(e) = stream.close(Some(frame)).await {
                        tracing::debug!(error = %e, "Error while closing transport");
                    }
                    return SessionEnd::Shutdown;
                }
            }
            Some(message) = outbound_rx.recv() => {
                if let Err(e) = stream.send(message).await {
                    tracing::warn!(error = %e, "Failed to write to transport");
                    inner.record_error(RealtimeError::Transport(e.to_string())).await;
                    inner.set_status(ConnectionStatus::Error);
                    return SessionEnd::Abnormal;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.handle_text(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .as_ref()
                        .map(|f| u16::from(f.code))
                        .unwrap_or(ABNORMAL_CLOSE_CODE);
                    if code == NORMAL_CLOSE_CODE {
                        return SessionEnd::NormalClose;
                    }
                    tracing::warn!(code, "Connection closed abnormally");
                    inner.record_error(RealtimeError::AbnormalClose { code }).await;
                    return SessionEnd::Abnormal;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // tungstenite answers pings on its own
                }
                Some(Ok(other)) => {
                    tracing::debug!(frame = ?other, "Ignoring unsupported frame");
                }
                Some(Err(e)) => {
                    // A peer that vanishes without a close handshake
                    // surfaces as a stream error, not as a close frame;
                    // it is still an abnormal closure, not a transport
                    // fault.
                    let error = match &e {
                        WsError::ConnectionClosed
                        | WsError::AlreadyClosed
                        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                            tracing::warn!(error = %e, "Connection reset without close handshake");
                            RealtimeError::AbnormalClose { code: ABNORMAL_CLOSE_CODE }
                        }
                        _ => {
                            tracing::warn!(error = %e, "Transport error");
                            inner.set_status(ConnectionStatus::Error);
                            RealtimeError::Transport(e.to_string())
                        }
                    };
                    inner.record_error(error).await;
                    return SessionEnd::Abnormal;
                }
                None => {
                    tracing::warn!("Connection dropped without close frame");
                    inner
                        .record_error(RealtimeError::AbnormalClose { code: ABNORMAL_CLOSE_CODE })
                        .await;
                    return SessionEnd::Abnormal;
                }
            }
        }
    }
}
