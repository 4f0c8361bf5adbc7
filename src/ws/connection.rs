use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::message::{channel_url, ChannelRole, ClientMessage, EventKind, ServerEvent};
use crate::config::RealtimeConfig;
use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_RECONNECT_JITTER_MS: u64 = 250;

/// State shared between the handle and its background task
struct Shared {
    url: String,
    config: RealtimeConfig,
    connected: AtomicBool,
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl Shared {
    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => self.dispatch(&event),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_message = %text,
                    "Failed to parse session event"
                );
            }
        }
    }

    /// Runs every handler for the event's kind, in registration order
    fn dispatch(&self, event: &ServerEvent) {
        let handlers: Vec<Handler> = {
            let map = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            map.get(&event.kind()).cloned().unwrap_or_default()
        };

        tracing::trace!(kind = ?event.kind(), handlers = handlers.len(), "Dispatching session event");

        for handler in handlers {
            handler(event);
        }
    }
}

/// Background task handles for an open connection
struct Running {
    outbound: mpsc::UnboundedSender<Message>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One logical connection to a session-scoped realtime channel
pub struct SessionConnection {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl SessionConnection {
    pub fn new(url: impl Into<String>, config: RealtimeConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                config,
                connected: AtomicBool::new(false),
                handlers: RwLock::new(HashMap::new()),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn for_session(
        config: RealtimeConfig,
        session_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> Self {
        let url = channel_url(&config.ws_base_url, session_id, role, user_id);
        Self::new(url, config)
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Registers a handler; several handlers per kind run in registration order
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let mut map = self.shared.handlers.write().unwrap_or_else(|e| e.into_inner());
        map.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Resolves once the transport handshake completes
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        // A previous task may still be retrying a dropped transport
        self.stop().await;

        let url = self.shared.url.as_str();
        tracing::info!(url = %url, "Connecting to session channel");

        let (ws, _response) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| ClientError::Timeout(format!("connecting to {}", url)))??;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.shared.connected.store(true, Ordering::SeqCst);
        let task = tokio::spawn(drive(self.shared.clone(), ws, outbound_rx, shutdown_rx));

        *self.running.lock().unwrap_or_else(|e| e.into_inner()) = Some(Running {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        });

        tracing::info!(url = %url, "Session channel connected");
        Ok(())
    }

    /// Queues a message for the transport; fails when the channel is not open
    pub fn send(&self, message: &ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let text = serde_json::to_string(message)?;
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let running = running.as_ref().ok_or(ClientError::NotConnected)?;
        running
            .outbound
            .send(Message::Text(text))
            .map_err(|_| ClientError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Closes the transport and stops the background task. Idempotent.
    pub async fn disconnect(&self) {
        let was_open = self.is_connected();
        self.stop().await;
        if was_open {
            tracing::info!(url = %self.shared.url, "Session channel disconnected");
        }
    }

    async fn stop(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);

        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            let mut task = running.task;
            if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                tracing::warn!(url = %self.shared.url, "Session channel task did not stop in time");
                task.abort();
            }
        }
    }

    #[cfg(test)]
    fn inject(&self, raw: &str) {
        self.shared.handle_text(raw);
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(running) = self.running.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = running.shutdown.send(true);
        }
    }
}

enum PumpEnd {
    Stopped,
    Lost(String),
}

/// Owns the socket for the lifetime of the connection, across reconnects
async fn drive(
    shared: Arc<Shared>,
    mut ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let end = pump(&shared, &mut ws, &mut outbound, &mut shutdown).await;
        shared.connected.store(false, Ordering::SeqCst);

        match end {
            PumpEnd::Stopped => {
                close_gracefully(&mut ws).await;
                return;
            }
            PumpEnd::Lost(reason) => {
                tracing::warn!(url = %shared.url, reason = %reason, "Session channel lost");
                shared.dispatch(&ServerEvent::Error { message: reason });

                match reconnect(&shared, &mut shutdown).await {
                    Some(fresh) => {
                        ws = fresh;
                        shared.connected.store(true, Ordering::SeqCst);
                    }
                    None => return,
                }
            }
        }
    }
}

/// Sends a close frame and waits for the peer's reply, so the server has
/// released the socket before a successor channel opens
async fn close_gracefully(ws: &mut WsStream) {
    if let Err(e) = ws.close(None).await {
        tracing::debug!(error = %e, "Close frame not sent");
        return;
    }
    let drained = timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
    if drained.is_err() {
        tracing::debug!("Peer did not answer the close frame");
    }
}

async fn pump(
    shared: &Shared,
    ws: &mut WsStream,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpEnd {
    let heartbeat_enabled = !shared.config.heartbeat_interval.is_zero();
    let period = shared.config.heartbeat_interval.max(Duration::from_secs(1));
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return PumpEnd::Stopped;
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.handle_text(&text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => shared.handle_text(&text),
                    Err(_) => tracing::debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return PumpEnd::Lost(reason);
                }
                // Protocol ping/pong frames are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpEnd::Lost(e.to_string()),
                None => return PumpEnd::Lost("stream ended".to_string()),
            },
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = ws.send(message).await {
                        return PumpEnd::Lost(e.to_string());
                    }
                }
                None => return PumpEnd::Stopped,
            },
            _ = heartbeat.tick(), if heartbeat_enabled => {
                let ping = match serde_json::to_string(&ClientMessage::Ping) {
                    Ok(ping) => ping,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode heartbeat");
                        continue;
                    }
                };
                if let Err(e) = ws.send(Message::Text(ping)).await {
                    return PumpEnd::Lost(e.to_string());
                }
                tracing::trace!("Heartbeat sent");
            }
        }
    }
}

/// Linear backoff with jitter; `None` when attempts run out or shutdown is requested
async fn reconnect(shared: &Shared, shutdown: &mut watch::Receiver<bool>) -> Option<WsStream> {
    let max_attempts = shared.config.max_reconnect_attempts;

    for attempt in 1..=max_attempts {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_RECONNECT_JITTER_MS));
        let delay = shared.config.reconnect_delay * attempt + jitter;

        tracing::info!(
            attempt = attempt,
            max_attempts = max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to session channel"
        );

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => return None,
        }

        match timeout(CONNECT_TIMEOUT, connect_async(shared.url.as_str())).await {
            Ok(Ok((ws, _))) => {
                tracing::info!(attempt = attempt, "Session channel reconnected");
                return Some(ws);
            }
            Ok(Err(e)) => {
                tracing::warn!(attempt = attempt, error = %e, "Reconnect attempt failed");
            }
            Err(_) => {
                tracing::warn!(attempt = attempt, "Reconnect attempt timed out");
            }
        }
    }

    if max_attempts > 0 {
        tracing::error!(attempts = max_attempts, url = %shared.url, "Giving up on session channel");
        shared.dispatch(&ServerEvent::Error {
            message: format!("Connection lost after {} reconnect attempts", max_attempts),
        });
    }
    None
}
