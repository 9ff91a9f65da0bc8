//! # Real-Time Stream Client
//!
//! WebSocket client delivering typed family events with automatic
//! reconnection.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stream Connection States                             │
//! │                                                                         │
//! │  ┌────────────┐   connect()    ┌────────────┐                          │
//! │  │Disconnected│ ─────────────► │ Connecting │                          │
//! │  └────────────┘                └─────┬──────┘                          │
//! │        ▲                             │                                  │
//! │        │                   success   │   failure                        │
//! │        │                       ┌─────┴─────┐                           │
//! │        │                       ▼           ▼                            │
//! │        │             ┌────────────┐  ┌──────────────┐                  │
//! │        │             │ Connected  │  │ Reconnecting │ ◄── wait backoff │
//! │        │             └─────┬──────┘  └──────┬───────┘                  │
//! │        │        error/close│                │ reopen                    │
//! │        │                   └───────────────►│                           │
//! │        │                                                                │
//! │        └───────────────── disconnect() (terminal) ──────────────────── │
//! │                                                                         │
//! │  BACKOFF: 1s, 2s, 4s, 8s, 16s, 30s, 30s, ... (no jitter)               │
//! │  Reset to 1s after ANY successful inbound frame.                        │
//! │  HEARTBEAT: {"event":"ping"} every 25s (under server idle timeouts).    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection errors never reach subscribers; the client reconnects
//! silently until [`EventStream::disconnect`] makes the shutdown terminal.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use hearth_core::events::{FamilyEvent, FamilyEventKind};

use crate::credentials::TokenStore;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Constants
// =============================================================================

/// Heartbeat period; shorter than typical server idle timeouts.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Handshake timeout per connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// First reconnect delay.
const BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Reconnect delay cap.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Buffered events between the receive loop and the consumer.
const EVENT_BUFFER: usize = 64;

/// The REST suffix stripped from the base URL when deriving the stream URL.
const API_SUFFIX: &str = "/v1";

/// Path of the streaming endpoint.
const STREAM_PATH: &str = "/stream";

// =============================================================================
// Connection State
// =============================================================================

/// Observable connection state of the stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not connected (initial and terminal state).
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected, receive and heartbeat loops running.
    Connected,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Disconnected => write!(f, "disconnected"),
            StreamState::Connecting => write!(f, "connecting"),
            StreamState::Connected => write!(f, "connected"),
            StreamState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// =============================================================================
// Wire Shape
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireEvent {
    event: String,
    family_id: Option<String>,
    actor_id: Option<String>,
    data: Option<Value>,
    ts: Option<DateTime<Utc>>,
}

/// Parses one text frame into a consumer event.
///
/// `ping`/`pong` are swallowed, unknown event names are logged and dropped,
/// and unparsable frames are dropped. `data` passes through re-serialized.
fn map_frame(text: &str) -> Option<FamilyEvent> {
    let wire: WireEvent = match serde_json::from_str(text) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(error = %e, "Dropping unparsable stream frame");
            return None;
        }
    };

    if wire.event == "ping" || wire.event == "pong" {
        return None;
    }

    let Some(kind) = FamilyEventKind::from_wire(&wire.event) else {
        warn!(event = %wire.event, "Dropping unrecognized stream event");
        return None;
    };

    Some(FamilyEvent {
        kind,
        family_id: wire.family_id,
        actor_id: wire.actor_id,
        data: wire.data.map(|value| value.to_string()),
        ts: wire.ts,
    })
}

// =============================================================================
// Backoff & URL Derivation
// =============================================================================

/// Reconnect backoff: 1s, 2s, 4s, 8s, 16s, 30s, 30s, ... deterministic.
fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(BACKOFF_FLOOR)
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(BACKOFF_CAP)
        .with_max_elapsed_time(None)
        .build()
}

/// Derives the streaming URL from the REST base URL.
///
/// Scheme swaps to ws(s), the `/v1` suffix is stripped, `/stream` is
/// appended, and `token`/`family_id` travel percent-encoded in the query.
fn derive_stream_url(base_url: &str, token: &str, family_id: &str) -> SyncResult<Url> {
    let mut url = Url::parse(base_url)?;

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(SyncError::InvalidUrl(format!(
                "Cannot derive a stream URL from scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| SyncError::InvalidUrl("Scheme swap failed".to_string()))?;

    let path = url.path().trim_end_matches('/');
    let root = path.strip_suffix(API_SUFFIX).unwrap_or(path);
    url.set_path(&format!("{root}{STREAM_PATH}"));

    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("family_id", family_id);

    Ok(url)
}

// =============================================================================
// Event Stream Handle
// =============================================================================

/// A consumable, cancelable sequence of family events.
///
/// Single consumer per connection. The sequence completes (returns `None`)
/// after [`EventStream::disconnect`]; connection drops in between are
/// invisible, the client reconnects on its own.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<FamilyEvent>,
    shutdown_tx: watch::Sender<bool>,
    state: Arc<RwLock<StreamState>>,
}

impl EventStream {
    /// Waits for the next event. `None` means the stream has completed.
    pub async fn next(&mut self) -> Option<FamilyEvent> {
        self.rx.recv().await
    }

    /// Current connection state.
    pub async fn state(&self) -> StreamState {
        *self.state.read().await
    }

    /// Terminal shutdown: disables reconnection, cancels the loops, closes
    /// the connection, and completes the sequence.
    pub fn disconnect(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// Factory for real-time event streams.
pub struct StreamClient {
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl StreamClient {
    /// Creates a client deriving stream URLs from the gateway base URL.
    pub fn new(base_url: &str, tokens: Arc<dyn TokenStore>) -> Self {
        StreamClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Opens the stream for a family.
    ///
    /// Requires a stored access token: with none there is nothing to
    /// authenticate with and no attempt is made.
    pub async fn connect(&self, family_id: &str) -> SyncResult<EventStream> {
        let token = self
            .tokens
            .access_token()
            .await
            .ok_or(SyncError::MissingCredentials)?;

        let url = derive_stream_url(&self.base_url, &token, family_id)?;
        let state = Arc::new(RwLock::new(StreamState::Disconnected));
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run(url, event_tx, shutdown_rx, state.clone()));

        Ok(EventStream {
            rx: event_rx,
            shutdown_tx,
            state,
        })
    }
}

/// Outer connection loop: connect, run, back off, repeat until shutdown.
async fn run(
    url: Url,
    event_tx: mpsc::Sender<FamilyEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    state: Arc<RwLock<StreamState>>,
) {
    let mut backoff = reconnect_backoff();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        *state.write().await = StreamState::Connecting;

        match connect_with_timeout(&url).await {
            Ok(ws) => {
                info!("Stream connected");
                *state.write().await = StreamState::Connected;

                if let Err(e) =
                    connection_loop(ws, &mut backoff, &event_tx, &mut shutdown_rx).await
                {
                    warn!(error = %e, "Stream connection ended");
                }
            }
            Err(e) => {
                warn!(error = %e, "Stream connection attempt failed");
            }
        }

        // Terminal shutdown or a consumer that went away both end the task.
        if *shutdown_rx.borrow() || event_tx.is_closed() {
            break;
        }

        let delay = backoff.next_backoff().unwrap_or(BACKOFF_CAP);
        debug!(delay_secs = delay.as_secs(), "Waiting before stream reconnect");
        *state.write().await = StreamState::Reconnecting;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    *state.write().await = StreamState::Disconnected;
    info!("Stream client stopped");
    // event_tx drops here, completing the consumer's sequence.
}

async fn connect_with_timeout(
    url: &Url,
) -> SyncResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    match timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
        Ok(Ok((ws, response))) => {
            debug!(status = ?response.status(), "Stream handshake complete");
            Ok(ws)
        }
        Ok(Err(e)) => Err(SyncError::from(e)),
        Err(_) => Err(SyncError::Connection(format!(
            "Handshake timeout after {}s",
            CONNECT_TIMEOUT.as_secs()
        ))),
    }
}

/// Inner loop: receive frames, heartbeat every 25s, watch for shutdown.
///
/// Returns `Ok(())` only on orderly shutdown; every error path means
/// "tear down and let the outer loop reconnect".
async fn connection_loop(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    backoff: &mut ExponentialBackoff,
    event_tx: &mpsc::Sender<FamilyEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SyncResult<()> {
    let (mut write, mut read) = ws.split();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick is immediate; treat it as the post-connect ping.

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        // Any successful receive proves the link is healthy.
                        backoff.reset();

                        if let Some(event) = map_frame(&text) {
                            debug!(kind = %event.kind, "Stream event");
                            if event_tx.send(event).await.is_err() {
                                return Err(SyncError::Channel(
                                    "Event consumer dropped".to_string(),
                                ));
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        backoff.reset();
                        write.send(WsMessage::Pong(data)).await?;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        backoff.reset();
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        return Err(SyncError::Connection(format!(
                            "Closed by server: {frame:?}"
                        )));
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        warn!("Dropping unexpected binary frame");
                    }
                    Some(Ok(WsMessage::Frame(_))) => {
                        // Raw frame, ignore
                    }
                    Some(Err(e)) => return Err(SyncError::from(e)),
                    None => {
                        return Err(SyncError::Connection(
                            "Stream ended without close".to_string(),
                        ))
                    }
                }
            }

            _ = heartbeat.tick() => {
                write
                    .send(WsMessage::Text(r#"{"event":"ping"}"#.to_string().into()))
                    .await?;
                debug!("Sent heartbeat ping");
            }

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
