//! # api
//!
//! **DerivClient** — single-connection WebSocket client multiplexing many
//! concurrent request/response exchanges and push subscriptions over one
//! transport.
//!
//! ```text
//!  request(payload) ──▶ req_id = N ──▶ pending[N] ──▶ socket
//!                                         ▲
//!  inbound frame ── req_id match? ────────┘ resolve / reject (priority path)
//!       │
//!       ├─ ohlc/tick with subscription id → subscription sink
//!       ├─ error without req_id           → generic error event
//!       └─ anything else                  → dropped with diagnostic
//! ```
//!
//! ## Lifecycle
//!
//! - `connect()` establishes the transport once; initial failure is returned
//!   to the caller and never auto-retried.
//! - Unexpected closure rejects *every* pending request exactly once, clears
//!   both registries (subscriptions are **not** restored — re-subscribing is
//!   the orchestrator's job) and starts bounded reconnection with linear
//!   backoff (attempt × base delay).  Exhausting the attempts is terminal
//!   until the caller requests a fresh `connect()`.
//! - Registries live in one state object owned by the connection and are
//!   rebuilt fresh per connection — nothing global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::Candle;

pub mod protocol;

use protocol::{ActiveSymbolsRequest, ForgetRequest, TicksHistoryRequest};

// ─── Public Types ─────────────────────────────────────────────────────────────

/// Subscription key: one live stream per (symbol, granularity).
pub type SubKey = (String, u32);

/// One parsed push update delivered to a subscription sink.
#[derive(Debug, Clone)]
pub struct LiveCandle {
    pub symbol: String,
    pub granularity: u32,
    pub candle: Candle,
}

/// Connection-layer notifications broadcast to observers.  Sending never
/// blocks dispatch; slow observers lag and skip.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// Bounded reconnection gave up — terminal until an explicit `connect()`.
    ReconnectExhausted { attempts: u32 },
    /// Server error that carried no correlation id.
    RemoteError { code: String, message: String },
}

/// Diagnostic snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub pending_requests: usize,
    pub active_subscriptions: usize,
}

// ─── Registries ───────────────────────────────────────────────────────────────

struct PendingRequest {
    tx: tokio::sync::oneshot::Sender<Result<Value, ApiError>>,
}

struct Subscription {
    sub_id: String,
    #[allow(dead_code)] // kept for the status/debug surface
    req_id: u64,
    sink: mpsc::UnboundedSender<LiveCandle>,
}

/// Both registries, owned by the connection layer alone.  Only the message
/// dispatch path and the request/subscribe call paths touch these.
#[derive(Default)]
struct Registry {
    pending: HashMap<u64, PendingRequest>,
    subscriptions: HashMap<SubKey, Subscription>,
    by_sub_id: HashMap<String, SubKey>,
}

// ─── Inner State ──────────────────────────────────────────────────────────────

struct Inner {
    url: String,
    request_timeout_ms: u64,
    history_timeout_ms: u64,
    reconnect_base_ms: u64,
    max_reconnect_attempts: u32,

    /// Correlation ids — unique and strictly increasing per client.
    counter: AtomicU64,
    connected: AtomicBool,
    /// Set by explicit `disconnect()` — suppresses auto-reconnect.
    shutdown: AtomicBool,
    reconnect_attempts: AtomicU32,

    registry: Mutex<Registry>,
    outbound: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    events_tx: broadcast::Sender<ClientEvent>,
}

impl Inner {
    fn next_req_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sends a frame through the current writer; false when not connected.
    async fn send_frame(&self, frame: Message) -> bool {
        match self.outbound.read().await.as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Rejects every pending request with a transport error; returns how many.
    async fn fail_all_pending(&self, reason: &str) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut registry = self.registry.lock().await;
            registry.pending.drain().map(|(_, pending)| pending).collect()
        };
        let count = drained.len();
        for pending in drained {
            let _ = pending.tx.send(Err(ApiError::Transport(reason.to_string())));
        }
        count
    }

    /// Drops every subscription registration (no teardown frames — the
    /// server side died with the socket).
    async fn clear_subscriptions(&self) -> usize {
        let mut registry = self.registry.lock().await;
        registry.by_sub_id.clear();
        let count = registry.subscriptions.len();
        registry.subscriptions.clear();
        count
    }

    // ── Transport ─────────────────────────────────────────────────────────────

    /// Opens the socket and spawns the reader/writer tasks.  Used by both the
    /// caller-facing `connect()` (no retry) and the reconnect loop.
    async fn establish(inner: &Arc<Inner>) -> Result<(), ApiError> {
        let (stream, _) = connect_async(inner.url.as_str())
            .await
            .map_err(|e| ApiError::Transport(format!("connect failed: {e}")))?;

        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *inner.outbound.write().await = Some(tx);

        // Writer: serialize outbound frames onto the single socket.
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
        });

        // Reader: single-threaded dispatch of every inbound frame.
        let reader_inner = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => Inner::dispatch(&reader_inner, value).await,
                        Err(e) => {
                            // Malformed frame: logged and dropped, other
                            // in-flight operations unaffected.
                            warn!(error = %e, "Protocol error — unparseable frame dropped");
                        }
                    },
                    // tungstenite queues pong replies internally.
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(_) => debug!("non-text frame ignored"),
                    Err(e) => {
                        warn!(error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
            Inner::on_transport_lost(&reader_inner).await;
        });

        inner.connected.store(true, Ordering::SeqCst);
        inner.reconnect_attempts.store(0, Ordering::SeqCst);
        let _ = inner.events_tx.send(ClientEvent::Connected);
        info!(url = %inner.url, "✅ Connected to Deriv API");
        Ok(())
    }

    /// Socket died: reject all pendings once, drop subscriptions, notify,
    /// then start bounded reconnection (unless this was an explicit
    /// disconnect).
    async fn on_transport_lost(inner: &Arc<Inner>) {
        // swap() makes closure handling idempotent across reader exit paths.
        if !inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        *inner.outbound.write().await = None;

        let rejected = inner.fail_all_pending("connection closed").await;
        let dropped = inner.clear_subscriptions().await;
        warn!(rejected, dropped, "🔌 Disconnected from Deriv API");
        let _ = inner.events_tx.send(ClientEvent::Disconnected);

        if !inner.shutdown.load(Ordering::SeqCst) {
            Inner::spawn_reconnect(inner);
        }
    }

    /// Linear backoff: attempt × base delay, up to the configured cap.
    fn spawn_reconnect(inner: &Arc<Inner>) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let max = inner.max_reconnect_attempts;
            for attempt in 1..=max {
                if inner.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                inner.reconnect_attempts.store(attempt, Ordering::SeqCst);
                info!(attempt, max, "🔄 Reconnecting...");
                tokio::time::sleep(Duration::from_millis(
                    inner.reconnect_base_ms * attempt as u64,
                ))
                .await;

                match Inner::establish(&inner).await {
                    Ok(()) => return,
                    Err(error) => warn!(%error, attempt, "reconnect attempt failed"),
                }
            }
            error!(attempts = max, "❌ Max reconnection attempts reached");
            let _ = inner
                .events_tx
                .send(ClientEvent::ReconnectExhausted { attempts: max });
        });
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Routes one inbound message.  Correlation-id resolution takes priority
    /// over every other path.
    async fn dispatch(inner: &Arc<Inner>, value: Value) {
        let req_id = value.get("req_id").and_then(Value::as_u64);
        let msg_type = value.get("msg_type").and_then(Value::as_str).unwrap_or("-");
        debug!(msg_type, req_id, "📨 inbound message");

        // [1] Response to a pending request.
        if let Some(id) = req_id {
            let pending = { inner.registry.lock().await.pending.remove(&id) };
            if let Some(pending) = pending {
                let result = if value.get("error").is_some() {
                    let remote = ApiError::from_remote(&value["error"]);
                    warn!(req_id = id, error = %remote, "❌ request failed");
                    Err(remote)
                } else {
                    Ok(value)
                };
                let _ = pending.tx.send(result);
                return;
            }
            // Not pending: streaming pushes re-use the subscribe req_id, so
            // fall through to the push shapes before declaring it unmatched.
        }

        // [2] Push shapes, dispatched by embedded subscription id.
        if let Some(ohlc) = value.get("ohlc") {
            Inner::dispatch_push(inner, ohlc).await;
            return;
        }
        if let Some(tick) = value.get("tick") {
            // Candle subscriptions never produce ticks; recognized but unused.
            let id = tick.get("id").and_then(Value::as_str).unwrap_or("-");
            debug!(sub_id = id, "tick push ignored (no tick subscriptions)");
            return;
        }

        // [3] Server error with no correlation — generic error notification.
        if let Some(err) = value.get("error") {
            if req_id.is_none() {
                let remote = ApiError::from_remote(err);
                error!(error = %remote, "API error without correlation id");
                if let ApiError::Remote { code, message } = remote {
                    let _ = inner.events_tx.send(ClientEvent::RemoteError { code, message });
                }
                return;
            }
        }

        // [4] Nothing matched.
        if let Some(id) = req_id {
            warn!(req_id = id, msg_type, "⚠️ response for unknown req_id dropped");
        } else {
            debug!(msg_type, "unhandled message dropped");
        }
    }

    async fn dispatch_push(inner: &Arc<Inner>, ohlc: &Value) {
        let Some(sub_id) = ohlc.get("id").and_then(Value::as_str) else {
            debug!("ohlc push without subscription id dropped");
            return;
        };

        let registry = inner.registry.lock().await;
        let Some(key) = registry.by_sub_id.get(sub_id) else {
            debug!(sub_id, "ohlc push for unknown subscription dropped");
            return;
        };
        let Some(subscription) = registry.subscriptions.get(key) else {
            return;
        };

        match protocol::parse_ohlc_candle(ohlc) {
            Some(candle) => {
                let update = LiveCandle {
                    symbol: key.0.clone(),
                    granularity: key.1,
                    candle,
                };
                if subscription.sink.send(update).is_err() {
                    debug!(sub_id, "subscription sink closed — push dropped");
                }
            }
            None => warn!(sub_id, "Protocol error — malformed ohlc push dropped"),
        }
    }
}

// ─── DerivClient ──────────────────────────────────────────────────────────────

/// Handle to the single logical connection.  Cheap to clone.
#[derive(Clone)]
pub struct DerivClient {
    inner: Arc<Inner>,
}

impl DerivClient {
    pub fn new(config: &AppConfig) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                url: config.ws_url(),
                request_timeout_ms: config.request_timeout_ms,
                history_timeout_ms: config.history_timeout_ms,
                reconnect_base_ms: config.reconnect_base_ms,
                max_reconnect_attempts: config.max_reconnect_attempts,
                counter: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                registry: Mutex::new(Registry::default()),
                outbound: RwLock::new(None),
                events_tx,
            }),
        }
    }

    /// Establishes the transport.  A failure here is returned as-is — retry
    /// is driven only by unexpected closure, never by initial connect.
    pub async fn connect(&self) -> Result<(), ApiError> {
        self.inner.shutdown.store(false, Ordering::SeqCst);
        Inner::establish(&self.inner).await
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Observer stream for connection-state transitions and uncorrelated
    /// server errors.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events_tx.subscribe()
    }

    pub async fn status(&self) -> ConnectionStatus {
        let registry = self.inner.registry.lock().await;
        ConnectionStatus {
            connected: self.is_connected(),
            reconnect_attempts: self.inner.reconnect_attempts.load(Ordering::SeqCst),
            pending_requests: registry.pending.len(),
            active_subscriptions: registry.subscriptions.len(),
        }
    }

    // ── Request / Response ────────────────────────────────────────────────────

    /// Correlated round-trip: attaches a fresh `req_id`, registers the
    /// pending slot, sends, and awaits the matching response.
    ///
    /// Resolution order is dictated purely by response arrival — many
    /// requests may be in flight at once.
    pub async fn request(&self, mut payload: Value, timeout_ms: u64) -> Result<Value, ApiError> {
        if !self.is_connected() {
            return Err(ApiError::NotConnected);
        }
        if !payload.is_object() {
            return Err(ApiError::Protocol(
                "request payload must be a JSON object".to_string(),
            ));
        }

        let id = self.inner.next_req_id();
        payload["req_id"] = id.into();

        let (tx, rx) = tokio::sync::oneshot::channel();
        {
            let mut registry = self.inner.registry.lock().await;
            registry.pending.insert(id, PendingRequest { tx });
        }

        debug!(req_id = id, "📤 sending request");
        let frame = Message::Text(payload.to_string());
        if !self.inner.send_frame(frame).await {
            self.inner.registry.lock().await.pending.remove(&id);
            return Err(ApiError::NotConnected);
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without resolution — connection teardown race.
            Ok(Err(_)) => Err(ApiError::Transport("connection closed".to_string())),
            Err(_) => {
                self.inner.registry.lock().await.pending.remove(&id);
                warn!(req_id = id, timeout_ms, "⏰ request timed out");
                Err(ApiError::Timeout(timeout_ms))
            }
        }
    }

    /// Fire-and-forget send (teardown frames).  False when not connected.
    pub async fn send<T: serde::Serialize>(&self, payload: &T) -> bool {
        match serde_json::to_string(payload) {
            Ok(text) => self.inner.send_frame(Message::Text(text)).await,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound payload");
                false
            }
        }
    }

    // ── High-Level Operations ─────────────────────────────────────────────────

    /// Historical bars up to now, normalized into [`Candle`]s.  Uses the
    /// longer history timeout — these payloads are big.
    pub async fn historical_candles(
        &self,
        symbol: &str,
        granularity: u32,
        count: u32,
    ) -> Result<Vec<Candle>, ApiError> {
        info!(symbol, granularity, count, "🕯️ requesting historical candles");
        let payload = serde_json::to_value(TicksHistoryRequest::history(symbol, granularity, count))
            .map_err(|e| ApiError::Protocol(e.to_string()))?;

        let response = self.request(payload, self.inner.history_timeout_ms).await?;
        let candles = protocol::parse_candles_response(&response)?;
        info!(symbol, granularity, bars = candles.len(), "🕯️ history loaded");
        Ok(candles)
    }

    /// Live candle stream for (symbol, granularity).  An existing
    /// subscription on the same key is torn down first — at most one live
    /// stream per key.  Returns the server-assigned subscription id.
    pub async fn subscribe_candles(
        &self,
        symbol: &str,
        granularity: u32,
        sink: mpsc::UnboundedSender<LiveCandle>,
    ) -> Result<String, ApiError> {
        self.unsubscribe(symbol, granularity).await;

        let payload = serde_json::to_value(TicksHistoryRequest::subscription(symbol, granularity))
            .map_err(|e| ApiError::Protocol(e.to_string()))?;
        let response = self.request(payload, self.inner.request_timeout_ms).await?;

        let sub_id = protocol::subscription_id(&response)
            .ok_or_else(|| {
                ApiError::Protocol("subscribe response missing subscription id".to_string())
            })?
            .to_string();
        let req_id = response.get("req_id").and_then(Value::as_u64).unwrap_or(0);

        let key: SubKey = (symbol.to_string(), granularity);
        {
            let mut registry = self.inner.registry.lock().await;
            registry.by_sub_id.insert(sub_id.clone(), key.clone());
            registry.subscriptions.insert(
                key,
                Subscription {
                    sub_id: sub_id.clone(),
                    req_id,
                    sink,
                },
            );
        }

        info!(symbol, granularity, sub_id = %sub_id, "📡 subscribed to live candles");
        Ok(sub_id)
    }

    /// Tears down the subscription for one key.  No-op when absent.
    pub async fn unsubscribe(&self, symbol: &str, granularity: u32) {
        let key: SubKey = (symbol.to_string(), granularity);
        let removed = {
            let mut registry = self.inner.registry.lock().await;
            if let Some(subscription) = registry.subscriptions.remove(&key) {
                registry.by_sub_id.remove(&subscription.sub_id);
                Some(subscription.sub_id)
            } else {
                None
            }
        };

        if let Some(sub_id) = removed {
            self.send(&ForgetRequest { forget: sub_id.clone() }).await;
            info!(symbol, granularity, sub_id = %sub_id, "🛑 unsubscribed");
        }
    }

    /// Tears down every live subscription.
    pub async fn unsubscribe_all(&self) {
        let keys: Vec<SubKey> = {
            let registry = self.inner.registry.lock().await;
            registry.subscriptions.keys().cloned().collect()
        };
        for (symbol, granularity) in keys {
            self.unsubscribe(&symbol, granularity).await;
        }
    }

    /// Tradable instrument catalog (brief).
    pub async fn active_symbols(&self) -> Result<Vec<crate::models::ActiveSymbol>, ApiError> {
        let payload = serde_json::to_value(ActiveSymbolsRequest::default())
            .map_err(|e| ApiError::Protocol(e.to_string()))?;
        let mut response = self.request(payload, self.inner.request_timeout_ms).await?;

        let list = response
            .get_mut("active_symbols")
            .map(Value::take)
            .ok_or_else(|| ApiError::Protocol("no active_symbols in response".to_string()))?;
        serde_json::from_value(list).map_err(|e| ApiError::Protocol(e.to_string()))
    }

    /// Explicit shutdown: tears down subscriptions, rejects pendings, closes
    /// the socket.  Auto-reconnect stays off until the next `connect()`.
    pub async fn disconnect(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.unsubscribe_all().await;
        self.inner.fail_all_pending("disconnected").await;

        if let Some(tx) = self.inner.outbound.write().await.take() {
            let _ = tx.send(Message::Close(None));
        }
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            let _ = self.inner.events_tx.send(ClientEvent::Disconnected);
        }
        info!("🔌 client disconnected");
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
