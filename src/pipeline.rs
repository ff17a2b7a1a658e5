//! # pipeline
//!
//! **SignalPipeline** — the thin orchestrator wiring
//! ConnectionLayer → TimeframeStore → IndicatorEngine → DecisionEngine.
//!
//! ```text
//!  DerivClient ── LiveCandle ──▶ store.append(tf, candle)
//!                                     │
//!                                recompute (full window)
//!                                     │
//!                                engine::evaluate
//!                                     │
//!                           broadcast SignalUpdated ──▶ consumers
//! ```
//!
//! Updates arrive on one mpsc channel and are processed to completion —
//! store mutation, indicator recompute, rule evaluation, broadcast — before
//! the next one is handled; no two updates for the same timeframe ever run
//! concurrently.  Recomputation is deliberately full-window, not
//! incremental: correctness over cleverness.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::api::{ClientEvent, DerivClient, LiveCandle};
use crate::config::AppConfig;
use crate::engine;
use crate::error::ApiError;
use crate::events::PipelineEvent;
use crate::indicators::IndicatorEngine;
use crate::models::{Signal, Timeframe};
use crate::store::TimeframeStore;

pub struct SignalPipeline {
    client: DerivClient,
    indicators: IndicatorEngine,
    store: TimeframeStore,
    config: AppConfig,
    events_tx: broadcast::Sender<PipelineEvent>,
    current: Option<Signal>,
}

impl SignalPipeline {
    pub fn new(client: DerivClient, indicators: IndicatorEngine, config: AppConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            client,
            indicators,
            store: TimeframeStore::new(config.max_buffer_candles),
            config,
            events_tx,
            current: None,
        }
    }

    /// Consumer stream — the view layer reads this and nothing else.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events_tx.subscribe()
    }

    /// Latest computed signal, if any.
    pub fn current_signal(&self) -> Option<&Signal> {
        self.current.as_ref()
    }

    /// Fire an event to all consumers.  No receivers is not an error.
    fn broadcast(&self, event: PipelineEvent) {
        let _ = self.events_tx.send(event);
    }

    // ── Bootstrap ─────────────────────────────────────────────────────────────

    /// Loads historical candles for all three tiers concurrently, then
    /// computes and broadcasts the first signal.
    pub async fn bootstrap(&mut self) -> Result<(), ApiError> {
        info!(symbol = %self.config.symbol, "🔄 Loading all timeframes...");
        let symbol = self.config.symbol.clone();
        let count = self.config.candle_count;

        let (bars_m30, bars_m15, bars_m1) = tokio::try_join!(
            self.client
                .historical_candles(&symbol, Timeframe::M30.granularity(), count),
            self.client
                .historical_candles(&symbol, Timeframe::M15.granularity(), count),
            self.client
                .historical_candles(&symbol, Timeframe::M1.granularity(), count),
        )?;

        self.store.load(Timeframe::M30, bars_m30);
        self.store.load(Timeframe::M15, bars_m15);
        self.store.load(Timeframe::M1, bars_m1);

        if !self.store.all_loaded() {
            warn!("a timeframe came back empty — signal quality degraded");
        }

        let (n30, n15, n1) = (
            self.store.buffer(Timeframe::M30).len(),
            self.store.buffer(Timeframe::M15).len(),
            self.store.buffer(Timeframe::M1).len(),
        );
        info!(bars_30m = n30, bars_15m = n15, bars_1m = n1, "✅ All timeframes loaded");
        self.broadcast(PipelineEvent::TimeframesLoaded {
            symbol,
            bars_30m: n30,
            bars_15m: n15,
            bars_1m: n1,
        });

        self.recompute(None);
        Ok(())
    }

    // ── Live Loop ─────────────────────────────────────────────────────────────

    /// Subscribes all three tiers and processes pushes until the connection
    /// is terminally lost (reconnection exhausted) or the event stream ends.
    pub async fn run_live(&mut self) -> Result<(), ApiError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<LiveCandle>();
        self.subscribe_all(&tx).await?;
        let mut client_events = self.client.subscribe_events();
        info!("✅ Live analysis started");

        loop {
            tokio::select! {
                update = rx.recv() => match update {
                    Some(update) => self.handle_live_update(update),
                    None => return Ok(()),
                },

                event = client_events.recv() => match event {
                    Ok(ClientEvent::Connected) => {
                        self.broadcast(PipelineEvent::ConnectionChanged { connected: true });
                        // The connection layer rebuilt its registries empty;
                        // re-subscription (and gap refill) is our job.
                        info!("🔁 Reconnected — reloading history and re-subscribing");
                        if let Err(error) = self.bootstrap().await {
                            warn!(%error, "post-reconnect reload failed");
                            continue;
                        }
                        if let Err(error) = self.subscribe_all(&tx).await {
                            warn!(%error, "post-reconnect re-subscribe failed");
                        }
                    }
                    Ok(ClientEvent::Disconnected) => {
                        self.broadcast(PipelineEvent::ConnectionChanged { connected: false });
                    }
                    Ok(ClientEvent::ReconnectExhausted { attempts }) => {
                        self.broadcast(PipelineEvent::ReconnectExhausted { attempts });
                        return Err(ApiError::Transport(format!(
                            "reconnection exhausted after {attempts} attempts"
                        )));
                    }
                    Ok(ClientEvent::RemoteError { code, message }) => {
                        self.broadcast(PipelineEvent::ApiError { code, message });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    /// Tears down all live streams.  Idempotent.
    pub async fn stop_live(&self) {
        self.client.unsubscribe_all().await;
        info!("⏸️ Live analysis stopped");
    }

    async fn subscribe_all(&self, tx: &mpsc::UnboundedSender<LiveCandle>) -> Result<(), ApiError> {
        for timeframe in Timeframe::ALL {
            self.client
                .subscribe_candles(&self.config.symbol, timeframe.granularity(), tx.clone())
                .await?;
        }
        Ok(())
    }

    // ── Per-Push Processing ───────────────────────────────────────────────────

    /// One push, processed to completion: store update → recompute → emit.
    fn handle_live_update(&mut self, update: LiveCandle) {
        let Some(timeframe) = Timeframe::from_granularity(update.granularity) else {
            debug!(granularity = update.granularity, "update for unknown timeframe dropped");
            return;
        };

        debug!(
            symbol = %update.symbol,
            tf = timeframe.label(),
            time = update.candle.time,
            close = update.candle.close,
            "📈 live candle"
        );
        self.store.append(timeframe, update.candle);
        self.recompute(Some(timeframe));
    }

    /// Full recompute over the retained windows of all three tiers.
    fn recompute(&mut self, trigger: Option<Timeframe>) {
        let features = engine::extract_features(
            &self.store,
            &self.indicators,
            self.config.hma_short,
            self.config.hma_long,
        );
        let signal = engine::evaluate(&features);

        if signal.is_actionable() {
            info!(
                action = ?signal.action,
                confidence = signal.confidence,
                rule = signal.matched_rule,
                reason = %signal.reason,
                "🎯 Actionable signal"
            );
        }

        self.broadcast(PipelineEvent::SignalUpdated {
            trigger,
            signal: Box::new(signal.clone()),
        });
        self.current = Some(signal);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;

    fn make_config() -> AppConfig {
        AppConfig {
            app_id: "1089".to_string(),
            endpoint: "wss://example.invalid/websockets/v3".to_string(),
            symbol: "R_100".to_string(),
            candle_count: 500,
            max_buffer_candles: 2000,
            request_timeout_ms: 1_000,
            history_timeout_ms: 2_000,
            reconnect_base_ms: 10,
            max_reconnect_attempts: 2,
            hma_short: 20,
            hma_long: 50,
        }
    }

    fn make_candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close - 0.3,
            high: close + 0.6,
            low: close - 0.6,
            close,
            volume: 5.0,
        }
    }

    fn make_pipeline() -> SignalPipeline {
        let config = make_config();
        let client = DerivClient::new(&config);
        let mut pipeline = SignalPipeline::new(client, IndicatorEngine::new(), config);
        for timeframe in Timeframe::ALL {
            let step = timeframe.granularity() as i64;
            let candles: Vec<Candle> = (0..60)
                .map(|i| make_candle(i * step, 100.0 + (i % 7) as f64 * 0.2))
                .collect();
            pipeline.store.load(timeframe, candles);
        }
        pipeline
    }

    #[tokio::test]
    async fn test_live_update_appends_recomputes_and_broadcasts() {
        let mut pipeline = make_pipeline();
        let mut events = pipeline.subscribe_events();
        let before = pipeline.store.buffer(Timeframe::M1).len();

        pipeline.handle_live_update(LiveCandle {
            symbol: "R_100".to_string(),
            granularity: 60,
            candle: make_candle(60 * 60, 101.5),
        });

        assert_eq!(pipeline.store.buffer(Timeframe::M1).len(), before + 1);
        assert!(pipeline.current_signal().is_some());

        match events.try_recv().unwrap() {
            PipelineEvent::SignalUpdated { trigger, signal } => {
                assert_eq!(trigger, Some(Timeframe::M1));
                assert_eq!(signal.features.micro_tf.price, 101.5);
            }
            other => panic!("expected signal event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_progress_bar_updates_in_place() {
        let mut pipeline = make_pipeline();
        let before = pipeline.store.buffer(Timeframe::M15).len();
        let last_time = pipeline.store.buffer(Timeframe::M15).last().unwrap().time;

        pipeline.handle_live_update(LiveCandle {
            symbol: "R_100".to_string(),
            granularity: 900,
            candle: make_candle(last_time, 250.0),
        });

        let buffer = pipeline.store.buffer(Timeframe::M15);
        assert_eq!(buffer.len(), before);
        assert_eq!(buffer.last().unwrap().close, 250.0);
    }

    #[tokio::test]
    async fn test_unknown_granularity_is_dropped() {
        let mut pipeline = make_pipeline();
        let mut events = pipeline.subscribe_events();
        let before = pipeline.store.buffer(Timeframe::M1).len();

        pipeline.handle_live_update(LiveCandle {
            symbol: "R_100".to_string(),
            granularity: 300, // no tier uses 5M
            candle: make_candle(0, 1.0),
        });

        assert_eq!(pipeline.store.buffer(Timeframe::M1).len(), before);
        assert!(events.try_recv().is_err());
    }
}
