//! # Triframe — Multi-Timeframe Trade Signal Engine
//!
//! ```text
//!  ┌────────────┐  wss://…/websockets/v3   ┌──────────────────────────────┐
//!  │ Deriv API  │ ◀──────────────────────▶ │ DerivClient                  │
//!  └────────────┘   req_id correlation     │ ├─ pending requests          │
//!                    + push subscriptions  │ └─ subscriptions (30M/15M/1M)│
//!                                          └──────────────┬───────────────┘
//!                                                         │ LiveCandle
//!  ┌────────────┐   broadcast events       ┌──────────────▼───────────────┐
//!  │  Consumer  │ ◀──────────────────────── │ SignalPipeline               │
//!  │ (display)  │   SIGNAL_UPDATED …        │ store → indicators → rules   │
//!  └────────────┘                           └──────────────────────────────┘
//! ```

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod engine;
mod error;
mod events;
mod indicators;
mod models;
mod pipeline;
mod store;

use std::sync::Arc;

use api::DerivClient;
use config::AppConfig;
use events::PipelineEvent;
use indicators::{IndicatorEngine, RayonReducer};
use models::SignalAction;
use pipeline::SignalPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("triframe=debug".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║        TRIFRAME — Multi-Timeframe Signal Engine       ║
  ║        30M Trend · 15M Structure · 1M Entry           ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config & components ────────────────────────────────────────────────
    let config = AppConfig::from_env();
    let indicators = IndicatorEngine::with_accelerator(Arc::new(RayonReducer));
    info!(
        symbol = %config.symbol,
        backend = indicators.backend(),
        "engine configured"
    );

    // ── 4. Connect (no auto-retry on the initial attempt) ────────────────────
    let client = DerivClient::new(&config);
    client.connect().await?;

    // ── 5. Instrument catalog sanity check ────────────────────────────────────
    match client.active_symbols().await {
        Ok(catalog) => {
            info!(instruments = catalog.len(), "📋 symbol catalog loaded");
            if !catalog.iter().any(|s| s.symbol == config.symbol) {
                warn!(symbol = %config.symbol, "configured symbol not in catalog");
            }
        }
        Err(error) => warn!(%error, "symbol catalog unavailable — continuing"),
    }

    // ── 6. Pipeline bootstrap ─────────────────────────────────────────────────
    let mut pipeline = SignalPipeline::new(client.clone(), indicators, config);
    let events = pipeline.subscribe_events();
    tokio::spawn(consume_events(events));

    pipeline.bootstrap().await?;
    if let Some(signal) = pipeline.current_signal() {
        info!(
            action = ?signal.action,
            confidence = signal.confidence,
            rule = signal.matched_rule,
            "initial signal computed"
        );
    }

    // ── 7. Live loop until ctrl-c or terminal connection loss ─────────────────
    tokio::select! {
        result = pipeline.run_live() => {
            if let Err(err) = result {
                error!(error = %err, "live loop terminated");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received — shutting down");
        }
    }

    // ── 8. Clean teardown ─────────────────────────────────────────────────────
    pipeline.stop_live().await;
    info!(status = ?client.status().await, "final connection status");
    client.disconnect().await;

    Ok(())
}

/// Stand-in for the external view layer: renders every pipeline event to the
/// log.  Strictly a consumer — nothing here feeds back into decision state.
async fn consume_events(mut events: tokio::sync::broadcast::Receiver<PipelineEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event consumer lagged");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        // Wire-format trace for frontend debugging.
        tracing::debug!(payload = %event.to_json(), "pipeline event");

        match event {
            PipelineEvent::SignalUpdated { signal, .. } => match signal.action {
                SignalAction::Idle => {
                    info!(
                        quick = signal.quick.condition,
                        reason = %signal.reason,
                        "⏸️ IDLE"
                    );
                }
                action => {
                    let levels = signal.levels.as_ref();
                    info!(
                        action = ?action,
                        kind = ?signal.kind,
                        confidence = signal.confidence,
                        entry = levels.map(|l| l.entry),
                        stop_loss = levels.map(|l| l.stop_loss),
                        take_profit = levels.map(|l| l.take_profit),
                        quick = signal.quick.condition,
                        reason = %signal.reason,
                        "🚨 SIGNAL"
                    );
                }
            },
            PipelineEvent::TimeframesLoaded { symbol, bars_30m, bars_15m, bars_1m } => {
                info!(%symbol, bars_30m, bars_15m, bars_1m, "timeframes ready");
            }
            PipelineEvent::ConnectionChanged { connected } => {
                info!(connected, "connection state changed");
            }
            PipelineEvent::ReconnectExhausted { attempts } => {
                error!(attempts, "connection terminally lost");
            }
            PipelineEvent::ApiError { code, message } => {
                warn!(%code, %message, "uncorrelated server error");
            }
        }
    }
}
