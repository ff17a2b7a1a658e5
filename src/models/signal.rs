//! # models::signal
//!
//! Output side of the analysis: per-timeframe [feature summaries](FeatureSet),
//! the display-only [`QuickDecision`] classification, and the final
//! [`Signal`] the pipeline broadcasts on every recompute.
//!
//! Signals are recomputed from scratch on each tick and never mutated after
//! construction.

use serde::Serialize;

// ─── Directional Vocabulary ───────────────────────────────────────────────────

/// Macro-tier trend direction (EMA50 vs EMA200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Uptrend,
    Downtrend,
}

/// Macro-tier momentum read (RSI vs 50).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Momentum {
    Bullish,
    Bearish,
}

/// What the decision table tells the consumer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Idle,
}

/// Setup family of an actionable signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Pullback,
    Reversal,
}

// ─── Feature Summaries (per tier) ─────────────────────────────────────────────

/// 30M tier — trend context.  Derived, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MacroSummary {
    pub trend: Trend,
    pub momentum: Momentum,
    /// Choppiness > 61.8 — ตลาด sideways ห้ามเทรด
    pub is_choppy: bool,
    /// |EMA50 − EMA200| / EMA200 × 100
    pub strength: f64,
    pub rsi: f64,
    pub choppiness: f64,
    pub price: f64,
    pub ema50: f64,
    pub ema200: f64,
}

/// 15M tier — structure / setup quality.
#[derive(Debug, Clone, Serialize)]
pub struct MidSummary {
    /// Price within ±1.0% of EMA21.
    pub is_pullback: bool,
    pub is_near_support: bool,
    pub is_near_resistance: bool,
    /// EMA21 — dynamic support.
    pub support_level: f64,
    /// Max high of the trailing 20 bars.
    pub resistance_level: f64,
    pub rsi: f64,
    /// (price − EMA21) / EMA21 × 100
    pub distance_from_ema21: f64,
    pub swing_high: f64,
    pub swing_low: f64,
    pub price: f64,
}

/// 1M tier — entry trigger: RSI memory, candle patterns, MACD.
#[derive(Debug, Clone, Serialize)]
pub struct MicroSummary {
    pub rsi: f64,
    pub prev_rsi: f64,

    // ── Candlestick patterns (last bar vs previous bar) ──────────────────────
    pub is_bullish_engulfing: bool,
    pub is_bearish_engulfing: bool,
    pub is_hammer: bool,
    pub is_shooting_star: bool,

    // ── RSI bounce flags ─────────────────────────────────────────────────────
    /// RSI rising while still low (< 40).
    pub is_rsi_bounce_up: bool,
    /// RSI falling while still high (> 60).
    pub is_rsi_bounce_down: bool,
    /// Crossed 30 upward this bar.
    pub is_rsi_bounce_up_30: bool,
    /// Crossed 70 downward this bar.
    pub is_rsi_bounce_down_70: bool,

    // ── MACD histogram sign ──────────────────────────────────────────────────
    pub is_macd_bullish: bool,
    pub is_macd_bearish: bool,

    // ── Hull MA pair (entry-timing context for consumers) ────────────────────
    pub hma_short: f64,
    pub hma_long: f64,

    pub price: f64,
}

impl MicroSummary {
    /// Any bullish confirmation pattern on the last bar.
    #[inline]
    pub fn has_bullish_pattern(&self) -> bool {
        self.is_bullish_engulfing || self.is_hammer
    }

    /// Any bearish confirmation pattern on the last bar.
    #[inline]
    pub fn has_bearish_pattern(&self) -> bool {
        self.is_bearish_engulfing || self.is_shooting_star
    }
}

/// The three tier summaries of one recompute, bundled for rule evaluation
/// and for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSet {
    pub macro_tf: MacroSummary,
    pub mid_tf: MidSummary,
    pub micro_tf: MicroSummary,
}

// ─── Quick Decision (display only) ────────────────────────────────────────────

/// Classification from the coarse quick-reference table.  Shown to the user
/// for an at-a-glance read; never feeds the actionable decision.
#[derive(Debug, Clone, Serialize)]
pub struct QuickDecision {
    pub action: SignalAction,
    /// Risk tier glyphs straight from the reference card (⭐/💀/🔥/-).
    pub risk: &'static str,
    pub condition: &'static str,
}

// ─── Trade Levels ─────────────────────────────────────────────────────────────

/// Entry / exit geometry of an actionable signal.  Risk:reward is fixed 1:2
/// by construction — take-profit is derived from twice the stop distance.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk: f64,
    pub reward: f64,
    pub risk_reward: f64,
}

impl TradeLevels {
    /// BUY geometry: stop below entry, target = entry + 2 × risk.
    pub fn long(entry: f64, stop_loss: f64) -> Self {
        let risk = entry - stop_loss;
        let take_profit = entry + risk * 2.0;
        Self {
            entry,
            stop_loss,
            take_profit,
            risk,
            reward: take_profit - entry,
            risk_reward: 2.0,
        }
    }

    /// SELL geometry: stop above entry, target = entry − 2 × risk.
    pub fn short(entry: f64, stop_loss: f64) -> Self {
        let risk = stop_loss - entry;
        let take_profit = entry - risk * 2.0;
        Self {
            entry,
            stop_loss,
            take_profit,
            risk,
            reward: entry - take_profit,
            risk_reward: 2.0,
        }
    }
}

// ─── Signal ───────────────────────────────────────────────────────────────────

/// The complete decision output of one pipeline tick.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub action: SignalAction,

    /// Setup family — `None` when idle.
    pub kind: Option<SignalKind>,

    /// 0–100.  90 = pullback with pattern, 75 = pullback without,
    /// 65 = reversal, 0 = idle.
    pub confidence: u8,

    /// Entry/stop/target geometry — `None` when idle.
    pub levels: Option<TradeLevels>,

    /// Human-readable rationale (or why the engine stayed idle).
    pub reason: String,

    /// Name of the decision rule that fired.
    pub matched_rule: &'static str,

    /// Independent coarse classification for display.
    pub quick: QuickDecision,

    /// The three tier summaries this decision was derived from.
    pub features: FeatureSet,

    /// When this signal was computed.
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl Signal {
    #[inline]
    pub fn is_actionable(&self) -> bool {
        self.action != SignalAction::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_levels_fix_risk_reward_1_to_2() {
        let levels = TradeLevels::long(100.0, 98.0);
        assert!((levels.risk - 2.0).abs() < 1e-12);
        assert!((levels.reward - 4.0).abs() < 1e-12);
        assert!((levels.take_profit - 104.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_levels_fix_risk_reward_1_to_2() {
        let levels = TradeLevels::short(100.0, 101.5);
        assert!((levels.risk - 1.5).abs() < 1e-12);
        assert!((levels.reward - 3.0).abs() < 1e-12);
        assert!((levels.take_profit - 97.0).abs() < 1e-12);
    }
}
