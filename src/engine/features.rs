//! # engine::features
//!
//! Per-tier feature extraction — pure over a store snapshot plus indicator
//! outputs.
//!
//! ## สามชั้นการวิเคราะห์
//! - **30M (Macro)** — ทิศทางเทรนด์: EMA50 vs EMA200, RSI momentum, Choppiness
//! - **15M (Mid)**   — โครงสร้าง: Pullback รอบ EMA21, Swing High/Low 20 แท่ง
//! - **1M (Micro)**  — จังหวะเข้า: RSI bounce, Candlestick Pattern, MACD

use crate::indicators::{self, IndicatorEngine};
use crate::models::{
    Candle, FeatureSet, MacroSummary, MicroSummary, MidSummary, Momentum, Timeframe, Trend,
};
use crate::store::{TimeframeBuffer, TimeframeStore};

/// Choppiness above this reads as a range-bound market (golden-ratio level).
pub const CHOPPY_THRESHOLD: f64 = 61.8;

/// Bars considered for the mid-tier swing high/low.
const SWING_LOOKBACK: usize = 20;

/// Extracts all three tier summaries from the current store snapshot.
pub fn extract_features(
    store: &TimeframeStore,
    indicators: &IndicatorEngine,
    hma_short: usize,
    hma_long: usize,
) -> FeatureSet {
    FeatureSet {
        macro_tf: analyze_macro(store.buffer(Timeframe::M30), indicators),
        mid_tf: analyze_mid(store.buffer(Timeframe::M15), indicators),
        micro_tf: analyze_micro(store.buffer(Timeframe::M1), indicators, hma_short, hma_long),
    }
}

// ─── Macro Tier (30M) ─────────────────────────────────────────────────────────

/// Trend direction, momentum and choppiness from the macro timeframe.
pub fn analyze_macro(buffer: &TimeframeBuffer, indicators: &IndicatorEngine) -> MacroSummary {
    let ema50 = indicators::ema(&buffer.closes, 50);
    let ema200 = indicators::ema(&buffer.closes, 200);
    let rsi = indicators.rsi(&buffer.closes, 14);
    let choppiness = indicators.choppiness(&buffer.highs, &buffer.lows, &buffer.closes, 14);

    let price = buffer.closes.last().copied().unwrap_or(0.0);
    let last_ema50 = ema50.last().copied().unwrap_or(price);
    let last_ema200 = ema200.last().copied().unwrap_or(last_ema50);
    let last_rsi = rsi.last().copied().unwrap_or(50.0);
    let last_choppiness = choppiness.last().copied().unwrap_or(50.0);

    let strength = if last_ema200 != 0.0 {
        (last_ema50 - last_ema200).abs() / last_ema200 * 100.0
    } else {
        0.0
    };

    MacroSummary {
        trend: if last_ema50 > last_ema200 {
            Trend::Uptrend
        } else {
            Trend::Downtrend
        },
        momentum: if last_rsi > 50.0 {
            Momentum::Bullish
        } else {
            Momentum::Bearish
        },
        is_choppy: last_choppiness > CHOPPY_THRESHOLD,
        strength,
        rsi: last_rsi,
        choppiness: last_choppiness,
        price,
        ema50: last_ema50,
        ema200: last_ema200,
    }
}

// ─── Mid Tier (15M) ───────────────────────────────────────────────────────────

/// Structure quality: pullback distance to EMA21 and the recent swing range.
pub fn analyze_mid(buffer: &TimeframeBuffer, indicators: &IndicatorEngine) -> MidSummary {
    let ema21 = indicators::ema(&buffer.closes, 21);
    let rsi = indicators.rsi(&buffer.closes, 14);

    let price = buffer.closes.last().copied().unwrap_or(0.0);
    let last_ema21 = ema21.last().copied().unwrap_or(price);
    let last_rsi = rsi.last().copied().unwrap_or(50.0);

    let distance_from_ema21 = if last_ema21 != 0.0 {
        (price - last_ema21) / last_ema21 * 100.0
    } else {
        0.0
    };

    let tail = buffer.len().saturating_sub(SWING_LOOKBACK);
    let swing_high = buffer.highs[tail..]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let swing_low = buffer.lows[tail..].iter().copied().fold(f64::INFINITY, f64::min);
    let swing_high = if swing_high.is_finite() { swing_high } else { price };
    let swing_low = if swing_low.is_finite() { swing_low } else { price };

    MidSummary {
        is_pullback: distance_from_ema21.abs() < 1.0,
        is_near_support: price < last_ema21 && distance_from_ema21.abs() < 0.5,
        is_near_resistance: price > last_ema21 && distance_from_ema21.abs() < 0.5,
        support_level: last_ema21,
        resistance_level: swing_high,
        rsi: last_rsi,
        distance_from_ema21,
        swing_high,
        swing_low,
        price,
    }
}

// ─── Micro Tier (1M) ──────────────────────────────────────────────────────────

/// Entry trigger: RSI memory with bounce flags, candlestick patterns on the
/// last two bars, and the MACD histogram sign.  Total over a one-bar buffer
/// (pattern flags false, previous RSI neutral).
pub fn analyze_micro(
    buffer: &TimeframeBuffer,
    indicators: &IndicatorEngine,
    hma_short: usize,
    hma_long: usize,
) -> MicroSummary {
    let rsi = indicators.rsi(&buffer.closes, 14);
    let macd = indicators::macd(&buffer.closes, 12, 26, 9);
    let hma_short_line = indicators::hma(&buffer.closes, hma_short);
    let hma_long_line = indicators::hma(&buffer.closes, hma_long);

    let price = buffer.closes.last().copied().unwrap_or(0.0);
    let last_rsi = rsi.last().copied().unwrap_or(50.0);
    let prev_rsi = rsi
        .len()
        .checked_sub(2)
        .and_then(|i| rsi.get(i))
        .copied()
        .unwrap_or(50.0);

    let last = buffer.candles.last();
    let prev = buffer.len().checked_sub(2).and_then(|i| buffer.candles.get(i));

    let (bullish_engulfing, bearish_engulfing) = match (prev, last) {
        (Some(prev), Some(last)) => (
            is_bullish_engulfing(prev, last),
            is_bearish_engulfing(prev, last),
        ),
        _ => (false, false),
    };
    let (hammer, shooting_star) = match last {
        Some(last) => (is_hammer(last), is_shooting_star(last)),
        None => (false, false),
    };

    let macd_histogram = macd.histogram.last().copied().unwrap_or(0.0);

    MicroSummary {
        rsi: last_rsi,
        prev_rsi,
        is_bullish_engulfing: bullish_engulfing,
        is_bearish_engulfing: bearish_engulfing,
        is_hammer: hammer,
        is_shooting_star: shooting_star,
        is_rsi_bounce_up: last_rsi > prev_rsi && last_rsi < 40.0,
        is_rsi_bounce_down: last_rsi < prev_rsi && last_rsi > 60.0,
        is_rsi_bounce_up_30: prev_rsi < 30.0 && last_rsi > 30.0,
        is_rsi_bounce_down_70: prev_rsi > 70.0 && last_rsi < 70.0,
        is_macd_bullish: macd_histogram > 0.0,
        is_macd_bearish: macd_histogram < 0.0,
        hma_short: hma_short_line.last().copied().unwrap_or(price),
        hma_long: hma_long_line.last().copied().unwrap_or(price),
        price,
    }
}

// ─── Candlestick Patterns ─────────────────────────────────────────────────────

/// Body reversal with full overlap: red bar swallowed by a green bar.
fn is_bullish_engulfing(prev: &Candle, last: &Candle) -> bool {
    prev.close < prev.open
        && last.close > last.open
        && last.close > prev.open
        && last.open < prev.close
}

/// Green bar swallowed by a red bar.
fn is_bearish_engulfing(prev: &Candle, last: &Candle) -> bool {
    prev.close > prev.open
        && last.close < last.open
        && last.close < prev.open
        && last.open > prev.close
}

/// Lower wick more than twice the body, upper wick smaller than the body.
fn is_hammer(candle: &Candle) -> bool {
    let body = (candle.close - candle.open).abs();
    let lower_wick = candle.close.min(candle.open) - candle.low;
    let upper_wick = candle.high - candle.close.max(candle.open);
    body > 0.0 && lower_wick > 2.0 * body && upper_wick < body
}

/// Upper wick more than twice the body, lower wick smaller than the body.
fn is_shooting_star(candle: &Candle) -> bool {
    let body = (candle.close - candle.open).abs();
    let lower_wick = candle.close.min(candle.open) - candle.low;
    let upper_wick = candle.high - candle.close.max(candle.open);
    body > 0.0 && upper_wick > 2.0 * body && lower_wick < body
}

// ─── Tests ────────────────────────────────────────────────────────────────────
