//! # indicators
//!
//! Deterministic indicator math over price sequences.
//!
//! Every function returns a sequence the same length as its input — entries
//! before a window is full use a documented fallback value (never a gap):
//!
//! | Indicator  | Warm-up fallback                  |
//! |------------|-----------------------------------|
//! | EMA        | seeded from the first value       |
//! | WMA / HMA  | echoes the raw input value        |
//! | RSI        | 50 (neutral)                      |
//! | Choppiness | 50 (also when high-low range = 0) |
//!
//! RSI uses a plain trailing-window mean of gains/losses, not Wilder's
//! exponential smoothing — the rule thresholds downstream are tuned against
//! this variant, so it must stay.
//!
//! Trailing-window indicators (RSI, true range → Choppiness) may be handed to
//! a [`BulkReducer`] accelerator; see [`IndicatorEngine`].

use std::sync::Arc;

use tracing::debug;

pub mod accel;

pub use accel::{AccelError, BulkReducer, RayonReducer};

// ─── Sequential Reference Functions ───────────────────────────────────────────

/// Exponential moving average.  Seed = first value, k = 2 / (period + 1).
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    out.push(values[0]);
    for i in 1..values.len() {
        let prev = out[i - 1];
        out.push(prev + (values[i] - prev) * k);
    }
    out
}

/// Linearly-weighted moving average, weights 1..=period (newest heaviest).
/// Entries before the window fills echo the raw input value.
pub fn wma(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period <= 1 {
        return values.to_vec();
    }
    let weight_sum = (period * (period + 1) / 2) as f64;
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i + 1 < period {
            out.push(values[i]);
            continue;
        }
        let mut sum = 0.0;
        for j in 0..period {
            // j = 0 is the newest value and carries the largest weight.
            sum += values[i - j] * (period - j) as f64;
        }
        out.push(sum / weight_sum);
    }
    out
}

/// Hull moving average:
/// `WMA(2·WMA(seq, period/2) − WMA(seq, period), floor(sqrt(period)))`.
pub fn hma(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let half = period / 2;
    let sqrt_period = (period as f64).sqrt().floor() as usize;

    let wma_half = wma(values, half);
    let wma_full = wma(values, period);
    let diff: Vec<f64> = wma_half
        .iter()
        .zip(&wma_full)
        .map(|(h, f)| 2.0 * h - f)
        .collect();

    wma(&diff, sqrt_period)
}

/// Trailing-window RSI, sequential reference path.
pub fn rsi_sequential(closes: &[f64], period: usize) -> Vec<f64> {
    if closes.is_empty() {
        return Vec::new();
    }
    let changes: Vec<f64> = std::iter::once(0.0)
        .chain(closes.windows(2).map(|w| w[1] - w[0]))
        .collect();

    let mut out = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        if i < period {
            out.push(50.0);
            continue;
        }
        let mut gains = 0.0;
        let mut losses = 0.0;
        for j in 0..period {
            let change = changes[i - j];
            if change > 0.0 {
                gains += change;
            } else {
                losses -= change;
            }
        }
        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;
        if avg_loss == 0.0 {
            out.push(100.0);
        } else {
            out.push(100.0 - 100.0 / (1.0 + avg_gain / avg_loss));
        }
    }
    out
}

/// Per-index true range, sequential reference path.
/// Index 0 = high − low; otherwise max(H−L, |H−prevC|, |L−prevC|).
pub fn true_ranges_sequential(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(highs.len());
    for i in 0..highs.len() {
        if i == 0 {
            out.push(highs[0] - lows[0]);
            continue;
        }
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        out.push(hl.max(hc).max(lc));
    }
    out
}

// ─── MACD ─────────────────────────────────────────────────────────────────────

/// MACD output bundle — all three series are input-length.
#[derive(Debug, Clone)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD = EMA(fast) − EMA(slow); signal = EMA(macd, signal_period).
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&macd_line, signal_period);
    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    Macd {
        macd: macd_line,
        signal: signal_line,
        histogram,
    }
}

// ─── IndicatorEngine ──────────────────────────────────────────────────────────

/// Stateless indicator front-end holding the optional accelerator capability.
///
/// RSI and Choppiness delegate their trailing-window arithmetic to the
/// accelerator opportunistically; any failure falls back to the sequential
/// formulas above without changing results.
#[derive(Clone, Default)]
pub struct IndicatorEngine {
    accelerator: Option<Arc<dyn BulkReducer>>,
}

impl IndicatorEngine {
    /// Engine without acceleration — pure sequential reference path.
    pub fn new() -> Self {
        Self { accelerator: None }
    }

    pub fn with_accelerator(accelerator: Arc<dyn BulkReducer>) -> Self {
        Self {
            accelerator: Some(accelerator),
        }
    }

    /// Backend description for the status line.
    pub fn backend(&self) -> &'static str {
        self.accelerator.as_ref().map(|a| a.label()).unwrap_or("sequential")
    }

    /// RSI — accelerator if present, sequential otherwise.
    pub fn rsi(&self, closes: &[f64], period: usize) -> Vec<f64> {
        if let Some(accelerator) = &self.accelerator {
            match accelerator.rsi(closes, period) {
                Ok(values) => return values,
                Err(error) => {
                    debug!(%error, "RSI accelerator failed — sequential fallback");
                }
            }
        }
        rsi_sequential(closes, period)
    }

    /// Choppiness Index over `period` trailing true ranges:
    /// `100 · log10(ΣTR / (maxHigh − minLow)) / log10(period)`.
    /// 50 before the window fills or when the high-low range is zero.
    pub fn choppiness(
        &self,
        highs: &[f64],
        lows: &[f64],
        closes: &[f64],
        period: usize,
    ) -> Vec<f64> {
        if highs.is_empty() {
            return Vec::new();
        }

        let true_ranges = match &self.accelerator {
            Some(accelerator) => match accelerator.true_ranges(highs, lows, closes) {
                Ok(values) => values,
                Err(error) => {
                    debug!(%error, "true-range accelerator failed — sequential fallback");
                    true_ranges_sequential(highs, lows, closes)
                }
            },
            None => true_ranges_sequential(highs, lows, closes),
        };

        let log_period = (period as f64).log10();
        let mut out = Vec::with_capacity(highs.len());
        for i in 0..highs.len() {
            if i < period {
                out.push(50.0);
                continue;
            }
            let mut sum_tr = 0.0;
            let mut max_high = highs[i];
            let mut min_low = lows[i];
            for j in 0..period {
                let idx = i - j;
                sum_tr += true_ranges[idx];
                if highs[idx] > max_high {
                    max_high = highs[idx];
                }
                if lows[idx] < min_low {
                    min_low = lows[idx];
                }
            }
            let range = max_high - min_low;
            if range == 0.0 {
                out.push(50.0);
            } else {
                out.push((sum_tr / range).log10() / log_period * 100.0);
            }
        }
        out
    }
}

impl std::fmt::Debug for IndicatorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorEngine")
            .field("backend", &self.backend())
            .finish()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_ema_recurrence_period_2() {
        // k = 2/3: 10 → 10 + (20−10)·2/3 → 16.67 + (30−16.67)·2/3
        let out = ema(&[10.0, 20.0, 30.0], 2);
        assert_eq!(out.len(), 3);
        assert_close(out[0], 10.0, 1e-12);
        assert_close(out[1], 16.6667, 0.01);
        assert_close(out[2], 25.5556, 0.01);
    }

    #[test]
    fn test_ema_empty_input() {
        assert!(ema(&[], 14).is_empty());
    }

    #[test]
    fn test_wma_echoes_before_window_fills() {
        let out = wma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 2.0);
        // (2·1 + 3·2 + 4·3) / 6 with newest-heaviest weights
        assert_close(out[2], (1.0 * 1.0 + 2.0 * 2.0 + 3.0 * 3.0) / 6.0, 1e-12);
        assert_close(out[3], (2.0 * 1.0 + 3.0 * 2.0 + 4.0 * 3.0) / 6.0, 1e-12);
    }

    #[test]
    fn test_hma_same_length_as_input() {
        let values: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64) * 0.3).collect();
        let out = hma(&values, 20);
        assert_eq!(out.len(), values.len());
        // On a straight ramp the HMA must sit near the input.
        assert_close(out[59], values[59], 1.0);
    }

    #[test]
    fn test_rsi_bounded_0_100() {
        let values: Vec<f64> = (0..200)
            .map(|i| 100.0 + ((i as f64) * 0.7).sin() * 5.0)
            .collect();
        for value in rsi_sequential(&values, 14) {
            assert!((0.0..=100.0).contains(&value), "RSI out of range: {value}");
        }
    }

    #[test]
    fn test_rsi_neutral_before_window_and_100_on_pure_gains() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi_sequential(&values, 14);
        assert_eq!(out[13], 50.0);
        assert_eq!(out[29], 100.0);
    }

    #[test]
    fn test_choppiness_bounded_with_neutral_fallback() {
        let engine = IndicatorEngine::new();
        let highs: Vec<f64> = (0..100).map(|i| 101.0 + ((i as f64) * 0.5).cos()).collect();
        let lows: Vec<f64> = highs.iter().map(|h| h - 2.0).collect();
        let closes: Vec<f64> = highs.iter().map(|h| h - 1.0).collect();

        let out = engine.choppiness(&highs, &lows, &closes, 14);
        assert_eq!(out.len(), 100);
        assert_eq!(out[13], 50.0);
        for value in out {
            assert!((0.0..=100.0).contains(&value), "Choppiness out of range: {value}");
        }
    }

    #[test]
    fn test_choppiness_zero_range_is_neutral() {
        let engine = IndicatorEngine::new();
        let flat = vec![100.0; 40];
        let out = engine.choppiness(&flat, &flat, &flat, 14);
        assert!(out.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_macd_histogram_is_macd_minus_signal() {
        let values: Vec<f64> = (0..80).map(|i| 100.0 + ((i as f64) * 0.2).sin()).collect();
        let out = macd(&values, 12, 26, 9);
        assert_eq!(out.macd.len(), values.len());
        assert_eq!(out.signal.len(), values.len());
        for i in 0..values.len() {
            assert_close(out.histogram[i], out.macd[i] - out.signal[i], 1e-12);
        }
    }

    #[test]
    fn test_accelerator_matches_sequential_rsi() {
        let values: Vec<f64> = (0..300)
            .map(|i| 250.0 + ((i as f64) * 0.31).sin() * 12.0 + (i % 7) as f64)
            .collect();
        let engine = IndicatorEngine::with_accelerator(Arc::new(RayonReducer));
        assert_eq!(engine.rsi(&values, 14), rsi_sequential(&values, 14));
    }

    #[test]
    fn test_accelerator_matches_sequential_choppiness() {
        let highs: Vec<f64> = (0..300).map(|i| 105.0 + ((i as f64) * 0.13).sin() * 4.0).collect();
        let lows: Vec<f64> = highs.iter().map(|h| h - 3.0).collect();
        let closes: Vec<f64> = highs.iter().map(|h| h - 1.2).collect();

        let sequential = IndicatorEngine::new().choppiness(&highs, &lows, &closes, 14);
        let accelerated = IndicatorEngine::with_accelerator(Arc::new(RayonReducer))
            .choppiness(&highs, &lows, &closes, 14);
        assert_eq!(sequential, accelerated);
    }

    // A reducer that always fails — the engine must silently fall back.
    struct BrokenReducer;

    impl BulkReducer for BrokenReducer {
        fn label(&self) -> &'static str {
            "broken"
        }
        fn rsi(&self, _: &[f64], _: usize) -> Result<Vec<f64>, AccelError> {
            Err(AccelError("kernel unavailable".into()))
        }
        fn true_ranges(&self, _: &[f64], _: &[f64], _: &[f64]) -> Result<Vec<f64>, AccelError> {
            Err(AccelError("kernel unavailable".into()))
        }
    }

    #[test]
    fn test_broken_accelerator_falls_back_silently() {
        let values: Vec<f64> = (0..50).map(|i| 10.0 + (i % 5) as f64).collect();
        let engine = IndicatorEngine::with_accelerator(Arc::new(BrokenReducer));
        assert_eq!(engine.rsi(&values, 14), rsi_sequential(&values, 14));

        let out = engine.choppiness(&values, &values, &values, 14);
        assert_eq!(out.len(), values.len());
    }
}
