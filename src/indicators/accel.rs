//! # indicators::accel
//!
//! **Bulk trailing-window reducer** — optional accelerator capability for the
//! indicator engine.
//!
//! Recursive indicators (EMA, MACD) stay sequential: each value depends on
//! the previous one.  Trailing-window indicators (RSI, true range) are
//! embarrassingly parallel per index, so the engine probes this capability
//! and falls back to the sequential reference formulas when it is absent or
//! fails.  Both paths compute the identical per-index formula; outputs are
//! bit-equal.

use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("accelerator failure: {0}")]
pub struct AccelError(pub String);

/// Capability interface the [`IndicatorEngine`](super::IndicatorEngine)
/// probes for.  Implementations must reproduce the sequential formulas
/// exactly — an accelerator is a speedup, never a semantic change.
pub trait BulkReducer: Send + Sync {
    /// Human-readable backend name for the status line.
    fn label(&self) -> &'static str;

    /// RSI over `closes` with a plain trailing-window mean of gains/losses.
    fn rsi(&self, closes: &[f64], period: usize) -> Result<Vec<f64>, AccelError>;

    /// Per-index true range from highs/lows/closes.
    fn true_ranges(
        &self,
        highs: &[f64],
        lows: &[f64],
        closes: &[f64],
    ) -> Result<Vec<f64>, AccelError>;
}

// ─── Rayon Implementation ─────────────────────────────────────────────────────

/// Data-parallel reducer over the rayon thread pool.  One logical kernel per
/// output index, mirroring the reference loops in `indicators`.
#[derive(Debug, Default)]
pub struct RayonReducer;

impl BulkReducer for RayonReducer {
    fn label(&self) -> &'static str {
        "rayon"
    }

    fn rsi(&self, closes: &[f64], period: usize) -> Result<Vec<f64>, AccelError> {
        if closes.is_empty() {
            return Ok(Vec::new());
        }

        // Price changes are a cheap sequential pre-pass (changes[0] = 0).
        let changes: Vec<f64> = std::iter::once(0.0)
            .chain(closes.windows(2).map(|w| w[1] - w[0]))
            .collect();

        Ok((0..closes.len())
            .into_par_iter()
            .map(|i| {
                if i < period {
                    return 50.0;
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
                    100.0
                } else {
                    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
                }
            })
            .collect())
    }

    fn true_ranges(
        &self,
        highs: &[f64],
        lows: &[f64],
        closes: &[f64],
    ) -> Result<Vec<f64>, AccelError> {
        if highs.len() != lows.len() || highs.len() != closes.len() {
            return Err(AccelError(format!(
                "misaligned inputs: {} highs / {} lows / {} closes",
                highs.len(),
                lows.len(),
                closes.len()
            )));
        }

        Ok((0..highs.len())
            .into_par_iter()
            .map(|i| {
                if i == 0 {
                    return highs[0] - lows[0];
                }
                let hl = highs[i] - lows[i];
                let hc = (highs[i] - closes[i - 1]).abs();
                let lc = (lows[i] - closes[i - 1]).abs();
                hl.max(hc).max(lc)
            })
            .collect())
    }
}
