//! # store
//!
//! **TimeframeStore** — bounded rolling buffers of parsed candles, one per
//! analysis tier, with the derived price arrays the indicator engine reads.
//!
//! ```text
//! append(tf, candle)
//!     │
//!     ├─ last.time == candle.time → update in place (bar still open)
//!     ├─ otherwise               → push to every array
//!     └─ len > max               → evict front across every array (FIFO)
//! ```
//!
//! Invariant: the five parallel arrays are always the same length as the
//! candle sequence and index-aligned with it.

use std::collections::HashMap;

use crate::models::{Candle, Timeframe};

// ─── TimeframeBuffer ──────────────────────────────────────────────────────────

/// One tier's candles plus index-aligned derived arrays.
#[derive(Debug, Clone)]
pub struct TimeframeBuffer {
    pub candles: Vec<Candle>,
    pub closes: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub opens: Vec<f64>,
    pub volumes: Vec<f64>,
    max_len: usize,
}

impl TimeframeBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            candles: Vec::new(),
            closes: Vec::new(),
            highs: Vec::new(),
            lows: Vec::new(),
            opens: Vec::new(),
            volumes: Vec::new(),
            max_len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Wholesale replacement with a time-ordered series (historical bootstrap).
    pub fn load(&mut self, mut candles: Vec<Candle>) {
        candles.sort_unstable_by_key(|c| c.time);
        if candles.len() > self.max_len {
            candles.drain(..candles.len() - self.max_len);
        }

        self.closes = candles.iter().map(|c| c.close).collect();
        self.highs = candles.iter().map(|c| c.high).collect();
        self.lows = candles.iter().map(|c| c.low).collect();
        self.opens = candles.iter().map(|c| c.open).collect();
        self.volumes = candles.iter().map(|c| c.volume).collect();
        self.candles = candles;
    }

    /// Merge-latest append.  A candle with the last bar's `time` replaces the
    /// in-progress bar; a newer `time` appends; overflow evicts the oldest.
    pub fn append(&mut self, candle: Candle) {
        if let Some(last) = self.candles.last_mut() {
            if last.time == candle.time {
                *last = candle;
                let tail = self.closes.len() - 1;
                self.closes[tail] = candle.close;
                self.highs[tail] = candle.high;
                self.lows[tail] = candle.low;
                self.opens[tail] = candle.open;
                self.volumes[tail] = candle.volume;
                return;
            }
        }

        self.candles.push(candle);
        self.closes.push(candle.close);
        self.highs.push(candle.high);
        self.lows.push(candle.low);
        self.opens.push(candle.open);
        self.volumes.push(candle.volume);

        if self.candles.len() > self.max_len {
            self.candles.remove(0);
            self.closes.remove(0);
            self.highs.remove(0);
            self.lows.remove(0);
            self.opens.remove(0);
            self.volumes.remove(0);
        }
    }

    /// Debug-time check of the alignment invariant.
    #[cfg(test)]
    fn assert_aligned(&self) {
        let n = self.candles.len();
        assert_eq!(self.closes.len(), n);
        assert_eq!(self.highs.len(), n);
        assert_eq!(self.lows.len(), n);
        assert_eq!(self.opens.len(), n);
        assert_eq!(self.volumes.len(), n);
    }
}

// ─── TimeframeStore ───────────────────────────────────────────────────────────

/// All three tier buffers.
#[derive(Debug, Clone)]
pub struct TimeframeStore {
    buffers: HashMap<Timeframe, TimeframeBuffer>,
}

impl TimeframeStore {
    pub fn new(max_len: usize) -> Self {
        let buffers = Timeframe::ALL
            .into_iter()
            .map(|tf| (tf, TimeframeBuffer::new(max_len)))
            .collect();
        Self { buffers }
    }

    #[inline]
    pub fn buffer(&self, timeframe: Timeframe) -> &TimeframeBuffer {
        // Every tier is inserted at construction.
        &self.buffers[&timeframe]
    }

    pub fn load(&mut self, timeframe: Timeframe, candles: Vec<Candle>) {
        if let Some(buffer) = self.buffers.get_mut(&timeframe) {
            buffer.load(candles);
        }
    }

    pub fn append(&mut self, timeframe: Timeframe, candle: Candle) {
        if let Some(buffer) = self.buffers.get_mut(&timeframe) {
            buffer.append(candle);
        }
    }

    /// True once every tier has at least one bar.
    pub fn all_loaded(&self) -> bool {
        Timeframe::ALL.iter().all(|tf| !self.buffer(*tf).is_empty())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
