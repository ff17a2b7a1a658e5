//! # models::candle
//!
//! [`Candle`] — OHLC summary ของหนึ่ง time bucket — กับ [`Timeframe`]
//! สามชั้นที่ระบบวิเคราะห์พร้อมกัน (Macro 30M / Mid 15M / Micro 1M)

use serde::{Deserialize, Serialize};

// ─── Timeframe ────────────────────────────────────────────────────────────────

/// The three nested analysis tiers.  Granularity is the Deriv bucket duration
/// in seconds and doubles as the subscription key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Timeframe {
    /// Macro tier — 30 minute candles, trend direction.
    M30,
    /// Mid tier — 15 minute candles, structure / setup.
    M15,
    /// Micro tier — 1 minute candles, entry timing.
    M1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M30, Timeframe::M15, Timeframe::M1];

    /// Bucket duration in seconds (the wire `granularity` field).
    #[inline]
    pub const fn granularity(self) -> u32 {
        match self {
            Timeframe::M30 => 1800,
            Timeframe::M15 => 900,
            Timeframe::M1 => 60,
        }
    }

    pub fn from_granularity(granularity: u32) -> Option<Self> {
        match granularity {
            1800 => Some(Timeframe::M30),
            900 => Some(Timeframe::M15),
            60 => Some(Timeframe::M1),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Timeframe::M30 => "30M",
            Timeframe::M15 => "15M",
            Timeframe::M1 => "1M",
        }
    }
}

// ─── Candle ───────────────────────────────────────────────────────────────────

/// A single OHLC bar.
///
/// Historical bars are immutable.  The most recent bar of a timeframe is
/// updated in place while its period is still open (same `time`) and a new
/// bar is appended only when `time` advances — see `TimeframeStore::append`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, epoch seconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Volume อาจเป็น 0 สำหรับ synthetic indices / Forex quotes
    pub volume: f64,
}

impl Candle {
    /// A degenerate bar where every price is the same quote — used when the
    /// server returns the alternate `history { prices, times }` shape.
    pub fn flat(time: i64, price: f64) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_round_trip() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::from_granularity(tf.granularity()), Some(tf));
        }
        assert_eq!(Timeframe::from_granularity(300), None);
    }

    #[test]
    fn test_flat_candle() {
        let c = Candle::flat(1_700_000_000, 42.5);
        assert_eq!(c.open, c.close);
        assert_eq!(c.high, c.low);
        assert_eq!(c.volume, 0.0);
    }
}
