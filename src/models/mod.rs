//! # models
//!
//! Domain objects shared across the pipeline: candles and timeframes, the
//! tradable-symbol catalog, and the signal/feature output types.

pub mod candle;
pub mod signal;
pub mod symbol;

pub use candle::{Candle, Timeframe};
pub use signal::{
    FeatureSet, MacroSummary, MicroSummary, MidSummary, Momentum, QuickDecision, Signal,
    SignalAction, SignalKind, TradeLevels, Trend,
};
pub use symbol::ActiveSymbol;
