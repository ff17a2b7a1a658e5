//! # engine
//!
//! **Decision Engine** — turns the three timeframe buffers into one trade
//! signal.
//!
//! ```text
//! TimeframeStore ──▶ features::extract_features ──▶ FeatureSet
//!                                                      │
//!                       rules::evaluate  ◀─────────────┘
//!                       (ordered table, first match wins)
//! ```
//!
//! Inputs are always well-formed by construction (they come from validated
//! store state), so evaluation is total — any non-empty buffer yields a
//! signal, never an error.

pub mod features;
pub mod rules;

pub use features::extract_features;
pub use rules::evaluate;
