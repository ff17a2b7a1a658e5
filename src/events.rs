//! # events
//!
//! Defines [`PipelineEvent`] — everything the pipeline broadcasts to its
//! consumers (signal display, alerting, status panels).
//!
//! Events travel over a `tokio::sync::broadcast` channel as pre-serialized
//! JSON-able values; consumers only read, nothing feeds back into decision
//! state.

use serde::Serialize;

use crate::models::{Signal, Timeframe};

/// One pipeline notification.  Serialized with a SCREAMING_SNAKE_CASE
/// `event` tag for straightforward consumption by any frontend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineEvent {
    /// Historical bootstrap finished for all three tiers.
    TimeframesLoaded {
        symbol: String,
        bars_30m: usize,
        bars_15m: usize,
        bars_1m: usize,
    },

    /// A fresh signal after a recompute.  `trigger` names the timeframe
    /// whose update caused it (`None` for the bootstrap evaluation).
    SignalUpdated {
        trigger: Option<Timeframe>,
        signal: Box<Signal>,
    },

    /// Transport state transition.
    ConnectionChanged { connected: bool },

    /// Bounded reconnection gave up — the pipeline is terminal.
    ReconnectExhausted { attempts: u32 },

    /// Server error that could not be correlated to any request.
    ApiError { code: String, message: String },
}

impl PipelineEvent {
    /// JSON rendering for transport to a frontend.
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_is_screaming_snake_case() {
        let event = PipelineEvent::ConnectionChanged { connected: true };
        let json = event.to_json();
        assert!(json.contains(r#""event":"CONNECTION_CHANGED""#));
        assert!(json.contains(r#""connected":true"#));
    }
}
