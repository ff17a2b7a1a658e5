//! # error
//!
//! Centralised error taxonomy for the connection layer.
//!
//! Every fallible API call returns `Result<_, ApiError>`.  The variants map
//! one-to-one onto the failure classes of the wire protocol so callers can
//! distinguish "my request timed out" from "the server said no" without
//! string matching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure: connect refused, TLS handshake, abnormal
    /// closure.  Pending requests are rejected with this when the socket dies.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No correlated response arrived within the request's timeout budget.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// The server answered the request with an error payload.  Code and
    /// message are surfaced verbatim to the caller of the originating request.
    #[error("Remote error [{code}]: {message}")]
    Remote { code: String, message: String },

    /// An inbound message could not be parsed or a response was missing the
    /// fields the operation requires.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An operation was attempted while the socket is not connected.
    #[error("Not connected")]
    NotConnected,
}

impl ApiError {
    /// Builds a [`ApiError::Remote`] from the server's `error` object.
    /// Deriv error payloads carry `{ "code": ..., "message": ... }`.
    pub fn from_remote(error: &serde_json::Value) -> Self {
        ApiError::Remote {
            code: error
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("unknown")
                .to_string(),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unspecified server error")
                .to_string(),
        }
    }
}
