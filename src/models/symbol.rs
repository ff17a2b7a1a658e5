//! # models::symbol
//!
//! Catalog entry from the `active_symbols` request — the list of tradable
//! instruments the caller may analyse.  The pipeline only exposes the raw
//! list; instrument selection is the consumer's business.

use serde::{Deserialize, Serialize};

/// One tradable instrument descriptor (brief style).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSymbol {
    pub symbol: String,
    pub display_name: String,

    #[serde(default)]
    pub market: String,

    #[serde(default)]
    pub submarket: String,

    /// 1 = currently open for trading.
    #[serde(default)]
    pub exchange_is_open: u8,
}
