//! Topic Payload Types
//!
//! Shapes of the `data` field for each routed topic. Producers serialize
//! these into envelopes; consumers may decode them with `Envelope::payload`.
//!
//! # Topics
//!
//! - `price`: `PriceTick`
//! - `trade`: `TradeAlert`
//! - `alert`: `MarketAlert`
//! - `news`: `NewsItem`
//! - `market`: `MarketSnapshot`
//! - `system`: `SystemNotice`

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Price
// =============================================================================

/// Last-price update for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    /// Ticker symbol (e.g., "AAPL").
    pub symbol: String,
    /// Last traded price.
    pub price: Decimal,
    /// Absolute change since previous close.
    pub change: Decimal,
    /// Percent change since previous close.
    pub change_percent: Decimal,
    /// Session volume, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

// =============================================================================
// Trade
// =============================================================================

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// Notable executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeAlert {
    /// Ticker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Shares traded.
    pub quantity: u64,
    /// Execution price.
    pub price: Decimal,
    /// Execution time.
    pub executed_at: DateTime<Utc>,
}

// =============================================================================
// Alert
// =============================================================================

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Needs action.
    Critical,
}

/// Price or volume alert raised for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAlert {
    /// Ticker symbol.
    pub symbol: String,
    /// Severity.
    pub severity: AlertSeverity,
    /// Human-readable message.
    pub message: String,
}

// =============================================================================
// News
// =============================================================================

/// News headline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    /// Stable identifier.
    pub id: String,
    /// Headline.
    pub headline: String,
    /// Publisher.
    pub source: String,
    /// Related symbols.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Link to the article.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Publication time.
    pub published_at: DateTime<Utc>,
}

// =============================================================================
// Market
// =============================================================================

/// One index level inside a market snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexLevel {
    /// Index name (e.g., "S&P 500").
    pub name: String,
    /// Current level.
    pub value: Decimal,
    /// Percent change on the day.
    pub change_percent: Decimal,
}

/// Market-wide snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    /// Index levels.
    pub indices: Vec<IndexLevel>,
    /// Advancing issues.
    pub advancers: u32,
    /// Declining issues.
    pub decliners: u32,
    /// Whether the regular session is open.
    pub market_open: bool,
}

// =============================================================================
// System
// =============================================================================

/// Connection lifecycle notice sent on the `system` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNotice {
    /// Event name (e.g., "welcome").
    pub event: String,
    /// Human-readable message.
    pub message: String,
    /// Session the notice is addressed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl SystemNotice {
    /// Welcome notice sent immediately after a session connects.
    #[must_use]
    pub fn welcome(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event: "welcome".to_string(),
            message: message.into(),
            session_id: Some(session_id.into()),
        }
    }
}
