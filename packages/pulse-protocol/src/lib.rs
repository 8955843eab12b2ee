#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::needless_pass_by_value
    )
)]

//! Pulse Protocol - Shared Wire Types
//!
//! JSON text frames exchanged over the dashboard's persistent connection.
//!
//! # Frames
//!
//! ```text
//! client ──► server   { "action": "subscribe" | "unsubscribe", "type": "<topic>" }
//! server ──► client   { "type": "<topic>" | "system", "data": { ... }, "timestamp": "<ISO8601>" }
//! ```
//!
//! - `topic`: Routing keys (`trade`, `price`, `alert`, `news`, `market`, `system`, `all`)
//! - `envelope`: Server-to-client wrapper around a topic payload
//! - `command`: Client-to-server subscription commands
//! - `payload`: Typed payloads carried on each topic
//! - `codec`: JSON encoding and decoding with typed errors

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Client-to-server commands.
pub mod command;

/// JSON codec for frames.
pub mod codec;

/// Server-to-client envelope.
pub mod envelope;

/// Typed topic payloads.
pub mod payload;

/// Routing topics.
pub mod topic;

pub use codec::{CodecError, JsonCodec};
pub use command::{ClientCommand, CommandAction};
pub use envelope::Envelope;
pub use payload::{
    AlertSeverity, IndexLevel, MarketAlert, MarketSnapshot, NewsItem, PriceTick, SystemNotice,
    TradeAlert, TradeSide,
};
pub use rust_decimal::Decimal;
pub use topic::{Topic, UnknownTopic};
