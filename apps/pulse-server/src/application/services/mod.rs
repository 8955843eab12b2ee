//! Application Services
//!
//! - `BroadcastChannel`: Session lifecycle, subscription commands, and fan-out

mod channel;

pub use channel::{BroadcastChannel, BroadcastReport, ChannelConfig, ChannelError};
