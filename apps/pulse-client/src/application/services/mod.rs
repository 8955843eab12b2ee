//! Application Services
//!
//! - `ConnectionManager`: One multiplexed connection shared by every local subscriber
//! - `OfflineQueueSync`: Sequential delivery of queued offline actions

mod connection;
mod handlers;
mod sync;

pub use connection::{ConnectionConfig, ConnectionManager};
pub use sync::{OfflineQueueSync, SyncConfig, SyncOutcome, SyncReport};
