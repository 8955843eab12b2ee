//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: Opens the full-duplex text connection to the broadcast server
//! - `DashboardApi`: HTTP endpoints the offline queue delivers actions to
//!
//! ## Driver Ports (Inbound)
//!
//! - `Subscriber`: Receives envelopes dispatched by the connection manager

mod dashboard_api_port;
mod subscriber_port;
mod transport_port;

pub use dashboard_api_port::{
    ApiError, DashboardApi, NewsletterRequest, Preferences, ProfileResponse, UserProfile,
};
#[cfg(test)]
pub use dashboard_api_port::MockDashboardApi;
pub use subscriber_port::{SharedSubscriber, Subscriber};
pub use transport_port::{Frame, Transport, TransportError, TransportLink};
