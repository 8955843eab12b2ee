//! Application Layer
//!
//! Port definitions and the services built on them.

pub mod ports;
pub mod services;
