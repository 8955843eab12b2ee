//! Domain Layer - Session and subscription state.
//!
//! Pure in-memory state for connected sessions. Nothing here performs I/O;
//! outbound delivery handles are opaque type parameters supplied by the
//! application layer.

/// Session registry and per-session topic subscriptions.
pub mod session;
