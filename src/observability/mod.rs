//! Observability for the routing and delegation engine
//!
//! Structured logging built on the tracing crate. Routing decisions,
//! handoffs, and delegation lifecycle events are emitted as structured
//! fields so they can be aggregated downstream.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
