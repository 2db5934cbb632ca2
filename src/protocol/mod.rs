//! Protocol types for agent communication
//!
//! This module defines the message and task structures exchanged with remote
//! agents over the task wire protocol, plus the delegation request/result pair
//! used for correlated dispatch between agents.

pub mod messages;

pub use messages::*;
