//! agentmesh - routing and delegation engine for multi-agent systems
//!
//! This crate lets autonomous agents hand units of work ("tasks") to one
//! another across process boundaries, deciding dynamically which agent should
//! handle a message and tracking each task as it moves.
//!
//! # Overview
//!
//! Three cooperating subsystems:
//! - A rule/priority-based [`routing::RoutingEngine`] that resolves an inbound
//!   message to a local handler or a remote agent
//! - An [`orchestrator::Orchestrator`] that re-homes completed tasks between
//!   agents according to declarative routes (sequential, conditional,
//!   parallel, dynamic) with a bounded hop depth
//! - A [`delegation::TaskDelegator`] that dispatches one-shot work to a worker
//!   agent and optionally correlates the asynchronous result back to the
//!   caller with timeout semantics
//!
//! # Quick Start
//!
//! ```rust
//! use agentmesh::protocol::Message;
//! use agentmesh::routing::{RouteRule, RuleTarget, RoutingEngine};
//!
//! # tokio_test::block_on(async {
//! let mut engine = RoutingEngine::new();
//! engine.add_rule(
//!     RouteRule::new("math", 10, RuleTarget::Agent("calc-agent".to_string()))
//!         .with_keywords(vec!["calculate".to_string()]),
//! );
//!
//! let decision = engine.decide(&Message::user_text("calculate 2+2")).await;
//! assert_eq!(decision.agent.as_deref(), Some("calc-agent"));
//! assert_eq!(decision.confidence, 1.0);
//! # });
//! ```

pub mod config;
pub mod delegation;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod protocol;
pub mod routing;
pub mod transport;

pub use config::{load_config, MeshConfig};
pub use delegation::{DelegationOptions, TaskDelegator, TaskTrackingStore};
pub use error::{MeshError, MeshResult};
pub use orchestrator::{
    AgentRoute, Orchestrator, ParallelTaskGroup, RouteCondition, SequentialTaskChain, TaskHandler,
};
pub use protocol::*;
pub use routing::{RouteDecision, RouteRule, RoutingEngine, RuleTarget};
pub use transport::{AgentTransport, DelegationTransport, HttpAgentClient};
