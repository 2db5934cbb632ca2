//! Message routing
//!
//! Two layers live here:
//!
//! - [`rule`]: the RouteRule type and leaf-level rule matching.
//! - [`engine`]: the RoutingEngine that orchestrates the prioritized rule
//!   table, header-based direct targeting, the pluggable decision function,
//!   and fallback handlers to produce a single [`RouteDecision`].
//!
//! Routing picks a target; it does not move tasks. Cross-agent handoff is the
//! orchestrator's job, and one-shot dispatch belongs to the delegator.

pub mod engine;
pub mod rule;

pub use engine::{
    DecisionContext, DecisionFn, MessageHandler, RouteDecision, RouteOutcome, RoutingEngine,
};
pub use rule::{RouteRule, RulePredicate, RuleTarget};
