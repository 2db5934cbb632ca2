//! Task delegation
//!
//! One-shot dispatch of work to a worker agent with optional correlated
//! waiting. The [`TaskTrackingStore`] keeps pending delegations, waiters, and
//! a bounded completed history; the [`TaskDelegator`] drives the dispatch and
//! timeout semantics over an injected transport.

pub mod delegator;
pub mod tracker;

pub use delegator::{DelegationOptions, TaskDelegator};
pub use tracker::{
    CompletedDelegation, DelegationMetadata, TaskTrackingStore, DEFAULT_HISTORY_LIMIT,
};
