//! Declarative route table for cross-agent handoff
//!
//! An [`AgentRoute`] says where a task goes after its current agent completes
//! it. Sequential and parallel routes carry destination lists, conditional
//! routes carry an ordered condition list (first match wins), and dynamic
//! routes name a registered router function that is consulted at resolution
//! time.

use crate::error::{MeshError, MeshResult};
use crate::orchestrator::path::resolve_path;
use crate::protocol::Task;
use crate::routing::rule::values_equal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Dynamic router function, resolved by name from the orchestrator registry.
/// Returns the next agent id, or `None` for "stay put". An `Err` is logged
/// and demoted to a routing miss.
pub type DynamicRouterFn = Arc<dyn Fn(&Task) -> MeshResult<Option<String>> + Send + Sync>;

/// Comparison operator for route conditions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOp {
    Eq,
    Neq,
    Contains,
    Gt,
    Lt,
    Ge,
    Le,
}

impl ConditionOp {
    /// Evaluate the operator against a resolved value.
    ///
    /// Ordering operators compare numbers through f64 and strings
    /// lexicographically; mismatched types never match. `contains` covers
    /// string substring and array membership.
    pub fn evaluate(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            ConditionOp::Eq => values_equal(actual, expected),
            ConditionOp::Neq => !values_equal(actual, expected),
            ConditionOp::Contains => match (actual, expected) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
                (Value::Array(items), needle) => items.iter().any(|v| values_equal(v, needle)),
                _ => false,
            },
            ConditionOp::Gt => compare(actual, expected, |o| o == std::cmp::Ordering::Greater),
            ConditionOp::Lt => compare(actual, expected, |o| o == std::cmp::Ordering::Less),
            ConditionOp::Ge => compare(actual, expected, |o| o != std::cmp::Ordering::Less),
            ConditionOp::Le => compare(actual, expected, |o| o != std::cmp::Ordering::Greater),
        }
    }
}

fn compare<F: Fn(std::cmp::Ordering) -> bool>(a: &Value, b: &Value, check: F) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).map(&check).unwrap_or(false);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return check(x.as_str().cmp(y.as_str()));
    }
    false
}

/// One branch of a conditional route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteCondition {
    /// Dotted path into the task's serialized form
    /// (e.g. `messages[-1].parts[0].content`)
    pub field: String,
    pub operator: ConditionOp,
    pub value: Value,
    /// Destination agent when the condition holds
    pub target: String,
}

impl RouteCondition {
    /// Evaluate against a serialized task. An unresolved path is a
    /// non-match, never an error.
    pub fn matches(&self, task_value: &Value) -> bool {
        match resolve_path(task_value, &self.field) {
            Some(actual) => self.operator.evaluate(actual, &self.value),
            None => false,
        }
    }
}

/// Type-specific payload of an agent route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouteKind {
    Sequential { destinations: Vec<String> },
    Conditional { conditions: Vec<RouteCondition> },
    Parallel { destinations: Vec<String> },
    Dynamic { router: String },
}

/// Declarative route from a source agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRoute {
    /// Agent whose completed tasks this route applies to
    pub source: String,
    #[serde(flatten)]
    pub kind: RouteKind,
}

impl AgentRoute {
    pub fn sequential<S: Into<String>>(source: S, destinations: Vec<String>) -> Self {
        Self {
            source: source.into(),
            kind: RouteKind::Sequential { destinations },
        }
    }

    pub fn conditional<S: Into<String>>(source: S, conditions: Vec<RouteCondition>) -> Self {
        Self {
            source: source.into(),
            kind: RouteKind::Conditional { conditions },
        }
    }

    pub fn parallel<S: Into<String>>(source: S, destinations: Vec<String>) -> Self {
        Self {
            source: source.into(),
            kind: RouteKind::Parallel { destinations },
        }
    }

    pub fn dynamic<S: Into<String>, R: Into<String>>(source: S, router: R) -> Self {
        Self {
            source: source.into(),
            kind: RouteKind::Dynamic {
                router: router.into(),
            },
        }
    }

    /// Structural validation: destination/condition lists must be non-empty
    /// and dynamic routes must name a router. Whether the named router is
    /// actually registered is checked when the route is added to an
    /// orchestrator.
    pub fn validate(&self) -> MeshResult<()> {
        match &self.kind {
            RouteKind::Sequential { destinations } | RouteKind::Parallel { destinations } => {
                if destinations.is_empty() {
                    return Err(MeshError::invalid_route(format!(
                        "route from '{}' has no destinations",
                        self.source
                    )));
                }
            }
            RouteKind::Conditional { conditions } => {
                if conditions.is_empty() {
                    return Err(MeshError::invalid_route(format!(
                        "conditional route from '{}' has no conditions",
                        self.source
                    )));
                }
            }
            RouteKind::Dynamic { router } => {
                if router.is_empty() {
                    return Err(MeshError::invalid_route(format!(
                        "dynamic route from '{}' names no router",
                        self.source
                    )));
                }
            }
        }
        Ok(())
    }
}
