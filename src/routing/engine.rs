//! Priority-rule routing engine
//!
//! The engine resolves one inbound message to one [`RouteDecision`] through
//! four tiers, first success wins: the prioritized rule table, header-based
//! direct targeting, a pluggable decision function (an LLM or any external
//! policy), and a fixed fallback handler list. Selection never fails hard: a
//! misbehaving predicate or decision function is logged and demoted to a miss
//! for its tier, and an exhausted pipeline yields a zero-confidence decision
//! the caller treats as "no action".

use crate::error::{MeshError, MeshResult};
use crate::protocol::Message;
use crate::routing::rule::{RouteRule, RulePredicate, RuleTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Catch-all handler names tried, in order, when every other tier misses
const FALLBACK_HANDLERS: &[&str] = &["default", "general", "fallback"];

/// Outcome of routing-decision evaluation
///
/// At most one of `handler`/`agent` is meaningful per decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteDecision {
    /// Local handler to invoke, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// External agent to delegate to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Confidence in [0, 1]; 0.0 means no match
    pub confidence: f64,
    /// Human-readable explanation of the decision
    pub reasoning: String,
}

impl RouteDecision {
    /// Decision targeting a local handler
    pub fn handler<S: Into<String>, R: Into<String>>(
        handler: S,
        confidence: f64,
        reasoning: R,
    ) -> Self {
        Self {
            handler: Some(handler.into()),
            agent: None,
            confidence,
            reasoning: reasoning.into(),
        }
    }

    /// Decision targeting an external agent
    pub fn agent<S: Into<String>, R: Into<String>>(
        agent: S,
        confidence: f64,
        reasoning: R,
    ) -> Self {
        Self {
            handler: None,
            agent: Some(agent.into()),
            confidence,
            reasoning: reasoning.into(),
        }
    }

    /// Zero-confidence decision: no rule, handler, or agent matched
    pub fn no_match<R: Into<String>>(reasoning: R) -> Self {
        Self {
            handler: None,
            agent: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
        }
    }

    /// True when the decision names a handler or an agent
    pub fn is_match(&self) -> bool {
        self.handler.is_some() || self.agent.is_some()
    }
}

/// Context handed to the pluggable decision function
pub struct DecisionContext<'a> {
    pub message: &'a Message,
    /// Names of registered local handlers
    pub handlers: Vec<String>,
    /// Known external agent ids
    pub agents: Vec<String>,
    /// The engine's rule table, highest priority first
    pub rules: &'a [RouteRule],
}

/// Pluggable decision hook (stands in for an LLM or any external policy)
///
/// Returning `Ok(None)` or `Err` counts as a miss for this tier; errors are
/// logged. A returned decision naming an unregistered handler with no agent
/// id is also a miss.
#[async_trait]
pub trait DecisionFn: Send + Sync {
    async fn decide(&self, ctx: &DecisionContext<'_>) -> MeshResult<Option<RouteDecision>>;
}

/// A local message handler invocable by the engine
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> MeshResult<Value>;
}

/// Result of executing a routing decision
#[derive(Debug)]
pub enum RouteOutcome {
    /// A local handler ran; its output is returned
    Handled {
        handler: String,
        decision: RouteDecision,
        output: Value,
    },
    /// The decision names an external agent; delegation is the caller's
    /// responsibility (see `TaskDelegator`)
    External(RouteDecision),
    /// Nothing matched; not an error
    NoMatch(RouteDecision),
}

/// Rule/priority-based message router
///
/// Holds its own rule table, handler registry, and known-agent set; construct
/// one per process and pass it by reference rather than relying on globals.
#[derive(Default)]
pub struct RoutingEngine {
    /// Kept sorted strictly descending by priority; stable sort preserves
    /// insertion order among equal priorities
    rules: Vec<RouteRule>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    agents: HashSet<String>,
    predicates: HashMap<String, RulePredicate>,
    decision_fn: Option<Arc<dyn DecisionFn>>,
}

impl RoutingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, keeping the table in descending priority order
    pub fn add_rule(&mut self, rule: RouteRule) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
    }

    /// Register a named local handler
    pub fn register_handler<S: Into<String>>(
        &mut self,
        name: S,
        handler: Arc<dyn MessageHandler>,
    ) {
        self.handlers.insert(name.into(), handler);
    }

    /// Register a known external agent id
    pub fn register_agent<S: Into<String>>(&mut self, agent_id: S) {
        self.agents.insert(agent_id.into());
    }

    /// Register a custom match predicate under a name rules can reference
    pub fn register_predicate<S: Into<String>>(&mut self, name: S, predicate: RulePredicate) {
        self.predicates.insert(name.into(), predicate);
    }

    /// Install the pluggable decision function
    pub fn set_decision_fn(&mut self, decision_fn: Arc<dyn DecisionFn>) {
        self.decision_fn = Some(decision_fn);
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Resolve a message to a routing decision.
    ///
    /// Tiers in order, first success wins: rule table, header direct
    /// targeting, decision function, fallback handlers. Never returns an
    /// error; an exhausted pipeline yields a zero-confidence decision.
    pub async fn decide(&self, message: &Message) -> RouteDecision {
        if let Some(decision) = self.decide_by_rules(message) {
            return decision;
        }

        if let Some(target) = message.target_system() {
            if self.handlers.contains_key(target) {
                debug!(target, "direct targeting via message header");
                return RouteDecision::handler(
                    target,
                    0.9,
                    format!("message header targets registered handler '{target}'"),
                );
            }
        }

        if let Some(decision) = self.decide_by_function(message).await {
            return decision;
        }

        for name in FALLBACK_HANDLERS {
            if self.handlers.contains_key(*name) {
                return RouteDecision::handler(
                    *name,
                    0.5,
                    format!("no rule or policy matched; fell back to '{name}' handler"),
                );
            }
        }

        RouteDecision::no_match(
            "no rule matched, no direct target, decision function declined, \
             and no fallback handler is registered",
        )
    }

    /// Tier 1: prioritized rule table. First matching rule wins with
    /// confidence 1.0.
    fn decide_by_rules(&self, message: &Message) -> Option<RouteDecision> {
        for rule in &self.rules {
            let matched = match &rule.custom_matcher {
                Some(name) => match self.predicates.get(name) {
                    // Custom matcher is authoritative when present
                    Some(predicate) => match predicate(message, rule) {
                        Ok(hit) => hit,
                        Err(e) => {
                            warn!(rule = %rule.name, matcher = %name, error = %e,
                                  "custom matcher failed; treating rule as non-match");
                            false
                        }
                    },
                    None => {
                        warn!(rule = %rule.name, matcher = %name,
                              "custom matcher not registered; treating rule as non-match");
                        false
                    }
                },
                None => rule.matches(message),
            };

            if matched {
                debug!(rule = %rule.name, priority = rule.priority, "rule matched");
                let reasoning = format!("rule '{}' matched at priority {}", rule.name, rule.priority);
                return Some(match &rule.target {
                    RuleTarget::Handler(h) => RouteDecision::handler(h.clone(), 1.0, reasoning),
                    RuleTarget::Agent(a) => RouteDecision::agent(a.clone(), 1.0, reasoning),
                });
            }
        }
        None
    }

    /// Tier 3: pluggable decision function. Errors and invalid targets are
    /// demoted to a miss.
    async fn decide_by_function(&self, message: &Message) -> Option<RouteDecision> {
        let decision_fn = self.decision_fn.as_ref()?;

        let ctx = DecisionContext {
            message,
            handlers: self.handlers.keys().cloned().collect(),
            agents: self.agents.iter().cloned().collect(),
            rules: &self.rules,
        };

        match decision_fn.decide(&ctx).await {
            Ok(Some(mut decision)) => {
                if let Some(handler) = decision.handler.take() {
                    if self.handlers.contains_key(&handler) {
                        decision.handler = Some(handler);
                        return Some(decision);
                    }
                    if decision.agent.is_none() {
                        warn!(handler = %handler,
                              "decision function named unregistered handler; miss");
                        return None;
                    }
                    // Keep the agent target, drop the bogus handler
                    warn!(handler = %handler,
                          "decision function named unregistered handler; using its agent target");
                }
                if decision.agent.is_some() {
                    return Some(decision);
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "decision function failed; miss");
                None
            }
        }
    }

    /// Execute a routing decision for a message.
    ///
    /// Invokes the chosen local handler and returns its output; handler
    /// execution errors propagate to the caller. A decision naming an
    /// external agent is returned unexecuted.
    pub async fn route(&self, message: &Message) -> MeshResult<RouteOutcome> {
        let decision = self.decide(message).await;

        if let Some(name) = decision.handler.clone() {
            let handler = self
                .handlers
                .get(&name)
                .ok_or_else(|| MeshError::internal(format!("handler '{name}' vanished")))?
                .clone();
            let output = handler
                .handle(message)
                .await
                .map_err(|e| MeshError::HandlerFailed {
                    handler: name.clone(),
                    message: e.to_string(),
                })?;
            return Ok(RouteOutcome::Handled {
                handler: name,
                decision,
                output,
            });
        }

        if decision.agent.is_some() {
            return Ok(RouteOutcome::External(decision));
        }

        Ok(RouteOutcome::NoMatch(decision))
    }
}
