//! Routing rules and rule matching
//!
//! A [`RouteRule`] couples match predicates with a target (a local handler or
//! an external agent). Rules are evaluated in strictly descending priority
//! order with insertion-order tie-break; a rule matches only when ALL of its
//! specified predicates hold. A custom matcher, when named, is authoritative
//! and short-circuits the declarative predicates.

use crate::error::MeshResult;
use crate::orchestrator::path::resolve_path;
use crate::protocol::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Target of a matched rule: a local handler XOR an external agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    /// Name of a handler registered with the routing engine
    Handler(String),
    /// Identifier of an external agent (delegation is the caller's job)
    Agent(String),
}

/// Custom match predicate, resolved by name from the engine's registry.
/// An `Err` is logged by the engine and treated as a non-match.
pub type RulePredicate =
    Arc<dyn Fn(&Message, &RouteRule) -> MeshResult<bool> + Send + Sync>;

/// A single routing rule
///
/// # Examples
/// ```
/// use agentmesh::routing::{RouteRule, RuleTarget};
///
/// let rule = RouteRule::new("calc-requests", 10, RuleTarget::Handler("calc".into()))
///     .with_keywords(vec!["calculate".into(), "compute".into()]);
/// assert_eq!(rule.priority, 10);
/// ```
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub name: String,
    /// Higher priorities are evaluated first
    pub priority: i32,
    /// Match only messages whose header names this target system
    pub target_system: Option<String>,
    /// Match only messages whose first part has this type label
    pub message_type: Option<String>,
    /// Case-insensitive substring match against the message text; any keyword
    /// in the list satisfies the predicate
    pub keywords: Vec<String>,
    /// Dotted-path equality predicates over the serialized message
    pub attributes: HashMap<String, Value>,
    /// Name of a registered custom matcher; authoritative when present
    pub custom_matcher: Option<String>,
    pub target: RuleTarget,
}

impl RouteRule {
    pub fn new<S: Into<String>>(name: S, priority: i32, target: RuleTarget) -> Self {
        Self {
            name: name.into(),
            priority,
            target_system: None,
            message_type: None,
            keywords: Vec::new(),
            attributes: HashMap::new(),
            custom_matcher: None,
            target,
        }
    }

    pub fn with_target_system<S: Into<String>>(mut self, target_system: S) -> Self {
        self.target_system = Some(target_system.into());
        self
    }

    pub fn with_message_type<S: Into<String>>(mut self, message_type: S) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_attribute<S: Into<String>>(mut self, path: S, value: Value) -> Self {
        self.attributes.insert(path.into(), value);
        self
    }

    pub fn with_custom_matcher<S: Into<String>>(mut self, name: S) -> Self {
        self.custom_matcher = Some(name.into());
        self
    }

    /// Evaluate the declarative predicates against a message.
    ///
    /// All specified predicates must hold; unspecified predicates are
    /// vacuously true. The custom matcher is NOT consulted here; the engine
    /// resolves and applies it first.
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(expected) = &self.target_system {
            if message.target_system() != Some(expected.as_str()) {
                return false;
            }
        }

        if let Some(expected) = &self.message_type {
            if message.message_type() != Some(expected.as_str()) {
                return false;
            }
        }

        if !self.keywords.is_empty() {
            let text = message.text().to_lowercase();
            let hit = self
                .keywords
                .iter()
                .any(|kw| text.contains(&kw.to_lowercase()));
            if !hit {
                return false;
            }
        }

        if !self.attributes.is_empty() {
            let serialized = match serde_json::to_value(message) {
                Ok(v) => v,
                Err(_) => return false,
            };
            for (path, expected) in &self.attributes {
                match resolve_path(&serialized, path) {
                    Some(actual) if values_equal(actual, expected) => {}
                    _ => return false,
                }
            }
        }

        true
    }
}

/// Value equality with numeric coercion (5 == 5.0)
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler_rule(name: &str, priority: i32) -> RouteRule {
        RouteRule::new(name, priority, RuleTarget::Handler("h".to_string()))
    }

    #[test]
    fn test_empty_rule_matches_everything() {
        let rule = handler_rule("catch-all", 0);
        assert!(rule.matches(&Message::user_text("anything at all")));
    }

    #[test]
    fn test_keyword_match_case_insensitive() {
        let rule = handler_rule("calc", 10).with_keywords(vec!["calculate".to_string()]);

        assert!(rule.matches(&Message::user_text("please CALCULATE 2+2")));
        assert!(!rule.matches(&Message::user_text("please research something")));
    }

    #[test]
    fn test_any_keyword_satisfies() {
        let rule = handler_rule("math", 10)
            .with_keywords(vec!["calculate".to_string(), "compute".to_string()]);

        assert!(rule.matches(&Message::user_text("compute the total")));
    }

    #[test]
    fn test_target_system_predicate() {
        let rule = handler_rule("direct", 5).with_target_system("billing");

        assert!(rule.matches(&Message::user_text("invoice").with_target_system("billing")));
        assert!(!rule.matches(&Message::user_text("invoice").with_target_system("support")));
        assert!(!rule.matches(&Message::user_text("invoice")));
    }

    #[test]
    fn test_message_type_predicate() {
        let rule = handler_rule("text-only", 5).with_message_type("text");

        assert!(rule.matches(&Message::user_text("hello")));

        let data_msg = Message {
            role: crate::protocol::Role::User,
            parts: vec![crate::protocol::Part::Data {
                content: json!({"k": "v"}),
            }],
            header: None,
        };
        assert!(!rule.matches(&data_msg));
    }

    #[test]
    fn test_attribute_path_equality() {
        let rule = handler_rule("attr", 5).with_attribute("parts[0].content", json!("ping"));

        assert!(rule.matches(&Message::user_text("ping")));
        assert!(!rule.matches(&Message::user_text("pong")));
    }

    #[test]
    fn test_unresolved_attribute_path_is_non_match() {
        let rule = handler_rule("attr", 5).with_attribute("parts[9].content", json!("ping"));
        assert!(!rule.matches(&Message::user_text("ping")));
    }

    #[test]
    fn test_all_predicates_must_hold() {
        let rule = handler_rule("strict", 5)
            .with_keywords(vec!["calculate".to_string()])
            .with_target_system("math");

        // Keyword matches but target system does not
        assert!(!rule.matches(&Message::user_text("calculate this")));
        assert!(rule.matches(
            &Message::user_text("calculate this").with_target_system("math")
        ));
    }

    #[test]
    fn test_values_equal_numeric_coercion() {
        assert!(values_equal(&json!(5), &json!(5.0)));
        assert!(!values_equal(&json!(5), &json!(6)));
        assert!(values_equal(&json!("x"), &json!("x")));
        assert!(!values_equal(&json!("5"), &json!(5)));
    }
}
