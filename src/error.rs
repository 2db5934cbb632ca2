//! Error types for routing, orchestration, and delegation
//!
//! A routing miss is NOT represented here: when no rule, handler, or agent
//! matches, the engine returns a zero-confidence decision and the caller
//! treats it as "no action". Errors in this module are the conditions a
//! caller must actually handle.

use thiserror::Error;

/// Main error type for agentmesh operations
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Routing depth exceeded: hop {current} over maximum {max}")]
    RoutingDepthExceeded { current: usize, max: usize },

    #[error("Unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    #[error("Unknown task: {task_id}")]
    UnknownTask { task_id: String },

    #[error("Handoff failed: {message}")]
    HandoffFailed { message: String },

    #[error("Delegation timed out after {timeout_ms}ms for task {task_id}")]
    DelegationTimeout { task_id: String, timeout_ms: u64 },

    #[error("Delegation failed for task {task_id}: {message}")]
    DelegationFailed { task_id: String, message: String },

    #[error("Handler '{handler}' failed: {message}")]
    HandlerFailed { handler: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid route: {message}")]
    InvalidRoute { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MeshError {
    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a handoff error
    pub fn handoff_failed<S: Into<String>>(message: S) -> Self {
        Self::HandoffFailed {
            message: message.into(),
        }
    }

    /// Create an unknown-agent error
    pub fn unknown_agent<S: Into<String>>(agent_id: S) -> Self {
        Self::UnknownAgent {
            agent_id: agent_id.into(),
        }
    }

    /// Create an unknown-task error
    pub fn unknown_task<S: Into<String>>(task_id: S) -> Self {
        Self::UnknownTask {
            task_id: task_id.into(),
        }
    }

    /// Create an invalid-route error
    pub fn invalid_route<S: Into<String>>(message: S) -> Self {
        Self::InvalidRoute {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for MeshError {
    fn from(err: reqwest::Error) -> Self {
        MeshError::Transport(err.to_string())
    }
}

/// Result type for agentmesh operations
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_exceeded_display() {
        let err = MeshError::RoutingDepthExceeded { current: 9, max: 8 };
        assert!(err.to_string().contains("9"));
        assert!(err.to_string().contains("8"));
    }

    #[test]
    fn test_constructor_helpers() {
        assert!(matches!(
            MeshError::unknown_agent("calc-agent"),
            MeshError::UnknownAgent { .. }
        ));
        assert!(matches!(
            MeshError::unknown_task("t-1"),
            MeshError::UnknownTask { .. }
        ));
        assert!(matches!(
            MeshError::transport("connection refused"),
            MeshError::Transport(_)
        ));
        assert_eq!(
            MeshError::handoff_failed("destination unreachable").to_string(),
            "Handoff failed: destination unreachable"
        );
    }

    #[test]
    fn test_delegation_timeout_display() {
        let err = MeshError::DelegationTimeout {
            task_id: "t-42".to_string(),
            timeout_ms: 5000,
        };
        assert!(err.to_string().contains("t-42"));
        assert!(err.to_string().contains("5000"));
    }
}
