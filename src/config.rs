//! Mesh configuration
//!
//! TOML-backed configuration for an orchestrator process: its identity, the
//! agent fleet (id to endpoint), limits, and the declarative route table.
//!
//! ```toml
//! [mesh]
//! id = "orchestrator"
//! max_routing_depth = 8
//!
//! [agents.research-agent]
//! endpoint = "http://localhost:8001"
//!
//! [[routes]]
//! source = "research-agent"
//! type = "sequential"
//! destinations = ["summarizer-agent"]
//! ```

use crate::orchestrator::routes::{AgentRoute, RouteKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Top-level mesh configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeshConfig {
    pub mesh: MeshSection,
    /// Agent id → endpoint
    #[serde(default)]
    pub agents: HashMap<String, AgentEndpoint>,
    /// Declarative route table applied at startup
    #[serde(default)]
    pub routes: Vec<AgentRoute>,
    #[serde(default)]
    pub delegation: DelegationSection,
}

/// Identity and limits of this orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeshSection {
    /// Orchestrator identifier (must match [a-zA-Z0-9._-]+); used as the
    /// source agent id on delegations
    pub id: String,
    /// Maximum agent-to-agent handoffs per logical task
    #[serde(default = "default_max_routing_depth")]
    pub max_routing_depth: usize,
}

fn default_max_routing_depth() -> usize {
    crate::orchestrator::DEFAULT_MAX_ROUTING_DEPTH
}

/// One remote agent's location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEndpoint {
    /// Base URL of the agent's task API
    pub endpoint: String,
}

/// Delegation tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationSection {
    /// Completed-delegation entries retained before FIFO eviction
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Default wait-for-result timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

fn default_history_limit() -> usize {
    crate::delegation::DEFAULT_HISTORY_LIMIT
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Load and validate a mesh configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MeshConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: MeshConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl MeshConfig {
    /// Validate identifiers, endpoints, and route references
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mesh.id.is_empty()
            || !self
                .mesh
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(ConfigError::Validation(format!(
                "mesh id '{}' must match [a-zA-Z0-9._-]+",
                self.mesh.id
            )));
        }

        if self.mesh.max_routing_depth == 0 {
            return Err(ConfigError::Validation(
                "max_routing_depth must be at least 1".to_string(),
            ));
        }

        for (agent_id, endpoint) in &self.agents {
            if !endpoint.endpoint.starts_with("http://")
                && !endpoint.endpoint.starts_with("https://")
            {
                return Err(ConfigError::Validation(format!(
                    "agent '{agent_id}' endpoint '{}' must be an http(s) URL",
                    endpoint.endpoint
                )));
            }
        }

        for route in &self.routes {
            route
                .validate()
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
            for destination in route_destinations(route) {
                if !self.agents.contains_key(destination) {
                    return Err(ConfigError::Validation(format!(
                        "route from '{}' targets unknown agent '{destination}'",
                        route.source
                    )));
                }
            }
        }

        Ok(())
    }

    /// Agent id → base endpoint map for the HTTP transport
    pub fn endpoint_map(&self) -> HashMap<String, String> {
        self.agents
            .iter()
            .map(|(id, ep)| (id.clone(), ep.endpoint.clone()))
            .collect()
    }
}

fn route_destinations(route: &AgentRoute) -> Vec<&str> {
    match &route.kind {
        RouteKind::Sequential { destinations } | RouteKind::Parallel { destinations } => {
            destinations.iter().map(String::as_str).collect()
        }
        RouteKind::Conditional { conditions } => {
            conditions.iter().map(|c| c.target.as_str()).collect()
        }
        // Dynamic targets are only known at resolution time
        RouteKind::Dynamic { .. } => Vec::new(),
    }
}
