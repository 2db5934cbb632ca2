//! Transport layer for agent communication
//!
//! Two seams live here, both behind traits for dependency injection and
//! testing: the task wire protocol spoken to remote agents
//! ([`AgentTransport`], implemented over HTTP in [`http`]) and the
//! fire-and-forget delegation channel ([`DelegationTransport`]).

use crate::error::MeshResult;
use crate::protocol::{DelegatedTaskMessage, Message, Task, TaskDelta};
use futures::Stream;
use std::pin::Pin;

pub mod http;

/// Lazy, finite stream of task deltas; ends after the `done: true` frame
pub type DeltaStream = Pin<Box<dyn Stream<Item = MeshResult<TaskDelta>> + Send>>;

/// Task wire protocol spoken to a remote agent
#[async_trait::async_trait]
pub trait AgentTransport: Send + Sync {
    /// Create a task on the given agent
    async fn create_task(&self, agent_id: &str) -> MeshResult<Task>;

    /// Fetch a task's current state
    async fn get_task(&self, agent_id: &str, task_id: &str) -> MeshResult<Task>;

    /// Send a message to a task and return the updated task
    async fn send_message(
        &self,
        agent_id: &str,
        task_id: &str,
        message: &Message,
    ) -> MeshResult<Task>;

    /// Send a message and stream back partial task deltas
    async fn send_message_streaming(
        &self,
        agent_id: &str,
        task_id: &str,
        message: &Message,
    ) -> MeshResult<DeltaStream>;

    /// Cancel a task
    async fn cancel_task(&self, agent_id: &str, task_id: &str) -> MeshResult<Task>;
}

/// Outbound channel for delegation messages
///
/// Fire-and-forget from the delegator's perspective; results come back
/// through the delegator's inbound callback, not this trait.
#[async_trait::async_trait]
pub trait DelegationTransport: Send + Sync {
    async fn send(&self, target_agent_id: &str, message: &DelegatedTaskMessage) -> MeshResult<()>;
}

pub use http::HttpAgentClient;
