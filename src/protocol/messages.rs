//! Wire message types for the agentmesh task protocol
//!
//! This module defines all structures exchanged with remote agents: messages
//! and their typed parts, tasks with their lifecycle state, streaming deltas,
//! and the delegation request/result pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Role of a message author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

/// A single typed part of a message
///
/// Messages carry an ordered list of parts. Text parts hold user-visible
/// content; data parts carry structured payloads that routing predicates can
/// inspect via dotted paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text { content: String },
    Data { content: Value },
}

impl Part {
    /// Short type label used for rule matching ("text" or "data")
    pub fn type_label(&self) -> &'static str {
        match self {
            Part::Text { .. } => "text",
            Part::Data { .. } => "data",
        }
    }
}

/// Optional message header carrying routing hints and provenance metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageHeader {
    /// Target system hint for direct routing (bypasses rule evaluation when it
    /// names a registered handler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_system: Option<String>,
    /// Free-form metadata; handoffs record provenance here
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// A message in a task's conversation log
///
/// Immutable once constructed: the engine reads messages but never mutates
/// them after creation.
///
/// # Examples
/// ```
/// use agentmesh::protocol::{Message, Role};
///
/// let msg = Message::user_text("please calculate 2+2");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.text(), "please calculate 2+2");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    /// Ordered list of typed parts
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<MessageHeader>,
}

impl Message {
    /// Create a user message with a single text part
    pub fn user_text<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text {
                content: content.into(),
            }],
            header: None,
        }
    }

    /// Create an agent message with a single text part
    pub fn agent_text<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Agent,
            parts: vec![Part::Text {
                content: content.into(),
            }],
            header: None,
        }
    }

    /// Attach a target-system hint to this message
    pub fn with_target_system<S: Into<String>>(mut self, target: S) -> Self {
        self.header
            .get_or_insert_with(MessageHeader::default)
            .target_system = Some(target.into());
        self
    }

    /// Concatenated text content across all text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { content } => Some(content.as_str()),
                Part::Data { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Type label of the first part, used for message-type rule matching
    pub fn message_type(&self) -> Option<&'static str> {
        self.parts.first().map(Part::type_label)
    }

    /// Target-system hint from the header, if any
    pub fn target_system(&self) -> Option<&str> {
        self.header
            .as_ref()
            .and_then(|h| h.target_system.as_deref())
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }
}

/// A unit of stateful work owned by a single agent
///
/// The message log is append-only. Ownership transfers on handoff: a new Task
/// is created at the destination agent and the old Task is not mutated by the
/// orchestrator afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Last message authored by the remote agent, if any
    pub fn last_agent_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Agent)
    }
}

/// Partial task patch emitted by the streaming endpoint
///
/// Mirrors [`Task`] with every field optional; the terminal frame of a stream
/// has `done: true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub done: bool,
}

/// Envelope wrapping a task in wire responses (`{"task": {...}}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEnvelope {
    pub task: Task,
}

/// Request body for non-streaming and streaming sends (`{"message": {...}}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendMessageRequest {
    pub message: Message,
}

/// One SSE frame of a streaming send (`{"task": {...delta...}}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamFrame {
    pub task: TaskDelta,
}

/// Delegation request dispatched to a worker agent
///
/// The `task_id` doubles as the correlation key for the matching
/// [`TaskResultMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegatedTaskMessage {
    pub task_id: String,
    pub target_agent_id: String,
    pub task_name: String,
    pub task_input: Value,
    pub source_agent_id: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_priority() -> u8 {
    5
}

/// Terminal (or reported) status of a delegated task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

/// Asynchronous result correlated back to a delegated task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResultMessage {
    pub task_id: String,
    pub status: TaskResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TaskResultMessage {
    /// Successful completion result
    pub fn completed<S: Into<String>>(task_id: S, result: Value) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskResultStatus::Completed,
            result: Some(result),
            error_message: None,
        }
    }

    /// Failure result with an error description
    pub fn failed<S: Into<String>, E: Into<String>>(task_id: S, error: E) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskResultStatus::Failed,
            result: None,
            error_message: Some(error.into()),
        }
    }
}

/// Generate a fresh task id (UUID v4)
pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}
