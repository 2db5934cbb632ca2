//! Cross-agent task orchestration
//!
//! The orchestrator holds a declarative route table and the per-task
//! bookkeeping needed to move a task between agents. After every send it
//! inspects the task's state; when a task completes, the route table decides
//! whether to re-home it onto another agent. A handoff creates a fresh task
//! at the destination, flattens the prior conversation into one synthetic
//! user message carrying routing provenance, and is bounded by a maximum
//! routing depth so cyclic route tables always terminate.

use crate::error::{MeshError, MeshResult};
use crate::protocol::{Message, MessageHeader, Part, Role, Task, TaskDelta, TaskState};
use crate::transport::AgentTransport;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub mod group;
pub mod path;
pub mod routes;

pub use group::{ParallelTaskGroup, SequentialTaskChain};
pub use routes::{AgentRoute, ConditionOp, DynamicRouterFn, RouteCondition, RouteKind};

use futures::StreamExt;

/// Default bound on agent-to-agent handoffs for one logical task
pub const DEFAULT_MAX_ROUTING_DEPTH: usize = 8;

/// Orchestrator-local bookkeeping for one task id
///
/// Created on `create_task` and on every handoff, updated on every send,
/// never deleted (bounded by process lifetime).
#[derive(Debug, Clone)]
pub struct TaskHandler {
    pub task_id: String,
    /// Agent the task physically lives on; never changes for a task id
    pub owner_agent: String,
    /// Agent currently responsible for the logical task (follows handoffs)
    pub current_agent: String,
    /// Agents visited so far, entry point first; its length bounds depth
    pub agent_history: Vec<String>,
    pub last_state: TaskState,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Result of one completed handoff
#[derive(Debug, Clone)]
pub struct Handoff {
    /// The task created at the destination, after the synthetic send
    pub task: Task,
    pub from_agent: String,
    pub to_agent: String,
    /// 1-based hop index for this logical task
    pub step: usize,
}

/// Moves tasks between agents according to the route table
///
/// Cheap to clone; clones share the route table, handler map, and transport.
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn AgentTransport>,
    routes: Arc<RwLock<Vec<AgentRoute>>>,
    routers: Arc<RwLock<HashMap<String, DynamicRouterFn>>>,
    handlers: Arc<Mutex<HashMap<String, TaskHandler>>>,
    max_routing_depth: usize,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            transport,
            routes: Arc::new(RwLock::new(Vec::new())),
            routers: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            max_routing_depth: DEFAULT_MAX_ROUTING_DEPTH,
        }
    }

    pub fn with_max_routing_depth(mut self, depth: usize) -> Self {
        self.max_routing_depth = depth;
        self
    }

    /// Register a dynamic router function under a name routes can reference
    pub fn register_dynamic_router<S: Into<String>>(&self, name: S, router: DynamicRouterFn) {
        self.routers
            .write()
            .expect("router registry poisoned")
            .insert(name.into(), router);
    }

    /// Add a route after validating its invariants. Dynamic routes must name
    /// an already-registered router.
    pub fn add_route(&self, route: AgentRoute) -> MeshResult<()> {
        route.validate()?;
        if let RouteKind::Dynamic { router } = &route.kind {
            let registered = self
                .routers
                .read()
                .expect("router registry poisoned")
                .contains_key(router);
            if !registered {
                return Err(MeshError::invalid_route(format!(
                    "dynamic route from '{}' names unregistered router '{}'",
                    route.source, router
                )));
            }
        }
        self.routes.write().expect("route table poisoned").push(route);
        Ok(())
    }

    /// Bookkeeping entry for a task id, if known to this orchestrator
    pub fn task_handler(&self, task_id: &str) -> Option<TaskHandler> {
        self.handlers
            .lock()
            .expect("handler map poisoned")
            .get(task_id)
            .cloned()
    }

    fn owner_of(&self, task_id: &str) -> MeshResult<String> {
        self.task_handler(task_id)
            .map(|h| h.owner_agent)
            .ok_or_else(|| MeshError::unknown_task(task_id))
    }

    fn note_state(&self, task_id: &str, state: TaskState) {
        let mut handlers = self.handlers.lock().expect("handler map poisoned");
        if let Some(entry) = handlers.get_mut(task_id) {
            entry.last_state = state;
        }
    }

    /// Create a task at the entry agent and start tracking it
    pub async fn create_task(&self, entry_agent_id: &str) -> MeshResult<Task> {
        let task = self.transport.create_task(entry_agent_id).await?;
        info!(agent = %entry_agent_id, task_id = %task.id, "task created");

        let mut handlers = self.handlers.lock().expect("handler map poisoned");
        handlers.insert(
            task.id.clone(),
            TaskHandler {
                task_id: task.id.clone(),
                owner_agent: entry_agent_id.to_string(),
                current_agent: entry_agent_id.to_string(),
                agent_history: vec![entry_agent_id.to_string()],
                last_state: task.state,
                metadata: HashMap::new(),
            },
        );
        Ok(task)
    }

    /// Fetch a task from the agent that owns it
    pub async fn get_task(&self, task_id: &str) -> MeshResult<Task> {
        let owner = self.owner_of(task_id)?;
        self.transport.get_task(&owner, task_id).await
    }

    /// Cancel a task at its owning agent
    pub async fn cancel_task(&self, task_id: &str) -> MeshResult<Task> {
        let owner = self.owner_of(task_id)?;
        let task = self.transport.cancel_task(&owner, task_id).await?;
        self.note_state(task_id, task.state);
        Ok(task)
    }

    /// Send a message to a task, following handoffs while the task keeps
    /// completing and routes keep matching.
    ///
    /// Returns the final task, which carries a new id when the task was
    /// re-homed. Exceeding the routing depth raises an error at the hop that
    /// would exceed it; a task with no matching route simply stays where it
    /// is.
    pub async fn send_message(&self, task_id: &str, message: Message) -> MeshResult<Task> {
        let handler = self
            .task_handler(task_id)
            .ok_or_else(|| MeshError::unknown_task(task_id))?;

        let mut task = self
            .transport
            .send_message(&handler.owner_agent, task_id, &message)
            .await?;
        self.note_state(task_id, task.state);

        let mut active_id = task_id.to_string();
        while task.state == TaskState::Completed {
            match self.route_after_completion(&active_id, &task).await? {
                Some(handoff) => {
                    active_id = handoff.task.id.clone();
                    task = handoff.task;
                }
                None => break,
            }
        }
        Ok(task)
    }

    /// Consult the route table for the agent a completed task should move to.
    ///
    /// First route whose source matches the current agent applies:
    /// sequential and parallel routes pick their first destination (parallel
    /// logs the single-destination limitation; use [`ParallelTaskGroup`] for
    /// true fan-out), conditional routes pick the first satisfied condition
    /// in declared order, dynamic routes defer to the registered router.
    pub fn resolve_next_agent(&self, current_agent: &str, task: &Task) -> Option<String> {
        let route = {
            let routes = self.routes.read().expect("route table poisoned");
            routes.iter().find(|r| r.source == current_agent).cloned()
        }?;

        match &route.kind {
            RouteKind::Sequential { destinations } => destinations.first().cloned(),
            RouteKind::Conditional { conditions } => {
                let task_value = match serde_json::to_value(task) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "task serialization failed");
                        return None;
                    }
                };
                conditions
                    .iter()
                    .find(|c| c.matches(&task_value))
                    .map(|c| c.target.clone())
            }
            RouteKind::Parallel { destinations } => {
                warn!(
                    source = %current_agent,
                    "parallel route forwards to its first destination only; \
                     use ParallelTaskGroup for fan-out"
                );
                destinations.first().cloned()
            }
            RouteKind::Dynamic { router } => {
                let func = self
                    .routers
                    .read()
                    .expect("router registry poisoned")
                    .get(router)
                    .cloned();
                match func {
                    Some(func) => match func(task) {
                        Ok(next) => next,
                        Err(e) => {
                            warn!(router = %router, error = %e,
                                  "dynamic router failed; treating as no route");
                            None
                        }
                    },
                    None => {
                        warn!(router = %router, "dynamic router not registered; no route");
                        None
                    }
                }
            }
        }
    }

    /// Run the post-completion routing check for one task and, when a route
    /// matches, perform the handoff.
    async fn route_after_completion(
        &self,
        task_id: &str,
        task: &Task,
    ) -> MeshResult<Option<Handoff>> {
        let handler = self
            .task_handler(task_id)
            .ok_or_else(|| MeshError::unknown_task(task_id))?;

        let Some(next_agent) = self.resolve_next_agent(&handler.current_agent, task) else {
            debug!(task_id = %task_id, agent = %handler.current_agent, "no route; task stays");
            return Ok(None);
        };

        let hops_so_far = handler.agent_history.len().saturating_sub(1);
        let step = hops_so_far + 1;
        if step > self.max_routing_depth {
            return Err(MeshError::RoutingDepthExceeded {
                current: step,
                max: self.max_routing_depth,
            });
        }

        info!(task_id = %task_id, from = %handler.current_agent, to = %next_agent, step,
              "routing completed task");

        let new_task = self
            .transport
            .create_task(&next_agent)
            .await
            .map_err(|e| {
                MeshError::handoff_failed(format!("creating task on '{next_agent}': {e}"))
            })?;

        let synthetic = build_handoff_message(task, &handler, step);
        let updated = self
            .transport
            .send_message(&next_agent, &new_task.id, &synthetic)
            .await
            .map_err(|e| {
                MeshError::handoff_failed(format!("forwarding context to '{next_agent}': {e}"))
            })?;

        let mut new_history = handler.agent_history.clone();
        new_history.push(next_agent.clone());
        {
            let mut handlers = self.handlers.lock().expect("handler map poisoned");
            handlers.insert(
                updated.id.clone(),
                TaskHandler {
                    task_id: updated.id.clone(),
                    owner_agent: next_agent.clone(),
                    current_agent: next_agent.clone(),
                    agent_history: new_history.clone(),
                    last_state: updated.state,
                    metadata: HashMap::new(),
                },
            );
            if let Some(original) = handlers.get_mut(task_id) {
                original.current_agent = next_agent.clone();
                original.agent_history = new_history;
                original
                    .metadata
                    .insert("routed_to".to_string(), json!(updated.id));
                original
                    .metadata
                    .insert("routing_step".to_string(), json!(step));
            }
        }

        Ok(Some(Handoff {
            task: updated,
            from_agent: handler.current_agent,
            to_agent: next_agent,
            step,
        }))
    }

    /// Streaming variant of [`send_message`].
    ///
    /// Deltas are forwarded as they arrive. When the terminal (`done: true`)
    /// frame is observed the same post-completion routing check runs once;
    /// on a handoff a synthetic routing-notification delta is emitted before
    /// the terminal frame.
    pub async fn send_message_streaming(
        &self,
        task_id: &str,
        message: Message,
    ) -> MeshResult<mpsc::Receiver<MeshResult<TaskDelta>>> {
        let handler = self
            .task_handler(task_id)
            .ok_or_else(|| MeshError::unknown_task(task_id))?;

        let mut stream = self
            .transport
            .send_message_streaming(&handler.owner_agent, task_id, &message)
            .await?;

        let (tx, rx) = mpsc::channel(16);
        let orchestrator = self.clone();
        let task_id = task_id.to_string();

        tokio::spawn(async move {
            let mut terminal: Option<TaskDelta> = None;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(delta) => {
                        if let Some(state) = delta.state {
                            orchestrator.note_state(&task_id, state);
                        }
                        if delta.done {
                            terminal = Some(delta);
                            break;
                        }
                        if tx.send(Ok(delta)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let Some(terminal) = terminal else {
                // Stream closed without a terminal frame; nothing to route
                return;
            };

            // Completion may have been reported by any frame in the stream,
            // not just the terminal one; consult the tracked state.
            let completed = terminal.state == Some(TaskState::Completed)
                || orchestrator
                    .task_handler(&task_id)
                    .map(|h| h.last_state == TaskState::Completed)
                    .unwrap_or(false);

            if completed {
                match orchestrator.get_task(&task_id).await {
                    Ok(task) => match orchestrator.route_after_completion(&task_id, &task).await {
                        Ok(Some(handoff)) => {
                            let note = TaskDelta {
                                id: Some(handoff.task.id.clone()),
                                state: Some(handoff.task.state),
                                messages: Some(vec![Message::agent_text(format!(
                                    "task routed from '{}' to '{}' (step {})",
                                    handoff.from_agent, handoff.to_agent, handoff.step
                                ))]),
                                done: false,
                                ..Default::default()
                            };
                            if tx.send(Ok(note)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    },
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let _ = tx.send(Ok(terminal)).await;
        });

        Ok(rx)
    }
}

/// Flatten a task's conversation into one synthetic user message carrying
/// routing provenance in its header metadata.
fn build_handoff_message(task: &Task, handler: &TaskHandler, step: usize) -> Message {
    let flattened = task
        .messages
        .iter()
        .filter_map(|m| {
            let text = m.text();
            if text.is_empty() {
                None
            } else {
                let role = match m.role {
                    Role::User => "user",
                    Role::Agent => "agent",
                    Role::System => "system",
                };
                Some(format!("[{role}] {text}"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut header = MessageHeader::default();
    header
        .metadata
        .insert("routed_from".to_string(), json!(handler.current_agent));
    header
        .metadata
        .insert("original_task_id".to_string(), json!(task.id));
    header
        .metadata
        .insert("agent_history".to_string(), json!(handler.agent_history));
    header
        .metadata
        .insert("routing_step".to_string(), json!(step));

    Message {
        role: Role::User,
        parts: vec![Part::Text { content: flattened }],
        header: Some(header),
    }
}
