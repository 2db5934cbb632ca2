//! One-shot task delegation with optional result correlation
//!
//! The delegator dispatches a [`DelegatedTaskMessage`] to a worker agent
//! through an injected transport. Fire-and-forget callers get the task id
//! back immediately; correlated callers block on a single-resolution waiter
//! until the matching [`TaskResultMessage`] arrives or a timeout fires. On
//! timeout the pending tracking entry is left in place, so a late result is
//! still observed and absorbed even though the caller already gave up.

use crate::delegation::tracker::{DelegationMetadata, TaskTrackingStore};
use crate::error::{MeshError, MeshResult};
use crate::protocol::{new_task_id, DelegatedTaskMessage, TaskResultMessage, TaskResultStatus};
use crate::transport::DelegationTransport;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-call delegation knobs
#[derive(Debug, Clone, Default)]
pub struct DelegationOptions {
    /// Reuse a caller-supplied task id instead of generating one
    pub task_id: Option<String>,
    /// Priority hint forwarded on the wire (default 5)
    pub priority: Option<u8>,
    /// Advisory timeout forwarded to the worker
    pub timeout: Option<Duration>,
}

/// Dispatches tasks to worker agents and correlates asynchronous results
pub struct TaskDelegator {
    store: Arc<TaskTrackingStore>,
    transport: Arc<dyn DelegationTransport>,
    source_agent_id: String,
}

impl TaskDelegator {
    pub fn new<S: Into<String>>(source_agent_id: S, transport: Arc<dyn DelegationTransport>) -> Self {
        Self {
            store: Arc::new(TaskTrackingStore::new()),
            transport,
            source_agent_id: source_agent_id.into(),
        }
    }

    /// Use a shared tracking store instead of a private one
    pub fn with_store(mut self, store: Arc<TaskTrackingStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<TaskTrackingStore> {
        &self.store
    }

    /// Record a delegation as pending ahead of dispatch
    fn register(&self, task_id: &str, task_name: &str, target_agent_id: &str) {
        self.store.register_pending(
            task_id,
            DelegationMetadata {
                target_agent_id: target_agent_id.to_string(),
                task_name: task_name.to_string(),
                submitted_at: Utc::now(),
            },
        );
    }

    /// Build the wire message and send it. A transport failure discards the
    /// pending entry and surfaces immediately.
    async fn dispatch(
        &self,
        task_id: &str,
        task_name: &str,
        input: Value,
        target_agent_id: &str,
        options: &DelegationOptions,
    ) -> MeshResult<()> {
        let message = DelegatedTaskMessage {
            task_id: task_id.to_string(),
            target_agent_id: target_agent_id.to_string(),
            task_name: task_name.to_string(),
            task_input: input,
            source_agent_id: self.source_agent_id.clone(),
            priority: options.priority.unwrap_or(5),
            timeout_secs: options.timeout.map(|t| t.as_secs()),
        };

        if let Err(e) = self.transport.send(target_agent_id, &message).await {
            self.store.discard_pending(task_id);
            return Err(e);
        }

        info!(task_id = %task_id, target = %target_agent_id, task = %task_name,
              "task delegated");
        Ok(())
    }

    /// Fire-and-forget delegation: register as pending, send, return the
    /// task id. An unreachable transport surfaces immediately and the
    /// pending entry is discarded.
    pub async fn delegate(
        &self,
        task_name: &str,
        input: Value,
        target_agent_id: &str,
        options: DelegationOptions,
    ) -> MeshResult<String> {
        let task_id = options.task_id.clone().unwrap_or_else(new_task_id);

        // Pending registration precedes the send so a result that races the
        // send call is never lost.
        self.register(&task_id, task_name, target_agent_id);
        self.dispatch(&task_id, task_name, input, target_agent_id, &options)
            .await?;
        Ok(task_id)
    }

    /// Delegate and block until the correlated result arrives.
    ///
    /// With a timeout, elapses into [`MeshError::DelegationTimeout`]; the
    /// underlying delegation stays outstanding (no implicit retry). A result
    /// with any terminal status other than `completed` becomes
    /// [`MeshError::DelegationFailed`].
    pub async fn delegate_and_wait(
        &self,
        task_name: &str,
        input: Value,
        target_agent_id: &str,
        options: DelegationOptions,
    ) -> MeshResult<TaskResultMessage> {
        let timeout = options.timeout;
        let task_id = options.task_id.clone().unwrap_or_else(new_task_id);

        // The waiter goes in alongside the pending entry, ahead of the send,
        // so a result applied while the send is still in flight resolves it
        // instead of vanishing.
        self.register(&task_id, task_name, target_agent_id);
        let receiver = self.store.register_waiter(&task_id).ok_or_else(|| {
            MeshError::internal(format!("task {task_id} not pending after registration"))
        })?;
        self.dispatch(&task_id, task_name, input, target_agent_id, &options)
            .await?;

        let result = match timeout {
            Some(duration) => match tokio::time::timeout(duration, receiver).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    return Err(MeshError::internal(format!(
                        "waiter for task {task_id} dropped without resolution"
                    )))
                }
                Err(_) => {
                    warn!(task_id = %task_id, timeout_ms = duration.as_millis() as u64,
                          "delegation timed out; pending entry retained");
                    return Err(MeshError::DelegationTimeout {
                        task_id,
                        timeout_ms: duration.as_millis() as u64,
                    });
                }
            },
            None => receiver.await.map_err(|_| {
                MeshError::internal(format!(
                    "waiter for task {task_id} dropped without resolution"
                ))
            })?,
        };

        match result.status {
            TaskResultStatus::Completed => Ok(result),
            status => Err(MeshError::DelegationFailed {
                task_id,
                message: result
                    .error_message
                    .unwrap_or_else(|| format!("task ended with status {status:?}")),
            }),
        }
    }

    /// Inbound transport callback: apply a correlated result.
    ///
    /// Duplicate or unknown results are logged and dropped (idempotent).
    pub fn handle_task_result(&self, result: TaskResultMessage) -> bool {
        debug!(task_id = %result.task_id, status = ?result.status, "task result received");
        self.store.complete(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records sends; can assert pending state at send time and simulate
    /// unreachable targets.
    struct RecordingTransport {
        sent: Mutex<Vec<DelegatedTaskMessage>>,
        store: Mutex<Option<Arc<TaskTrackingStore>>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                store: Mutex::new(None),
                fail: false,
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                store: Mutex::new(None),
                fail: true,
            })
        }

        fn watch_store(&self, store: Arc<TaskTrackingStore>) {
            *self.store.lock().unwrap() = Some(store);
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DelegationTransport for RecordingTransport {
        async fn send(
            &self,
            _target_agent_id: &str,
            message: &DelegatedTaskMessage,
        ) -> MeshResult<()> {
            if self.fail {
                return Err(MeshError::transport("connection refused"));
            }
            // The delegation must already be pending when the send happens
            if let Some(store) = self.store.lock().unwrap().as_ref() {
                assert!(store.is_pending(&message.task_id));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delegate_returns_generated_task_id() {
        let transport = RecordingTransport::new();
        let delegator = TaskDelegator::new("orchestrator", transport.clone());

        let task_id = delegator
            .delegate("summarize", json!({"text": "..."}), "worker", Default::default())
            .await
            .unwrap();

        assert!(!task_id.is_empty());
        assert!(delegator.store().is_pending(&task_id));
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_registered_before_send() {
        let transport = RecordingTransport::new();
        let delegator = TaskDelegator::new("orchestrator", transport.clone());
        transport.watch_store(delegator.store().clone());

        // RecordingTransport asserts is_pending inside send
        delegator
            .delegate("summarize", json!({}), "worker", Default::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_caller_supplied_task_id_and_priority() {
        let transport = RecordingTransport::new();
        let delegator = TaskDelegator::new("orchestrator", transport.clone());

        let task_id = delegator
            .delegate(
                "summarize",
                json!({}),
                "worker",
                DelegationOptions {
                    task_id: Some("my-task".to_string()),
                    priority: Some(9),
                    timeout: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(task_id, "my-task");
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].priority, 9);
        assert_eq!(sent[0].source_agent_id, "orchestrator");
    }

    #[tokio::test]
    async fn test_unreachable_transport_surfaces_immediately() {
        let transport = RecordingTransport::unreachable();
        let delegator = TaskDelegator::new("orchestrator", transport);

        let result = delegator
            .delegate("summarize", json!({}), "worker", Default::default())
            .await;

        assert!(matches!(result, Err(MeshError::Transport(_))));
        assert_eq!(delegator.store().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_resolves_on_result() {
        let transport = RecordingTransport::new();
        let delegator = Arc::new(TaskDelegator::new("orchestrator", transport));

        let waiter = {
            let delegator = delegator.clone();
            tokio::spawn(async move {
                delegator
                    .delegate_and_wait(
                        "summarize",
                        json!({}),
                        "worker",
                        DelegationOptions {
                            task_id: Some("t-wait".to_string()),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };

        // Let the delegation register and start waiting
        tokio::task::yield_now().await;
        while !delegator.store().is_pending("t-wait") {
            tokio::task::yield_now().await;
        }

        assert!(delegator.handle_task_result(TaskResultMessage::completed(
            "t-wait",
            json!({"summary": "done"})
        )));

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result.result, Some(json!({"summary": "done"})));
    }

    /// Applies a completed result inside `send`, before the send call
    /// returns to the delegator.
    struct InlineWorkerTransport {
        store: Mutex<Option<Arc<TaskTrackingStore>>>,
    }

    impl InlineWorkerTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                store: Mutex::new(None),
            })
        }

        fn watch_store(&self, store: Arc<TaskTrackingStore>) {
            *self.store.lock().unwrap() = Some(store);
        }
    }

    #[async_trait]
    impl DelegationTransport for InlineWorkerTransport {
        async fn send(
            &self,
            _target_agent_id: &str,
            message: &DelegatedTaskMessage,
        ) -> MeshResult<()> {
            let store = self.store.lock().unwrap().as_ref().unwrap().clone();
            store.complete(TaskResultMessage::completed(
                &message.task_id,
                json!({"echo": message.task_input}),
            ));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_result_arriving_during_send_is_not_lost() {
        let transport = InlineWorkerTransport::new();
        let delegator = TaskDelegator::new("orchestrator", transport.clone());
        transport.watch_store(delegator.store().clone());

        let result = delegator
            .delegate_and_wait("summarize", json!({"n": 1}), "worker", Default::default())
            .await
            .unwrap();

        assert_eq!(result.status, TaskResultStatus::Completed);
        assert_eq!(result.result, Some(json!({"echo": {"n": 1}})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_leaves_pending() {
        let transport = RecordingTransport::new();
        let delegator = TaskDelegator::new("orchestrator", transport);

        let result = delegator
            .delegate_and_wait(
                "summarize",
                json!({}),
                "worker",
                DelegationOptions {
                    task_id: Some("t-slow".to_string()),
                    timeout: Some(Duration::from_secs(5)),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(MeshError::DelegationTimeout { timeout_ms: 5000, .. })
        ));
        // Entry stays pending so a late result can still be absorbed
        assert!(delegator.store().is_pending("t-slow"));

        let late = TaskResultMessage::completed("t-slow", json!(null));
        assert!(delegator.handle_task_result(late));
        assert!(!delegator.store().is_pending("t-slow"));
    }

    #[tokio::test]
    async fn test_failed_result_resolves_wait_with_error() {
        let transport = RecordingTransport::new();
        let delegator = Arc::new(TaskDelegator::new("orchestrator", transport));

        let waiter = {
            let delegator = delegator.clone();
            tokio::spawn(async move {
                delegator
                    .delegate_and_wait(
                        "summarize",
                        json!({}),
                        "worker",
                        DelegationOptions {
                            task_id: Some("t-fail".to_string()),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };

        while !delegator.store().is_pending("t-fail") {
            tokio::task::yield_now().await;
        }
        delegator.handle_task_result(TaskResultMessage::failed("t-fail", "worker crashed"));

        let result = waiter.await.unwrap();
        match result {
            Err(MeshError::DelegationFailed { message, .. }) => {
                assert_eq!(message, "worker crashed");
            }
            other => panic!("expected DelegationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_results_resolve_once() {
        let transport = RecordingTransport::new();
        let delegator = TaskDelegator::new("orchestrator", transport);

        delegator
            .delegate(
                "summarize",
                json!({}),
                "worker",
                DelegationOptions {
                    task_id: Some("t-dup".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let before = delegator.store().pending_count();
        assert!(delegator.handle_task_result(TaskResultMessage::completed("t-dup", json!("a"))));
        assert!(!delegator.handle_task_result(TaskResultMessage::completed("t-dup", json!("b"))));

        assert_eq!(delegator.store().pending_count(), before - 1);
        assert_eq!(
            delegator.store().completed("t-dup").unwrap().result.result,
            Some(json!("a"))
        );
    }
}
