//! In-memory tracking of delegated tasks
//!
//! Maps task ids to delegation metadata while a task is outstanding, holds
//! single-resolution waiters for callers blocked on a result, and keeps a
//! bounded FIFO history of completed delegations. All state sits behind one
//! mutex so the store stays correct even on a preemptive multi-threaded
//! runtime, though the engine itself only needs cooperative concurrency.

use crate::protocol::TaskResultMessage;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default cap on retained completed-delegation history
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Metadata captured when a delegation is submitted
#[derive(Debug, Clone, PartialEq)]
pub struct DelegationMetadata {
    pub target_agent_id: String,
    pub task_name: String,
    pub submitted_at: DateTime<Utc>,
}

struct PendingDelegation {
    meta: DelegationMetadata,
    waiters: Vec<oneshot::Sender<TaskResultMessage>>,
}

/// A finished delegation retained in the bounded history
#[derive(Debug, Clone)]
pub struct CompletedDelegation {
    pub task_id: String,
    pub meta: DelegationMetadata,
    pub result: TaskResultMessage,
    pub completed_at: DateTime<Utc>,
}

struct StoreInner {
    pending: HashMap<String, PendingDelegation>,
    completed: VecDeque<CompletedDelegation>,
}

/// Task-id keyed store of pending and completed delegations
pub struct TaskTrackingStore {
    inner: Mutex<StoreInner>,
    history_limit: usize,
}

impl Default for TaskTrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskTrackingStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                pending: HashMap::new(),
                completed: VecDeque::new(),
            }),
            history_limit,
        }
    }

    /// Register a delegation as pending. Must happen before the outbound send
    /// so a result arriving first is never lost.
    pub fn register_pending<S: Into<String>>(&self, task_id: S, meta: DelegationMetadata) {
        let task_id = task_id.into();
        let mut inner = self.inner.lock().expect("tracking store poisoned");
        if inner.pending.contains_key(&task_id) {
            warn!(task_id = %task_id, "re-registering pending delegation; replacing entry");
        }
        inner.pending.insert(
            task_id,
            PendingDelegation {
                meta,
                waiters: Vec::new(),
            },
        );
    }

    /// Register a single-resolution waiter for a pending task.
    ///
    /// Returns `None` when the task id is not pending (already completed or
    /// never registered).
    pub fn register_waiter(&self, task_id: &str) -> Option<oneshot::Receiver<TaskResultMessage>> {
        let mut inner = self.inner.lock().expect("tracking store poisoned");
        let entry = inner.pending.get_mut(task_id)?;
        let (tx, rx) = oneshot::channel();
        entry.waiters.push(tx);
        Some(rx)
    }

    /// Remove a pending entry without resolving it (send failure cleanup)
    pub fn discard_pending(&self, task_id: &str) {
        let mut inner = self.inner.lock().expect("tracking store poisoned");
        inner.pending.remove(task_id);
    }

    /// Apply an inbound result: move the task from pending to completed and
    /// resolve every registered waiter exactly once.
    ///
    /// A result for an unknown or already-resolved task id is logged and
    /// dropped; the call is a no-op and returns `false`.
    pub fn complete(&self, result: TaskResultMessage) -> bool {
        let mut inner = self.inner.lock().expect("tracking store poisoned");

        let Some(entry) = inner.pending.remove(&result.task_id) else {
            let known = inner
                .completed
                .iter()
                .any(|c| c.task_id == result.task_id);
            if known {
                debug!(task_id = %result.task_id, "duplicate result for resolved task; dropped");
            } else {
                warn!(task_id = %result.task_id, "result for unknown task; dropped");
            }
            return false;
        };

        for waiter in entry.waiters {
            // A waiter that timed out has dropped its receiver; ignore.
            let _ = waiter.send(result.clone());
        }

        inner.completed.push_back(CompletedDelegation {
            task_id: result.task_id.clone(),
            meta: entry.meta,
            result,
            completed_at: Utc::now(),
        });
        while inner.completed.len() > self.history_limit {
            inner.completed.pop_front();
        }

        true
    }

    pub fn is_pending(&self, task_id: &str) -> bool {
        let inner = self.inner.lock().expect("tracking store poisoned");
        inner.pending.contains_key(task_id)
    }

    pub fn pending_count(&self) -> usize {
        let inner = self.inner.lock().expect("tracking store poisoned");
        inner.pending.len()
    }

    pub fn completed_count(&self) -> usize {
        let inner = self.inner.lock().expect("tracking store poisoned");
        inner.completed.len()
    }

    /// Completed entry for a task id, if still within the history window
    pub fn completed(&self, task_id: &str) -> Option<CompletedDelegation> {
        let inner = self.inner.lock().expect("tracking store poisoned");
        inner
            .completed
            .iter()
            .find(|c| c.task_id == task_id)
            .cloned()
    }
}
