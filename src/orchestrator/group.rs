//! Pipeline and fan-out composition over the orchestrator
//!
//! [`SequentialTaskChain`] wires a linear agent pipeline and rides the
//! orchestrator's handoff logic to advance on completion.
//! [`ParallelTaskGroup`] is the true fan-out primitive: one independent task
//! per agent, broadcast sends, best-effort result collection.

use crate::error::{MeshError, MeshResult};
use crate::orchestrator::routes::AgentRoute;
use crate::orchestrator::Orchestrator;
use crate::protocol::{Message, Task};
use std::collections::HashMap;
use tracing::warn;

/// Linear multi-agent pipeline
///
/// Holds an ordered agent list and the active task id; advancing from one
/// agent to the next is delegated to the orchestrator's post-completion
/// handoff, so the task id changes as it moves down the pipeline.
pub struct SequentialTaskChain {
    orchestrator: Orchestrator,
    agents: Vec<String>,
    current_index: usize,
    task_id: Option<String>,
    /// Task ids visited, entry task first
    visited: Vec<String>,
}

impl SequentialTaskChain {
    /// Build a chain and install the sequential routes linking its agents
    pub fn new(orchestrator: Orchestrator, agents: Vec<String>) -> MeshResult<Self> {
        if agents.is_empty() {
            return Err(MeshError::invalid_route("chain needs at least one agent"));
        }
        for pair in agents.windows(2) {
            orchestrator.add_route(AgentRoute::sequential(
                pair[0].clone(),
                vec![pair[1].clone()],
            ))?;
        }
        Ok(Self {
            orchestrator,
            agents,
            current_index: 0,
            task_id: None,
            visited: Vec::new(),
        })
    }

    /// Create the entry task at the first agent
    pub async fn start(&mut self) -> MeshResult<Task> {
        let task = self.orchestrator.create_task(&self.agents[0]).await?;
        self.task_id = Some(task.id.clone());
        self.visited.push(task.id.clone());
        self.current_index = 0;
        Ok(task)
    }

    /// Send a message to the active task; completion advances the chain
    pub async fn send(&mut self, text: &str) -> MeshResult<Task> {
        let task_id = self
            .task_id
            .clone()
            .ok_or_else(|| MeshError::internal("chain not started"))?;

        let task = self
            .orchestrator
            .send_message(&task_id, Message::user_text(text))
            .await?;

        if task.id != task_id {
            self.visited.push(task.id.clone());
            self.task_id = Some(task.id.clone());
        }
        if let Some(handler) = self.orchestrator.task_handler(&task.id) {
            if let Some(pos) = self.agents.iter().position(|a| *a == handler.current_agent) {
                self.current_index = pos;
            }
        }
        Ok(task)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_agent(&self) -> &str {
        &self.agents[self.current_index]
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Flattened conversation across every task the chain has visited
    pub async fn history(&self) -> MeshResult<Vec<Message>> {
        let mut messages = Vec::new();
        for task_id in &self.visited {
            let task = self.orchestrator.get_task(task_id).await?;
            messages.extend(task.messages);
        }
        Ok(messages)
    }
}

/// Fan-out/fan-in over N independent tasks
pub struct ParallelTaskGroup {
    orchestrator: Orchestrator,
    agents: Vec<String>,
    /// agent id → task id
    tasks: HashMap<String, String>,
}

impl ParallelTaskGroup {
    pub fn new(orchestrator: Orchestrator, agents: Vec<String>) -> MeshResult<Self> {
        if agents.is_empty() {
            return Err(MeshError::invalid_route("group needs at least one agent"));
        }
        Ok(Self {
            orchestrator,
            agents,
            tasks: HashMap::new(),
        })
    }

    /// Create one task per agent
    pub async fn start(&mut self) -> MeshResult<()> {
        for agent in &self.agents {
            let task = self.orchestrator.create_task(agent).await?;
            self.tasks.insert(agent.clone(), task.id);
        }
        Ok(())
    }

    /// Fan a message out to every agent's task.
    ///
    /// Sends run concurrently; one agent failing does not abort the others.
    /// Returns the per-agent outcome.
    pub async fn broadcast(&self, text: &str) -> HashMap<String, MeshResult<Task>> {
        let sends = self.agents.iter().filter_map(|agent| {
            let task_id = self.tasks.get(agent)?.clone();
            let orchestrator = self.orchestrator.clone();
            let agent = agent.clone();
            let text = text.to_string();
            Some(async move {
                let result = orchestrator
                    .send_message(&task_id, Message::user_text(text))
                    .await;
                (agent, result)
            })
        });

        futures::future::join_all(sends).await.into_iter().collect()
    }

    /// Best-effort fan-in: each task's last agent message text.
    ///
    /// An agent whose task cannot be read or has produced no reply yields
    /// `None`; other agents' results are still returned.
    pub async fn collect_results(&self) -> HashMap<String, Option<String>> {
        let mut results = HashMap::new();
        for (agent, task_id) in &self.tasks {
            let value = match self.orchestrator.get_task(task_id).await {
                Ok(task) => task.last_agent_message().map(|m| m.text()),
                Err(e) => {
                    warn!(agent = %agent, task_id = %task_id, error = %e,
                          "result collection failed for agent");
                    None
                }
            };
            results.insert(agent.clone(), value);
        }
        results
    }

    pub fn task_id_for(&self, agent: &str) -> Option<&str> {
        self.tasks.get(agent).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::test_support::MockAgentFleet;

    #[tokio::test]
    async fn test_chain_advances_on_completion() {
        let fleet = MockAgentFleet::new();
        fleet.script_reply("research-agent", "findings");
        fleet.script_reply("summarizer-agent", "summary");
        let orch = Orchestrator::new(fleet);

        let mut chain = SequentialTaskChain::new(
            orch,
            vec!["research-agent".to_string(), "summarizer-agent".to_string()],
        )
        .unwrap();

        let entry = chain.start().await.unwrap();
        assert_eq!(chain.current_index(), 0);

        let task = chain.send("dig into this").await.unwrap();

        // Completion routed the task to the summarizer: index advanced and
        // the active task id changed
        assert_eq!(chain.current_index(), 1);
        assert_eq!(chain.current_agent(), "summarizer-agent");
        assert_ne!(task.id, entry.id);
        assert_eq!(chain.task_id(), Some(task.id.as_str()));
    }

    #[tokio::test]
    async fn test_chain_history_spans_agents() {
        let fleet = MockAgentFleet::new();
        fleet.script_reply("a", "reply-from-a");
        fleet.script_reply("b", "reply-from-b");
        let orch = Orchestrator::new(fleet);

        let mut chain =
            SequentialTaskChain::new(orch, vec!["a".to_string(), "b".to_string()]).unwrap();
        chain.start().await.unwrap();
        chain.send("kick off").await.unwrap();

        let history = chain.history().await.unwrap();
        let texts: Vec<String> = history.iter().map(|m| m.text()).collect();
        assert!(texts.iter().any(|t| t.contains("reply-from-a")));
        assert!(texts.iter().any(|t| t.contains("reply-from-b")));
    }

    #[tokio::test]
    async fn test_chain_send_before_start_errors() {
        let fleet = MockAgentFleet::new();
        let orch = Orchestrator::new(fleet);
        let mut chain = SequentialTaskChain::new(orch, vec!["a".to_string()]).unwrap();
        assert!(chain.send("too early").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_chain_rejected() {
        let fleet = MockAgentFleet::new();
        let orch = Orchestrator::new(fleet);
        assert!(SequentialTaskChain::new(orch, vec![]).is_err());
    }

    #[tokio::test]
    async fn test_group_creates_independent_tasks() {
        let fleet = MockAgentFleet::new();
        let orch = Orchestrator::new(fleet);
        let mut group = ParallelTaskGroup::new(
            orch,
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        )
        .unwrap();

        group.start().await.unwrap();
        let ids: Vec<&str> = ["a", "b", "c"]
            .iter()
            .map(|agent| group.task_id_for(agent).unwrap())
            .collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[tokio::test]
    async fn test_group_broadcast_and_collect() {
        let fleet = MockAgentFleet::new();
        fleet.script_reply("a", "answer-a");
        fleet.script_reply("b", "answer-b");
        let orch = Orchestrator::new(fleet);
        let mut group =
            ParallelTaskGroup::new(orch, vec!["a".to_string(), "b".to_string()]).unwrap();

        group.start().await.unwrap();
        let outcomes = group.broadcast("same question").await;
        assert!(outcomes.values().all(|r| r.is_ok()));

        let results = group.collect_results().await;
        assert_eq!(results["a"].as_deref(), Some("answer-a"));
        assert_eq!(results["b"].as_deref(), Some("answer-b"));
    }

    #[tokio::test]
    async fn test_group_partial_failure_does_not_abort_collection() {
        let fleet = MockAgentFleet::new();
        fleet.script_reply("good", "fine");
        let orch = Orchestrator::new(fleet.clone());
        let mut group =
            ParallelTaskGroup::new(orch, vec!["good".to_string(), "bad".to_string()]).unwrap();
        group.start().await.unwrap();

        // "bad" becomes unreachable after its task exists
        fleet.mark_unreachable("bad");

        let outcomes = group.broadcast("question").await;
        assert!(outcomes["good"].is_ok());
        assert!(outcomes["bad"].is_err());

        let results = group.collect_results().await;
        assert_eq!(results["good"].as_deref(), Some("fine"));
        assert_eq!(results["bad"], None);
    }
}
