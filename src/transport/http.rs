//! HTTP implementation of the agent task protocol
//!
//! Each agent id maps to a base URL. Task operations are plain
//! request/response JSON; the streaming send parses a Server-Sent-Events body
//! (`data: <json>\n\n` frames) with a buffered line reader and explicit
//! state, ending at the frame with `done: true`. Connection failures surface
//! immediately as transport errors; this layer never retries.

use crate::error::{MeshError, MeshResult};
use crate::protocol::{Message, SendMessageRequest, StreamFrame, Task, TaskEnvelope};
use crate::transport::{AgentTransport, DeltaStream};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the agent task protocol
pub struct HttpAgentClient {
    client: reqwest::Client,
    endpoints: RwLock<HashMap<String, String>>,
}

impl Default for HttpAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAgentClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Build a client from an agent-id to base-URL map
    pub fn with_endpoints(endpoints: HashMap<String, String>) -> Self {
        let client = Self::new();
        *client.endpoints.write().expect("endpoint map poisoned") = endpoints;
        client
    }

    /// Register (or replace) an agent's base URL
    pub fn register_agent<S: Into<String>, U: Into<String>>(&self, agent_id: S, base_url: U) {
        let mut url = base_url.into();
        while url.ends_with('/') {
            url.pop();
        }
        self.endpoints
            .write()
            .expect("endpoint map poisoned")
            .insert(agent_id.into(), url);
    }

    fn base_url(&self, agent_id: &str) -> MeshResult<String> {
        self.endpoints
            .read()
            .expect("endpoint map poisoned")
            .get(agent_id)
            .cloned()
            .ok_or_else(|| MeshError::unknown_agent(agent_id))
    }

    async fn read_task(response: reqwest::Response, task_id: Option<&str>) -> MeshResult<Task> {
        if response.status() == StatusCode::NOT_FOUND {
            return Err(MeshError::unknown_task(task_id.unwrap_or("<unknown>")));
        }
        let response = response.error_for_status()?;
        let envelope: TaskEnvelope = response.json().await?;
        Ok(envelope.task)
    }
}

#[async_trait::async_trait]
impl AgentTransport for HttpAgentClient {
    async fn create_task(&self, agent_id: &str) -> MeshResult<Task> {
        let base = self.base_url(agent_id)?;
        debug!(agent = %agent_id, "creating task");
        let response = self.client.post(format!("{base}/tasks")).send().await?;
        Self::read_task(response, None).await
    }

    async fn get_task(&self, agent_id: &str, task_id: &str) -> MeshResult<Task> {
        let base = self.base_url(agent_id)?;
        let response = self
            .client
            .get(format!("{base}/tasks/{task_id}"))
            .send()
            .await?;
        Self::read_task(response, Some(task_id)).await
    }

    async fn send_message(
        &self,
        agent_id: &str,
        task_id: &str,
        message: &Message,
    ) -> MeshResult<Task> {
        let base = self.base_url(agent_id)?;
        debug!(agent = %agent_id, task_id = %task_id, "sending message");
        let response = self
            .client
            .post(format!("{base}/tasks/{task_id}/messages"))
            .json(&SendMessageRequest {
                message: message.clone(),
            })
            .send()
            .await?;
        Self::read_task(response, Some(task_id)).await
    }

    async fn send_message_streaming(
        &self,
        agent_id: &str,
        task_id: &str,
        message: &Message,
    ) -> MeshResult<DeltaStream> {
        let base = self.base_url(agent_id)?;
        debug!(agent = %agent_id, task_id = %task_id, "sending message (streaming)");
        let response = self
            .client
            .post(format!("{base}/tasks/{task_id}/messages:stream"))
            .json(&SendMessageRequest {
                message: message.clone(),
            })
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(MeshError::unknown_task(task_id));
        }
        let response = response.error_for_status()?;
        Ok(delta_stream(response.bytes_stream()))
    }

    async fn cancel_task(&self, agent_id: &str, task_id: &str) -> MeshResult<Task> {
        let base = self.base_url(agent_id)?;
        let response = self
            .client
            .post(format!("{base}/tasks/{task_id}/cancel"))
            .send()
            .await?;
        Self::read_task(response, Some(task_id)).await
    }
}

struct SseState<S> {
    inner: Pin<Box<S>>,
    buffer: BytesMut,
    done: bool,
}

/// Turn an SSE byte stream into a finite stream of task deltas.
///
/// The stream ends after the frame whose delta carries `done: true`, or when
/// the server closes the connection.
fn delta_stream<S>(body: S) -> DeltaStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = SseState {
        inner: Box::pin(body),
        buffer: BytesMut::new(),
        done: false,
    };

    Box::pin(futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if state.done {
                return Ok(None);
            }
            if let Some(payload) = next_event_payload(&mut state.buffer) {
                let frame: StreamFrame = serde_json::from_str(&payload).map_err(|e| {
                    MeshError::transport(format!("malformed stream frame: {e}"))
                })?;
                if frame.task.done {
                    state.done = true;
                }
                return Ok(Some((frame.task, state)));
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(MeshError::from(e)),
                // Connection closed without a terminal frame; end the stream
                None => return Ok(None),
            }
        }
    }))
}

/// Extract the next complete event's data payload from the buffer.
///
/// Events are separated by a blank line. Comment lines and events without
/// data are skipped; multiple `data:` lines within one event are joined with
/// newlines per the SSE format.
fn next_event_payload(buffer: &mut BytesMut) -> Option<String> {
    loop {
        let boundary = find_blank_line(buffer)?;
        let block = buffer.split_to(boundary.end);
        let text = String::from_utf8_lossy(&block[..boundary.start]).into_owned();

        let data: Vec<&str> = text
            .lines()
            .filter_map(|line| {
                let line = line.trim_end_matches('\r');
                line.strip_prefix("data:").map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            })
            .collect();

        if !data.is_empty() {
            return Some(data.join("\n"));
        }
        // Comment or empty event; keep scanning
    }
}

struct Boundary {
    /// Byte offset where the event's content ends
    start: usize,
    /// Byte offset past the blank-line separator
    end: usize,
}

fn find_blank_line(buffer: &BytesMut) -> Option<Boundary> {
    let mut i = 0;
    while i + 1 < buffer.len() {
        if buffer[i] == b'\n' && buffer[i + 1] == b'\n' {
            return Some(Boundary {
                start: i + 1,
                end: i + 2,
            });
        }
        if i + 3 < buffer.len() && &buffer[i..i + 4] == b"\r\n\r\n" {
            return Some(Boundary {
                start: i + 2,
                end: i + 4,
            });
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TaskDelta;
    use futures::TryStreamExt;

    fn chunked(parts: Vec<&'static str>) -> impl Stream<Item = reqwest::Result<Bytes>> {
        futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))))
    }

    #[test]
    fn test_next_event_payload_single_frame() {
        let mut buf = BytesMut::from(&b"data: {\"x\":1}\n\n"[..]);
        assert_eq!(next_event_payload(&mut buf).unwrap(), "{\"x\":1}");
        assert!(next_event_payload(&mut buf).is_none());
    }

    #[test]
    fn test_next_event_payload_incomplete_frame() {
        let mut buf = BytesMut::from(&b"data: {\"x\""[..]);
        assert!(next_event_payload(&mut buf).is_none());
        // Buffer retained until the frame completes
        buf.extend_from_slice(b":1}\n\n");
        assert_eq!(next_event_payload(&mut buf).unwrap(), "{\"x\":1}");
    }

    #[test]
    fn test_next_event_payload_skips_comments() {
        let mut buf = BytesMut::from(&b": keep-alive\n\ndata: {}\n\n"[..]);
        assert_eq!(next_event_payload(&mut buf).unwrap(), "{}");
    }

    #[test]
    fn test_next_event_payload_crlf() {
        let mut buf = BytesMut::from(&b"data: {\"y\":2}\r\n\r\n"[..]);
        assert_eq!(next_event_payload(&mut buf).unwrap(), "{\"y\":2}");
    }

    #[test]
    fn test_multiple_data_lines_joined() {
        let mut buf = BytesMut::from(&b"data: [1,\ndata: 2]\n\n"[..]);
        assert_eq!(next_event_payload(&mut buf).unwrap(), "[1,\n2]");
    }

    #[tokio::test]
    async fn test_delta_stream_ends_at_done() {
        let body = chunked(vec![
            "data: {\"task\": {\"state\": \"running\"}}\n\n",
            "data: {\"task\": {\"state\": \"completed\", \"done\": true}}\n\n",
            // Trailing garbage after the terminal frame must not be read
            "data: {\"task\": {\"state\": \"running\"}}\n\n",
        ]);

        let deltas: Vec<TaskDelta> = delta_stream(body).try_collect().await.unwrap();
        assert_eq!(deltas.len(), 2);
        assert!(!deltas[0].done);
        assert!(deltas[1].done);
    }

    #[tokio::test]
    async fn test_delta_stream_reassembles_split_frames() {
        let body = chunked(vec![
            "data: {\"task\": {\"sta",
            "te\": \"running\"}}\n",
            "\ndata: {\"task\": {\"done\": true}}\n\n",
        ]);

        let deltas: Vec<TaskDelta> = delta_stream(body).try_collect().await.unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].state, Some(crate::protocol::TaskState::Running));
    }

    #[tokio::test]
    async fn test_delta_stream_malformed_frame_is_error() {
        let body = chunked(vec!["data: not json\n\n"]);
        let result: MeshResult<Vec<TaskDelta>> = delta_stream(body).try_collect().await;
        assert!(matches!(result, Err(MeshError::Transport(_))));
    }

    #[tokio::test]
    async fn test_delta_stream_connection_close_ends_stream() {
        let body = chunked(vec!["data: {\"task\": {\"state\": \"running\"}}\n\n"]);
        let deltas: Vec<TaskDelta> = delta_stream(body).try_collect().await.unwrap();
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn test_register_agent_strips_trailing_slash() {
        let client = HttpAgentClient::new();
        client.register_agent("a", "http://localhost:8000/");
        assert_eq!(client.base_url("a").unwrap(), "http://localhost:8000");
    }

    #[test]
    fn test_unknown_agent_errors() {
        let client = HttpAgentClient::new();
        assert!(matches!(
            client.base_url("ghost"),
            Err(MeshError::UnknownAgent { .. })
        ));
    }
}
