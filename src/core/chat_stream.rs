//! Message dispatch and streamed response consumption.
//!
//! Responses use SSE-style framing: each line of interest starts with
//! `data:` and carries either the `[DONE]` sentinel or a JSON object.
//! Bytes are split into lines before decoding, so multi-byte characters that
//! straddle network reads are reassembled intact.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use memchr::memchr_iter;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::SendMessageRequest;
use crate::core::config::Endpoints;
use crate::core::error::ChatError;
use crate::core::message::MessageId;
use crate::core::session::SessionClient;
use crate::core::state::{AppState, ClientEvent, NoticeLevel};
use crate::core::transcript::Transcript;
use crate::utils::url::session_url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    ContentDelta(String),
    ToolSelected(String),
    DataSourceSelected(String),
    Done,
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

/// Longest line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream on `\n`, holding back any incomplete trailing line.
///
/// A pending line longer than the limit is dropped up to its next newline.
pub struct SseLineBuffer {
    buffer: Vec<u8>,
    max_line: usize,
    oversized: bool,
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::with_line_limit(MAX_LINE_BYTES)
    }
}

impl SseLineBuffer {
    pub fn with_line_limit(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
            oversized: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;

        for newline_pos in memchr_iter(b'\n', &self.buffer) {
            if self.oversized {
                self.oversized = false;
            } else if let Some(line) = decode_line(&self.buffer[start..newline_pos]) {
                lines.push(line);
            }
            start = newline_pos + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_line {
            warn!(bytes = self.buffer.len(), "Discarding oversized stream line");
            self.buffer.clear();
            self.oversized = true;
        }

        lines
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if std::mem::take(&mut self.oversized) {
            return None;
        }
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(err) => {
            debug!(error = %err, "Skipping line with invalid UTF-8");
            None
        }
    }
}

#[derive(Deserialize)]
struct DataFrame {
    #[serde(default)]
    content: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    data_source: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Interpret one complete line. `None` means the line carries nothing
/// actionable and is skipped.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let Some(payload) = extract_data_payload(line) else {
        debug!(line, "Ignoring non-data line");
        return None;
    };

    if payload == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    let frame = match serde_json::from_str::<DataFrame>(payload) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(error = %err, payload, "Skipping malformed data payload");
            return None;
        }
    };

    if let Some(error) = frame.error {
        let summary = summary_from_value(&serde_json::json!({ "error": error }))
            .unwrap_or_else(|| "Unknown server error".to_string());
        return Some(StreamEvent::Error(summary));
    }

    if let Some(content) = frame.content.filter(|content| !content.is_empty()) {
        return Some(StreamEvent::ContentDelta(content));
    }

    match frame.kind.as_deref() {
        Some("tool_selected") => frame.tool.map(StreamEvent::ToolSelected),
        Some("data_source_selected") => frame.data_source.map(StreamEvent::DataSourceSelected),
        other => {
            debug!(kind = ?other, "Ignoring unrecognized data payload");
            None
        }
    }
}

fn summary_from_value(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| value.get("error").and_then(|v| v.as_str().map(str::to_owned)))
        .or_else(|| value.get("detail").and_then(|v| v.as_str().map(str::to_owned)))
        .or_else(|| value.get("message").and_then(|v| v.as_str().map(str::to_owned)));

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
}

/// Pull a readable one-line reason out of an error body.
pub(crate) fn error_summary(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => summary_from_value(&value),
        Err(_) => Some(trimmed.split_whitespace().collect::<Vec<_>>().join(" ")),
    }
}

pub struct MessageDispatcher {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
    state: Arc<AppState>,
    sessions: Arc<SessionClient>,
}

impl MessageDispatcher {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        endpoints: Endpoints,
        state: Arc<AppState>,
        sessions: Arc<SessionClient>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            endpoints,
            state,
            sessions,
        }
    }

    /// Send a user message and return its response as a stream of events.
    ///
    /// The user message is in the transcript before this function first
    /// suspends. The request itself goes out when the stream is first polled.
    pub async fn send(&self, content: &str) -> Result<ResponseStream, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.state.try_begin_streaming() {
            return Err(ChatError::Busy);
        }

        let (user_message, generation) = self.state.with_conversation(|conversation| {
            let id = conversation.transcript.push_user(content);
            (id, conversation.session.generation())
        });
        let guard = StreamingGuard::new(Arc::clone(&self.state), generation);
        self.state.emit(ClientEvent::TranscriptUpdated(user_message));

        let session_id = match self.sessions.ensure_session().await {
            Ok(id) => id,
            Err(err) => {
                guard.record_error(&err.to_string());
                return Err(err);
            }
        };

        let selection = self.state.selection();
        let body = SendMessageRequest {
            content: content.to_string(),
            llm_name: selection.model,
            selected_tools: selection.tools.into_iter().collect(),
            selected_data_sources: selection.data_sources.into_iter().collect(),
        };
        let Some(url) = session_url(&self.base_url, &self.endpoints.message, &session_id) else {
            let err = ChatError::stream(
                None,
                format!("cannot build message URL for session {session_id:?}"),
            );
            guard.record_error(&err.to_string());
            return Err(err);
        };
        debug!(session_id = %session_id, "Dispatching message");

        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body);

        Ok(ResponseStream::new(request, guard, user_message))
    }
}

/// Holds the single send slot. Releasing it finalizes the assistant message;
/// dropping it mid-stream releases it too.
///
/// Transcript writes are tied to the conversation generation seen when the
/// send started. Once "new chat" resets the conversation, the rest of the
/// stream no longer touches the transcript.
struct StreamingGuard {
    state: Arc<AppState>,
    generation: u64,
    assistant: Option<MessageId>,
    released: bool,
}

impl StreamingGuard {
    fn new(state: Arc<AppState>, generation: u64) -> Self {
        Self {
            state,
            generation,
            assistant: None,
            released: false,
        }
    }

    /// Run `f` on the transcript if it still belongs to this send.
    fn with_transcript<R>(&self, f: impl FnOnce(&mut Transcript) -> R) -> Option<R> {
        let generation = self.generation;
        self.state.with_conversation(|conversation| {
            (conversation.session.generation() == generation)
                .then(|| f(&mut conversation.transcript))
        })
    }

    fn open_assistant(&mut self) {
        match self.with_transcript(Transcript::begin_assistant) {
            Some(id) => {
                self.assistant = Some(id);
                self.state.emit(ClientEvent::TranscriptUpdated(id));
            }
            None => debug!("Conversation was reset; reply will not be recorded"),
        }
    }

    fn push_system(&self, text: String) {
        match self.with_transcript(|transcript| transcript.push_system(text)) {
            Some(id) => self.state.emit(ClientEvent::TranscriptUpdated(id)),
            None => debug!("Conversation was reset; dropping system note"),
        }
    }

    fn record_error(&self, message: &str) {
        self.push_system(format!("Error: {message}"));
        self.state.notify(NoticeLevel::Error, message);
    }

    fn apply(&self, event: &StreamEvent) {
        match event {
            StreamEvent::ContentDelta(text) => {
                let Some(id) = self.assistant else {
                    return;
                };
                let appended = self.with_transcript(|transcript| transcript.append(id, text));
                match appended {
                    Some(Ok(())) => self.state.emit(ClientEvent::TranscriptUpdated(id)),
                    _ => debug!(message_id = id.0, "Dropping delta for a closed message"),
                }
            }
            StreamEvent::ToolSelected(name) => self.push_system(format!("Tool selected: {name}")),
            StreamEvent::DataSourceSelected(name) => {
                self.push_system(format!("Data source selected: {name}"))
            }
            StreamEvent::Error(message) => self.record_error(message),
            StreamEvent::Done => {}
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(id) = self.assistant.take() {
            let finalized = self
                .with_transcript(|transcript| transcript.finalize(id))
                .unwrap_or(false);
            if finalized {
                self.state.emit(ClientEvent::TranscriptUpdated(id));
            }
        }
        self.state.end_streaming();
    }
}

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        self.release();
    }
}

enum Phase {
    Request(reqwest::RequestBuilder),
    Body(reqwest::Response),
    Finished,
}

struct Pump {
    phase: Phase,
    guard: StreamingGuard,
    cancel: CancellationToken,
    lines: SseLineBuffer,
    queued: VecDeque<StreamEvent>,
}

impl Pump {
    /// Queue events parsed from `lines`, stopping at the first terminal one.
    /// Returns whether a terminal event was queued.
    fn queue_lines(&mut self, lines: impl IntoIterator<Item = String>) -> bool {
        for line in lines {
            if let Some(event) = parse_line(&line) {
                let terminal = event.is_terminal();
                self.queued.push_back(event);
                if terminal {
                    return true;
                }
            }
        }
        false
    }

    async fn advance(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Finished => {}
            Phase::Request(request) => {
                let sent = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    sent = request.send() => Some(sent),
                };

                match sent {
                    None => self.queued.push_back(StreamEvent::Error("cancelled".to_string())),
                    Some(Err(err)) => {
                        let err = ChatError::stream(None, err.to_string());
                        self.queued.push_back(StreamEvent::Error(err.to_string()));
                    }
                    Some(Ok(response)) if !response.status().is_success() => {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        let reason = error_summary(&body).unwrap_or_else(|| status.to_string());
                        let err = ChatError::stream(Some(status.as_u16()), reason);
                        self.queued.push_back(StreamEvent::Error(err.to_string()));
                    }
                    Some(Ok(response)) => {
                        self.guard.open_assistant();
                        self.phase = Phase::Body(response);
                    }
                }
            }
            Phase::Body(mut response) => {
                let chunk = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    chunk = response.chunk() => Some(chunk),
                };

                match chunk {
                    None => self.queued.push_back(StreamEvent::Error("cancelled".to_string())),
                    Some(Ok(Some(bytes))) => {
                        let lines = self.lines.push(&bytes);
                        if !self.queue_lines(lines) {
                            self.phase = Phase::Body(response);
                        }
                    }
                    Some(Ok(None)) => {
                        let tail = self.lines.finish();
                        if !self.queue_lines(tail) {
                            self.queued.push_back(StreamEvent::Done);
                        }
                    }
                    Some(Err(err)) => {
                        let err = ChatError::stream(None, err.to_string());
                        self.queued.push_back(StreamEvent::Error(err.to_string()));
                    }
                }
            }
        }
    }
}

async fn next_event(mut pump: Pump) -> Option<(StreamEvent, Pump)> {
    loop {
        if let Some(event) = pump.queued.pop_front() {
            pump.guard.apply(&event);
            if event.is_terminal() {
                pump.queued.clear();
                pump.phase = Phase::Finished;
                pump.guard.release();
            }
            return Some((event, pump));
        }

        if matches!(pump.phase, Phase::Finished) {
            return None;
        }
        pump.advance().await;
    }
}

/// Lazy, single-use sequence of [`StreamEvent`]s for one send.
///
/// Ends after exactly one terminal event (`Done` or `Error`).
pub struct ResponseStream {
    inner: BoxStream<'static, StreamEvent>,
    cancel: CancellationToken,
    user_message: MessageId,
}

impl ResponseStream {
    fn new(request: reqwest::RequestBuilder, guard: StreamingGuard, user_message: MessageId) -> Self {
        let cancel = CancellationToken::new();
        let pump = Pump {
            phase: Phase::Request(request),
            guard,
            cancel: cancel.clone(),
            lines: SseLineBuffer::default(),
            queued: VecDeque::new(),
        };

        Self {
            inner: stream::unfold(pump, next_event).boxed(),
            cancel,
            user_message,
        }
    }

    /// Cancelling ends the stream with `Error("cancelled")` at the next
    /// suspension point.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn user_message(&self) -> MessageId {
        self.user_message
    }
}

impl Stream for ResponseStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
