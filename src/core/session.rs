//! Session acquisition and lifecycle.
//!
//! Sessions are created lazily: the first send (or an explicit "new chat")
//! issues `POST /chat`. Concurrent callers share one in-flight attempt. An id
//! pushed by the server over the realtime channel overrides whatever the
//! client would have installed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ClientFrame, CreateSessionResponse};
use crate::core::chat_stream::error_summary;
use crate::core::config::Endpoints;
use crate::core::error::ChatError;
use crate::core::state::{AppState, ClientEvent};
use crate::utils::url::{construct_api_url, session_url};

type Attempt = Shared<BoxFuture<'static, Result<String, ChatError>>>;

struct PendingAttempt {
    seq: u64,
    generation: u64,
    future: Attempt,
}

pub struct SessionClient {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
    state: Arc<AppState>,
    pending: Mutex<Option<PendingAttempt>>,
    next_seq: AtomicU64,
    announcer: Option<mpsc::UnboundedSender<ClientFrame>>,
}

impl SessionClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        endpoints: Endpoints,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            endpoints,
            state,
            pending: Mutex::new(None),
            next_seq: AtomicU64::new(0),
            announcer: None,
        }
    }

    /// Frames sent here reach the realtime channel; used to register newly
    /// created sessions with `session_init`.
    pub fn with_announcer(mut self, announcer: mpsc::UnboundedSender<ClientFrame>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    pub fn current(&self) -> Option<String> {
        self.state.session_id()
    }

    /// Return the current session id, creating a session if there is none.
    pub async fn ensure_session(&self) -> Result<String, ChatError> {
        if let Some(id) = self.current() {
            return Ok(id);
        }
        self.create_session().await
    }

    /// Issue `POST /chat`, or join the attempt already in flight.
    pub async fn create_session(&self) -> Result<String, ChatError> {
        let (seq, generation, attempt) = self.join_or_start();
        let result = attempt.await;
        self.clear_pending(seq);
        let created = result?;

        let (effective, installed) = self.state.with_conversation(|conversation| {
            let had_session = conversation.session.id().is_some();
            let effective = conversation
                .session
                .install_created(generation, created);
            let installed = !had_session && effective.is_some();
            (effective, installed)
        });

        let Some(id) = effective else {
            return Err(ChatError::session(
                None,
                "session was reset while it was being created",
            ));
        };

        if installed {
            info!(session_id = %id, "Session created");
            self.state.emit(ClientEvent::SessionAssigned(id.clone()));
            self.announce(&id);
        }
        Ok(id)
    }

    fn join_or_start(&self) -> (u64, u64, Attempt) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self
            .state
            .with_conversation(|conversation| conversation.session.generation());

        if let Some(existing) = pending.as_ref() {
            if existing.generation == generation {
                debug!(seq = existing.seq, "Joining in-flight session creation");
                return (existing.seq, existing.generation, existing.future.clone());
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let url = construct_api_url(&self.base_url, &self.endpoints.create_session);
        let future = request_session(self.client.clone(), url).boxed().shared();
        *pending = Some(PendingAttempt {
            seq,
            generation,
            future: future.clone(),
        });
        (seq, generation, future)
    }

    fn clear_pending(&self, seq: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|attempt| attempt.seq == seq) {
            *pending = None;
        }
    }

    /// Adopt an id assigned by the server. It replaces any id the client
    /// holds and satisfies pending and future `ensure_session` calls.
    pub fn assign_pushed(&self, id: String) {
        let changed = self
            .state
            .with_conversation(|conversation| conversation.session.assign_pushed(id.clone()));
        if changed {
            info!(session_id = %id, "Session assigned by server");
            self.state.emit(ClientEvent::SessionAssigned(id));
        }
    }

    /// Start over: drop the session and transcript together, then acquire a
    /// fresh session.
    pub async fn new_chat(&self) -> Result<String, ChatError> {
        self.state.with_conversation(|conversation| conversation.reset());
        self.state.emit(ClientEvent::TranscriptCleared);
        self.create_session().await
    }

    fn announce(&self, id: &str) {
        if let Some(announcer) = &self.announcer {
            let _ = announcer.send(ClientFrame::SessionInit {
                session_id: id.to_string(),
            });
        }
    }

    /// Save the server-side transcript export into `dir` and return its path.
    pub async fn download_transcript(&self, dir: &Path) -> Result<PathBuf, ChatError> {
        let id = self.current().ok_or(ChatError::NoSession)?;
        let url = session_url(&self.base_url, &self.endpoints.download, &id).ok_or_else(|| {
            ChatError::Network(format!("cannot build download URL for session {id:?}"))
        })?;

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(ChatError::Network(format!(
                "Transcript download failed with status {status}"
            )));
        }
        let blob = response.bytes().await?;

        let file_name = format!(
            "chat-{}-{}.txt",
            file_safe(&id),
            chrono::Local::now().format("%Y-%m-%d")
        );
        let target = dir.join(file_name);
        let mut temp_file = NamedTempFile::new_in(dir)?;
        temp_file.write_all(&blob)?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(&target)
            .map_err(|err| ChatError::Io(err.to_string()))?;

        info!(path = %target.display(), "Transcript downloaded");
        Ok(target)
    }
}

/// Session ids come from the server; keep only characters that cannot step
/// out of the export directory.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn request_session(client: reqwest::Client, url: String) -> Result<String, ChatError> {
    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .map_err(|err| ChatError::session(None, err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_summary(&body).unwrap_or_else(|| status.to_string());
        warn!(%status, "Session creation rejected");
        return Err(ChatError::session(Some(status.as_u16()), message));
    }

    let body = response
        .bytes()
        .await
        .map_err(|err| ChatError::session(None, err.to_string()))?;
    serde_json::from_slice::<CreateSessionResponse>(&body)
        .map(|created| created.session_id)
        .map_err(|err| {
            ChatError::session(Some(status.as_u16()), format!("malformed response: {err}"))
        })
}
