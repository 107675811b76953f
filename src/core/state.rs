//! Shared application state.
//!
//! One [`AppState`] is created per client and handed by `Arc` to every
//! component that needs it. Locks guard plain data only and are never held
//! across an `.await`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::core::message::{Message, MessageId};
use crate::core::transcript::Transcript;

/// Realtime channel lifecycle as observed by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    /// Retries exhausted. Terminal.
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Everything a presentation layer needs to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Transient user-facing notification.
    Notice { level: NoticeLevel, text: String },
    ConnectionChanged(ConnectionState),
    SessionAssigned(String),
    /// A message was added or its content changed; re-render and scroll.
    TranscriptUpdated(MessageId),
    TranscriptCleared,
    Typing(bool),
}

/// The user's model, tool and data-source choices for the next send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySelection {
    pub model: Option<String>,
    pub tools: BTreeSet<String>,
    pub data_sources: BTreeSet<String>,
}

impl CapabilitySelection {
    /// Flip a tool in or out of the selection. Returns whether it is now selected.
    pub fn toggle_tool(&mut self, name: &str) -> bool {
        toggle(&mut self.tools, name)
    }

    pub fn toggle_data_source(&mut self, name: &str) -> bool {
        toggle(&mut self.data_sources, name)
    }
}

fn toggle(set: &mut BTreeSet<String>, name: &str) -> bool {
    if set.remove(name) {
        false
    } else {
        set.insert(name.to_string());
        true
    }
}

/// Session id plus a generation counter that advances on every reset, so
/// that creations started before a "new chat" cannot land afterwards.
#[derive(Debug, Default)]
pub struct SessionSlot {
    id: Option<String>,
    generation: u64,
}

impl SessionSlot {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Store an id obtained through `POST /chat`.
    ///
    /// An id already present wins, since it can only have been pushed by the
    /// server while the request was in flight. Results from an older
    /// generation are dropped. Returns the id now in effect.
    pub fn install_created(&mut self, generation: u64, id: String) -> Option<String> {
        if generation == self.generation && self.id.is_none() {
            self.id = Some(id);
        }
        self.id.clone()
    }

    /// Adopt a server-assigned id. Always authoritative.
    pub fn assign_pushed(&mut self, id: String) -> bool {
        let changed = self.id.as_deref() != Some(id.as_str());
        self.id = Some(id);
        changed
    }

    fn reset(&mut self) -> u64 {
        self.id = None;
        self.generation += 1;
        self.generation
    }
}

/// Session and transcript live under one lock so "new chat" is atomic.
#[derive(Debug, Default)]
pub struct Conversation {
    pub session: SessionSlot,
    pub transcript: Transcript,
}

impl Conversation {
    /// Drop the session and the whole transcript together.
    pub fn reset(&mut self) -> u64 {
        self.transcript.clear();
        self.session.reset()
    }
}

pub struct AppState {
    conversation: Mutex<Conversation>,
    selection: Mutex<CapabilitySelection>,
    streaming: AtomicBool,
    events: mpsc::UnboundedSender<ClientEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Self {
            conversation: Mutex::new(Conversation::default()),
            selection: Mutex::new(CapabilitySelection::default()),
            streaming: AtomicBool::new(false),
            events: tx,
        };
        (Arc::new(state), rx)
    }

    pub fn with_conversation<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        f(&mut lock(&self.conversation))
    }

    pub fn session_id(&self) -> Option<String> {
        lock(&self.conversation).session.id().map(str::to_owned)
    }

    pub fn transcript_snapshot(&self) -> Vec<Message> {
        lock(&self.conversation).transcript.snapshot()
    }

    pub fn selection(&self) -> CapabilitySelection {
        lock(&self.selection).clone()
    }

    pub fn update_selection<R>(&self, f: impl FnOnce(&mut CapabilitySelection) -> R) -> R {
        f(&mut lock(&self.selection))
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Claim the single send slot. `false` means another send owns it.
    pub(crate) fn try_begin_streaming(&self) -> bool {
        self.streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_streaming(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    pub fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        self.emit(ClientEvent::Notice {
            level,
            text: text.into(),
        });
    }
}
