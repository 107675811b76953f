//! Ordered conversation history.
//!
//! The transcript is the sole owner of [`Message`] values. Presentation code
//! only ever sees clones handed out by [`Transcript::snapshot`].

use crate::core::message::{Message, MessageId, Role};

#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
}

/// Raised when a delta targets a message that is gone or already finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizedMessage(pub MessageId);

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId(self.next_id)
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) -> MessageId {
        let id = self.allocate_id();
        self.messages.push(Message::new(id, role, content));
        id
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        self.push(Role::User, content)
    }

    pub fn push_system(&mut self, content: impl Into<String>) -> MessageId {
        self.push(Role::System, content)
    }

    /// Open an empty assistant message to receive stream deltas.
    pub fn begin_assistant(&mut self) -> MessageId {
        self.push(Role::Assistant, String::new())
    }

    pub fn append(&mut self, id: MessageId, delta: &str) -> Result<(), FinalizedMessage> {
        match self.get_mut(id) {
            Some(message) if !message.finalized => {
                message.content.push_str(delta);
                Ok(())
            }
            _ => Err(FinalizedMessage(id)),
        }
    }

    /// Freeze a message. Returns `false` when it was already final or missing.
    pub fn finalize(&mut self, id: MessageId) -> bool {
        match self.get_mut(id) {
            Some(message) if !message.finalized => {
                message.finalized = true;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.id == id)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|message| message.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_accumulate_until_finalized() {
        let mut transcript = Transcript::new();
        let id = transcript.begin_assistant();

        transcript.append(id, "Hel").expect("open message");
        transcript.append(id, "lo").expect("open message");
        assert!(transcript.finalize(id));

        assert_eq!(transcript.append(id, "!"), Err(FinalizedMessage(id)));
        assert!(!transcript.finalize(id));
        assert_eq!(transcript.get(id).map(|m| m.content.as_str()), Some("Hello"));
    }

    #[test]
    fn ids_stay_unique_across_clear() {
        let mut transcript = Transcript::new();
        let first = transcript.push_user("one");
        transcript.clear();
        let second = transcript.push_user("two");

        assert!(transcript.get(first).is_none());
        assert_ne!(first, second);
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn user_messages_cannot_be_appended_to() {
        let mut transcript = Transcript::new();
        let id = transcript.push_user("question");
        assert!(transcript.append(id, " more").is_err());
    }
}
