use std::error::Error as StdError;
use std::fmt;

/// Failures surfaced by the chat session client.
///
/// Messages are carried as text so a single result can be handed to every
/// caller waiting on a shared session attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// HTTP or WebSocket transport failure, or a non-success catalog response.
    Network(String),

    /// The backend refused or failed to create a session.
    SessionCreation {
        /// HTTP status, when the server answered at all.
        status: Option<u16>,
        message: String,
    },

    /// The message request failed or its response stream broke off.
    Stream {
        status: Option<u16>,
        message: String,
    },

    /// The trimmed message content was empty.
    EmptyMessage,

    /// Another send is still streaming.
    Busy,

    /// The operation needs a session and none has been acquired.
    NoSession,

    /// Local filesystem failure, e.g. while saving a transcript export.
    Io(String),
}

impl ChatError {
    pub fn network(err: impl fmt::Display) -> Self {
        ChatError::Network(err.to_string())
    }

    pub(crate) fn session(status: Option<u16>, message: impl Into<String>) -> Self {
        ChatError::SessionCreation {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn stream(status: Option<u16>, message: impl Into<String>) -> Self {
        ChatError::Stream {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Network(message) => write!(f, "Network error: {message}"),
            ChatError::SessionCreation {
                status: Some(status),
                message,
            } => write!(f, "Failed to create session ({status}): {message}"),
            ChatError::SessionCreation {
                status: None,
                message,
            } => write!(f, "Failed to create session: {message}"),
            ChatError::Stream {
                status: Some(status),
                message,
            } => write!(f, "Message request failed ({status}): {message}"),
            ChatError::Stream {
                status: None,
                message,
            } => write!(f, "Message stream failed: {message}"),
            ChatError::EmptyMessage => write!(f, "Message is empty"),
            ChatError::Busy => write!(f, "A response is still streaming"),
            ChatError::NoSession => write!(f, "No active session"),
            ChatError::Io(message) => write!(f, "I/O error: {message}"),
        }
    }
}

impl StdError for ChatError {}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_when_known() {
        let err = ChatError::session(Some(503), "backend unavailable");
        assert_eq!(
            err.to_string(),
            "Failed to create session (503): backend unavailable"
        );

        let err = ChatError::stream(None, "connection reset");
        assert_eq!(err.to_string(), "Message stream failed: connection reset");
    }
}
