//! URL utilities for consistent endpoint construction
//!
//! Base URLs come from user config and may carry trailing slashes; endpoint
//! paths come from [`crate::core::config::Endpoints`] and may carry leading
//! ones. Everything that builds a request URL goes through here.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use galaxy_chat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8000"), "http://localhost:8000");
/// assert_eq!(normalize_base_url("http://localhost:8000///"), "http://localhost:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and a path
///
/// # Examples
///
/// ```
/// use galaxy_chat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:8000/", "/api/tools"),
///     "http://localhost:8000/api/tools"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Build a session-scoped endpoint URL from a `{session_id}` template.
///
/// Each path segment is percent-encoded after substitution, so an id holding
/// `/`, `?` or `#` stays inside its own segment. Returns `None` when the base
/// URL does not parse or the id would collapse into a dot segment.
///
/// # Examples
///
/// ```
/// use galaxy_chat::utils::url::session_url;
///
/// assert_eq!(
///     session_url("http://localhost:8000/", "/chat/{session_id}/message", "a/b").as_deref(),
///     Some("http://localhost:8000/chat/a%2Fb/message")
/// );
/// ```
pub fn session_url(base_url: &str, template: &str, session_id: &str) -> Option<String> {
    if matches!(session_id, "" | "." | "..") {
        return None;
    }

    let mut url = reqwest::Url::parse(&normalize_base_url(base_url)).ok()?;
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        for segment in template.split('/').filter(|segment| !segment.is_empty()) {
            segments.push(&segment.replace("{session_id}", session_id));
        }
    }
    Some(url.into())
}

/// Derive the realtime channel URL from an HTTP base URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; a base that already uses a
/// WebSocket scheme is kept as-is.
///
/// # Examples
///
/// ```
/// use galaxy_chat::utils::url::websocket_url;
///
/// assert_eq!(websocket_url("https://chat.example.com/", "/ws"), "wss://chat.example.com/ws");
/// ```
pub fn websocket_url(base_url: &str, path: &str) -> String {
    let normalized = normalize_base_url(base_url);
    let converted = if let Some(rest) = normalized.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = normalized.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        normalized
    };
    construct_api_url(&converted, path)
}
