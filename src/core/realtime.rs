//! Persistent WebSocket carrying server pushes: session ids, typing status,
//! thinking and tool-call notices.
//!
//! The channel runs in its own task and reconnects after a fixed delay until
//! the application shuts it down or the retry limit is reached.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ClientFrame, ServerFrame};
use crate::core::config::Config;
use crate::core::session::SessionClient;
use crate::core::state::{AppState, ClientEvent, ConnectionState, NoticeLevel};
use crate::utils::url::websocket_url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeSettings {
    pub url: String,
    pub reconnect_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RealtimeSettings {
    pub fn from_config(config: &Config) -> Self {
        let url = config
            .ws_url
            .clone()
            .unwrap_or_else(|| websocket_url(config.base_url(), &config.endpoints.websocket));
        Self {
            url,
            reconnect_delay: config.reconnect_delay(),
            max_attempts: config.max_reconnect_attempts(),
        }
    }
}

/// Published on every change of state or attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed or closed attempts; reset on every successful open.
    pub attempts: u32,
}

/// How a served connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Shutdown,
    Lost,
}

pub struct RealtimeChannel {
    settings: RealtimeSettings,
    state: Arc<AppState>,
    sessions: Arc<SessionClient>,
    outbound: mpsc::UnboundedReceiver<ClientFrame>,
    outbound_open: bool,
    failures: u32,
    status: watch::Sender<ConnectionStatus>,
    shutdown: CancellationToken,
    ready: Option<oneshot::Sender<ConnectionState>>,
}

/// Owner's side of a running [`RealtimeChannel`]. Dropping it shuts the
/// channel down.
pub struct RealtimeHandle {
    status: watch::Receiver<ConnectionStatus>,
    shutdown: CancellationToken,
    ready: Option<oneshot::Receiver<ConnectionState>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeChannel {
    /// `outbound` receives frames queued by other components, e.g. the
    /// `session_init` announcements of the session client.
    pub fn new(
        settings: RealtimeSettings,
        state: Arc<AppState>,
        sessions: Arc<SessionClient>,
        outbound: mpsc::UnboundedReceiver<ClientFrame>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus {
            state: ConnectionState::Connecting,
            attempts: 0,
        });
        Self {
            settings,
            state,
            sessions,
            outbound,
            outbound_open: true,
            failures: 0,
            status,
            shutdown: CancellationToken::new(),
            ready: None,
        }
    }

    pub fn spawn(mut self) -> RealtimeHandle {
        let (ready_tx, ready_rx) = oneshot::channel();
        self.ready = Some(ready_tx);
        let status = self.status.subscribe();
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.run());

        RealtimeHandle {
            status,
            shutdown,
            ready: Some(ready_rx),
            task: Some(task),
        }
    }

    fn set_status(&mut self, status: ConnectionState) {
        let next = ConnectionStatus {
            state: status,
            attempts: self.failures,
        };
        let mut changed = false;
        self.status.send_if_modified(|current| {
            changed = current.state != next.state;
            let modified = *current != next;
            *current = next;
            modified
        });
        if changed {
            debug!(status = status.as_str(), "Realtime channel state changed");
            self.state.emit(ClientEvent::ConnectionChanged(status));
        }
        if status != ConnectionState::Connecting {
            if let Some(ready) = self.ready.take() {
                let _ = ready.send(status);
            }
        }
    }

    async fn run(mut self) {
        loop {
            self.set_status(ConnectionState::Connecting);
            debug!(url = %self.settings.url, attempt = self.failures + 1, "Connecting realtime channel");

            let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.settings.url.as_str()));
            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                connected = connect => Some(connected),
            };
            let Some(connected) = connected else {
                self.set_status(ConnectionState::Closed);
                return;
            };

            match connected {
                Ok(Ok((socket, _response))) => {
                    self.failures = 0;
                    self.set_status(ConnectionState::Open);
                    info!(url = %self.settings.url, "Realtime channel connected");
                    self.state.notify(NoticeLevel::Info, "Connected to server");

                    let exit = self.serve(socket).await;
                    self.set_status(ConnectionState::Closed);
                    if exit == Exit::Shutdown {
                        info!("Realtime channel closed by client");
                        return;
                    }
                    self.state
                        .notify(NoticeLevel::Warning, "Connection lost, reconnecting");
                }
                Ok(Err(err)) => {
                    warn!(url = %self.settings.url, error = %err, "Realtime handshake failed");
                    self.set_status(ConnectionState::Closed);
                }
                Err(_) => {
                    warn!(url = %self.settings.url, timeout = ?CONNECT_TIMEOUT, "Realtime handshake timed out");
                    self.set_status(ConnectionState::Closed);
                }
            }

            self.failures += 1;
            if let Some(max) = self.settings.max_attempts {
                if self.failures >= max {
                    warn!(attempts = self.failures, "Realtime channel giving up");
                    self.set_status(ConnectionState::Failed);
                    self.state.notify(
                        NoticeLevel::Error,
                        format!("Unable to reach server after {} attempts", self.failures),
                    );
                    return;
                }
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }
        }
    }

    async fn serve(&mut self, socket: Socket) -> Exit {
        let (mut writer, mut reader) = socket.split();

        self.drop_stale_frames();
        if let Some(session_id) = self.sessions.current() {
            let frame = ClientFrame::SessionInit { session_id };
            if !send_frame(&mut writer, &frame).await {
                return Exit::Lost;
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    let close = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client shutdown".into(),
                    };
                    if let Err(err) = writer.send(Message::Close(Some(close))).await {
                        debug!(error = %err, "Close frame not delivered");
                    }
                    return Exit::Shutdown;
                }
                frame = self.outbound.recv(), if self.outbound_open => match frame {
                    Some(frame) => {
                        if !send_frame(&mut writer, &frame).await {
                            return Exit::Lost;
                        }
                    }
                    None => self.outbound_open = false,
                },
                message = reader.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = writer.send(Message::Pong(payload)).await {
                            warn!(error = %err, "Failed to answer ping");
                            return Exit::Lost;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Server closed realtime channel");
                        return Exit::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "Realtime channel error");
                        return Exit::Lost;
                    }
                    None => {
                        info!("Realtime channel ended");
                        return Exit::Lost;
                    }
                },
            }
        }
    }

    /// Frames queued while the socket was down are not replayed.
    fn drop_stale_frames(&mut self) {
        while let Ok(frame) = self.outbound.try_recv() {
            warn!(?frame, "Dropping frame queued while disconnected");
        }
    }

    fn handle_text(&self, text: &str) {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, payload = text, "Ignoring unparseable realtime frame");
                return;
            }
        };

        match frame {
            ServerFrame::SessionId { session_id } => self.sessions.assign_pushed(session_id),
            ServerFrame::Status { status, message } => match status.as_deref() {
                Some("typing") => self.state.emit(ClientEvent::Typing(true)),
                Some("complete") => self.state.emit(ClientEvent::Typing(false)),
                other => debug!(status = ?other, message = ?message, "Ignoring status frame"),
            },
            ServerFrame::Thinking { message } => {
                let text = match message {
                    Some(message) => format!("AI is thinking: {message}"),
                    None => "AI is thinking".to_string(),
                };
                self.state.notify(NoticeLevel::Info, text);
            }
            ServerFrame::ToolCall {
                tool_name,
                arguments,
            } => {
                let name = tool_name.unwrap_or_else(|| "unknown".to_string());
                debug!(tool = %name, ?arguments, "Server reported tool call");
                self.state
                    .notify(NoticeLevel::Info, format!("Calling tool: {name}"));
            }
            ServerFrame::Error { message } => {
                self.state.emit(ClientEvent::Typing(false));
                self.state.notify(
                    NoticeLevel::Error,
                    message.unwrap_or_else(|| "Server reported an error".to_string()),
                );
            }
            ServerFrame::MessageStart
            | ServerFrame::MessageChunk { .. }
            | ServerFrame::MessageComplete { .. } => {
                debug!(payload = text, "Ignoring pushed message frame");
            }
            ServerFrame::Unknown => debug!(payload = text, "Ignoring unknown realtime frame"),
        }
    }
}

/// Returns `false` once the socket can no longer be written.
async fn send_frame(writer: &mut SplitSink<Socket, Message>, frame: &ClientFrame) -> bool {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "Failed to encode outbound frame");
            return true;
        }
    };
    match writer.send(Message::text(payload)).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "Failed to send outbound frame");
            false
        }
    }
}

impl RealtimeHandle {
    pub fn status(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn attempts(&self) -> u32 {
        self.status.borrow().attempts
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Resolves with the outcome of the first connection attempt: `Open`,
    /// `Closed` or `Failed`.
    pub async fn first_attempt(&mut self) -> ConnectionState {
        match self.ready.take() {
            Some(ready) => ready.await.unwrap_or(ConnectionState::Closed),
            None => self.status(),
        }
    }

    /// Close the socket with a normal close frame and stop reconnecting.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Realtime task ended abnormally");
            }
        }
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests;
