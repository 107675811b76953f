use super::*;
use crate::core::config::Endpoints;
use crate::utils::test_utils::test_http_client;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

type ServerSocket = WebSocketStream<TcpStream>;

struct Harness {
    state: Arc<AppState>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    handle: RealtimeHandle,
}

fn settings(url: String, delay_ms: u64, max_attempts: Option<u32>) -> RealtimeSettings {
    RealtimeSettings {
        url,
        reconnect_delay: Duration::from_millis(delay_ms),
        max_attempts,
    }
}

fn start(settings: RealtimeSettings, session: Option<&str>) -> Harness {
    let (state, events) = AppState::new();
    if let Some(id) = session {
        state.with_conversation(|conversation| {
            let generation = conversation.session.generation();
            conversation.session.install_created(generation, id.to_string());
        });
    }
    let sessions = Arc::new(SessionClient::new(
        test_http_client(),
        "http://127.0.0.1:1",
        Endpoints::default(),
        Arc::clone(&state),
    ));
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let handle = RealtimeChannel::new(settings, Arc::clone(&state), sessions, outbound_rx).spawn();
    Harness {
        state,
        events,
        outbound,
        handle,
    }
}

/// Accept connections forever, handing each upgraded socket to `script`
/// together with its zero-based connection index.
async fn spawn_ws_server<F, Fut>(script: F) -> String
where
    F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut index = 0;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(socket) = accept_async(stream).await else {
                continue;
            };
            tokio::spawn(script(index, socket));
            index += 1;
        }
    });
    format!("ws://{addr}/ws")
}

async fn hold_open(mut socket: ServerSocket) {
    while let Some(Ok(message)) = socket.next().await {
        if message.is_close() {
            break;
        }
    }
}

async fn wait_for_event(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    mut matches: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event should arrive")
}

async fn wait_for_status(handle: &RealtimeHandle, wanted: ConnectionState) {
    let mut status = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.state == wanted))
        .await
        .expect("status should be reached")
        .expect("channel task alive");
}

#[tokio::test]
async fn settings_derive_socket_url_from_base() {
    let config = Config {
        base_url: Some("https://chat.example.org/".to_string()),
        ..Config::default()
    };
    let settings = RealtimeSettings::from_config(&config);
    assert_eq!(settings.url, "wss://chat.example.org/ws");
    assert_eq!(settings.reconnect_delay, Duration::from_millis(3000));
    assert_eq!(settings.max_attempts, Some(5));

    let config = Config {
        ws_url: Some("ws://push.example.org/live".to_string()),
        max_reconnect_attempts: Some(0),
        ..Config::default()
    };
    let settings = RealtimeSettings::from_config(&config);
    assert_eq!(settings.url, "ws://push.example.org/live");
    assert_eq!(settings.max_attempts, None);
}

#[tokio::test]
async fn reconnects_only_after_the_delay() {
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    let url = spawn_ws_server(move |index, mut socket| {
        let accepted_tx = accepted_tx.clone();
        async move {
            let _ = accepted_tx.send(Instant::now());
            if index == 0 {
                let close = CloseFrame {
                    code: CloseCode::Error,
                    reason: "internal failure".into(),
                };
                let _ = socket.send(Message::Close(Some(close))).await;
                let _ = socket.next().await;
            } else {
                hold_open(socket).await;
            }
        }
    })
    .await;
    let mut harness = start(settings(url, 300, None), None);

    let first = accepted.recv().await.expect("first connection");
    let second = tokio::time::timeout(Duration::from_secs(5), accepted.recv())
        .await
        .expect("reconnect should happen")
        .expect("second connection");
    assert!(second.duration_since(first) >= Duration::from_millis(300));

    wait_for_status(&harness.handle, ConnectionState::Open).await;
    harness.handle.shutdown().await;
}

#[tokio::test]
async fn normal_server_close_still_reconnects() {
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    let url = spawn_ws_server(move |index, mut socket| {
        let accepted_tx = accepted_tx.clone();
        async move {
            let _ = accepted_tx.send(index);
            if index == 0 {
                let _ = socket.close(None).await;
            } else {
                hold_open(socket).await;
            }
        }
    })
    .await;
    let mut harness = start(settings(url, 20, None), None);

    assert_eq!(accepted.recv().await, Some(0));
    let second = tokio::time::timeout(Duration::from_secs(5), accepted.recv())
        .await
        .expect("reconnect should happen");
    assert_eq!(second, Some(1));
    harness.handle.shutdown().await;
}

#[tokio::test]
async fn pushed_session_id_is_adopted() {
    let url = spawn_ws_server(|_, mut socket| async move {
        let _ = socket
            .send(Message::text(
                r#"{"type":"session_id","session_id":"ws-1"}"#,
            ))
            .await;
        hold_open(socket).await;
    })
    .await;
    let mut harness = start(settings(url, 20, None), None);

    let event = wait_for_event(&mut harness.events, |event| {
        matches!(event, ClientEvent::SessionAssigned(_))
    })
    .await;
    assert_eq!(event, ClientEvent::SessionAssigned("ws-1".to_string()));
    assert_eq!(harness.state.session_id().as_deref(), Some("ws-1"));
    harness.handle.shutdown().await;
}

#[tokio::test]
async fn status_frames_drive_typing_and_junk_is_ignored() {
    let url = spawn_ws_server(|_, mut socket| async move {
        for frame in [
            "definitely not json",
            r#"{"type":"mystery","payload":1}"#,
            r#"{"type":"message_chunk","content":"ignored"}"#,
            r#"{"type":"status","status":"typing"}"#,
            r#"{"type":"thinking","message":"planning"}"#,
            r#"{"type":"status","status":"complete"}"#,
        ] {
            let _ = socket.send(Message::text(frame)).await;
        }
        hold_open(socket).await;
    })
    .await;
    let mut harness = start(settings(url, 20, None), None);

    let typing = wait_for_event(&mut harness.events, |event| {
        matches!(event, ClientEvent::Typing(_))
    })
    .await;
    assert_eq!(typing, ClientEvent::Typing(true));
    let thinking = wait_for_event(&mut harness.events, |event| {
        matches!(event, ClientEvent::Notice { text, .. } if text.contains("thinking"))
    })
    .await;
    assert_eq!(
        thinking,
        ClientEvent::Notice {
            level: NoticeLevel::Info,
            text: "AI is thinking: planning".to_string()
        }
    );
    let typing = wait_for_event(&mut harness.events, |event| {
        matches!(event, ClientEvent::Typing(_))
    })
    .await;
    assert_eq!(typing, ClientEvent::Typing(false));

    assert_eq!(harness.handle.status(), ConnectionState::Open);
    harness.handle.shutdown().await;
}

#[tokio::test]
async fn session_init_is_sent_on_every_open() {
    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    let url = spawn_ws_server(move |index, mut socket| {
        let frames_tx = frames_tx.clone();
        async move {
            if let Some(Ok(Message::Text(text))) = socket.next().await {
                let _ = frames_tx.send(text.as_str().to_string());
            }
            if index == 0 {
                let _ = socket.close(None).await;
            } else {
                hold_open(socket).await;
            }
        }
    })
    .await;
    let mut harness = start(settings(url, 20, None), Some("s-9"));

    for _ in 0..2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .expect("frame should arrive")
            .expect("frame");
        let value: serde_json::Value = serde_json::from_str(&frame).expect("json frame");
        assert_eq!(
            value,
            serde_json::json!({"type": "session_init", "session_id": "s-9"})
        );
    }
    harness.handle.shutdown().await;
}

#[tokio::test]
async fn outbound_frames_reach_an_open_socket() {
    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    let url = spawn_ws_server(move |_, mut socket| {
        let frames_tx = frames_tx.clone();
        async move {
            while let Some(Ok(message)) = socket.next().await {
                if let Message::Text(text) = message {
                    let _ = frames_tx.send(text.as_str().to_string());
                }
            }
        }
    })
    .await;
    let mut harness = start(settings(url, 20, None), None);
    assert_eq!(harness.handle.first_attempt().await, ConnectionState::Open);

    harness
        .outbound
        .send(ClientFrame::SessionInit {
            session_id: "late".to_string(),
        })
        .expect("channel open");

    let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("frame should arrive")
        .expect("frame");
    assert!(frame.contains("\"late\""));
    harness.handle.shutdown().await;
}

#[tokio::test]
async fn gives_up_after_max_attempts_with_one_notice() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut harness = start(settings(format!("ws://{addr}/ws"), 10, Some(3)), None);
    assert_eq!(harness.handle.first_attempt().await, ConnectionState::Closed);
    wait_for_status(&harness.handle, ConnectionState::Failed).await;
    harness.handle.shutdown().await;

    let mut error_notices = 0;
    let mut failed_transitions = 0;
    while let Ok(event) = harness.events.try_recv() {
        match event {
            ClientEvent::Notice {
                level: NoticeLevel::Error,
                ..
            } => error_notices += 1,
            ClientEvent::ConnectionChanged(ConnectionState::Failed) => failed_transitions += 1,
            _ => {}
        }
    }
    assert_eq!(error_notices, 1);
    assert_eq!(failed_transitions, 1);
    assert_eq!(harness.handle.status(), ConnectionState::Failed);
    assert_eq!(harness.handle.attempts(), 3);
}

#[tokio::test]
async fn shutdown_closes_normally_and_never_reconnects() {
    let (closed_tx, mut closed) = mpsc::unbounded_channel();
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    let url = spawn_ws_server(move |index, mut socket| {
        let closed_tx = closed_tx.clone();
        let accepted_tx = accepted_tx.clone();
        async move {
            let _ = accepted_tx.send(index);
            while let Some(Ok(message)) = socket.next().await {
                if let Message::Close(frame) = message {
                    let _ = closed_tx.send(frame.map(|frame| frame.code));
                    break;
                }
            }
        }
    })
    .await;
    let mut harness = start(settings(url, 20, None), None);
    assert_eq!(harness.handle.first_attempt().await, ConnectionState::Open);
    assert_eq!(accepted.recv().await, Some(0));

    harness.handle.shutdown().await;

    let code = tokio::time::timeout(Duration::from_secs(5), closed.recv())
        .await
        .expect("close should arrive")
        .expect("close frame");
    assert_eq!(code, Some(CloseCode::Normal));
    assert_eq!(harness.handle.status(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(accepted.try_recv().is_err());
}

#[tokio::test]
async fn pings_are_answered_with_matching_pongs() {
    let (pong_tx, mut pongs) = mpsc::unbounded_channel();
    let url = spawn_ws_server(move |_, mut socket| {
        let pong_tx = pong_tx.clone();
        async move {
            let _ = socket
                .send(Message::Ping(b"keepalive-7".to_vec().into()))
                .await;
            while let Some(Ok(message)) = socket.next().await {
                if let Message::Pong(payload) = message {
                    let _ = pong_tx.send(payload.to_vec());
                    break;
                }
            }
            hold_open(socket).await;
        }
    })
    .await;
    let mut harness = start(settings(url, 20, None), None);

    let payload = tokio::time::timeout(Duration::from_secs(5), pongs.recv())
        .await
        .expect("pong should arrive")
        .expect("pong payload");
    assert_eq!(payload, b"keepalive-7".to_vec());
    assert_eq!(harness.handle.status(), ConnectionState::Open);
    harness.handle.shutdown().await;
}
