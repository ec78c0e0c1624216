//! GeminiLiveClient against a local WebSocket server.

use futures::{SinkExt, StreamExt};
use llm::{
    GeminiLiveClient, LiveClientOptions, LiveError, LiveEvent, LiveMessage, LiveSession,
    SessionConfig, ToolDeclaration,
};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

type ServerSocket = WebSocketStream<TcpStream>;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("ws://{}", listener.local_addr().unwrap());
    (listener, base)
}

fn options(base: String) -> LiveClientOptions {
    LiveClientOptions {
        base_url: base,
        api_key: "test-key".to_string(),
        outbound_buffer: 8,
        connect_timeout: Duration::from_secs(2),
        disconnect_timeout: Duration::from_secs(1),
    }
}

fn config() -> SessionConfig {
    SessionConfig::builder("models/test-live")
        .voice_name("Aoede")
        .system_instruction("Interview the candidate")
        .tool(ToolDeclaration::no_args("conclude_interview", "End the interview"))
        .build()
}

async fn next_json(ws: &mut ServerSocket) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

async fn accept_and_setup(listener: &TcpListener) -> (ServerSocket, Value) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let setup = next_json(&mut ws).await;
    (ws, setup)
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<LiveEvent>) -> LiveEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_session_roundtrip_and_local_disconnect() {
    let (listener, base) = bind().await;

    let server = tokio::spawn(async move {
        let (mut ws, setup) = accept_and_setup(&listener).await;
        assert_eq!(setup["setup"]["model"], "models/test-live");
        assert_eq!(
            setup["setup"]["tools"][0]["functionDeclarations"][0]["name"],
            "conclude_interview"
        );
        send_json(&mut ws, json!({"setupComplete": {}})).await;

        send_json(
            &mut ws,
            json!({"serverContent": {
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAEC"}},
                    {"text": "Hello"}
                ]},
                "turnComplete": true
            }}),
        )
        .await;
        send_json(
            &mut ws,
            json!({"toolCall": {"functionCalls": [{"id": "c1", "name": "conclude_interview", "args": {}}]}}),
        )
        .await;

        let media = next_json(&mut ws).await;
        assert_eq!(media["realtimeInput"]["mediaChunks"][0]["mimeType"], "audio/pcm;rate=16000");

        let response = next_json(&mut ws).await;
        assert_eq!(response["toolResponse"]["functionResponses"][0]["id"], "c1");

        // Echo the client's close.
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    });

    let mut client = GeminiLiveClient::new(options(base));
    let mut events = client.subscribe();
    client.connect(&config()).await.unwrap();
    assert!(client.is_connected());

    assert_eq!(
        recv_event(&mut events).await,
        LiveEvent::AudioChunk { data: vec![0, 1, 2], sample_rate: 24_000 }
    );
    assert_eq!(recv_event(&mut events).await, LiveEvent::TextDelta { text: "Hello".into() });
    assert_eq!(recv_event(&mut events).await, LiveEvent::TurnComplete);
    let call_id = match recv_event(&mut events).await {
        LiveEvent::ToolCall { name, call_id, .. } => {
            assert_eq!(name, "conclude_interview");
            call_id
        }
        other => panic!("expected tool call, got {:?}", other),
    };

    client
        .send(LiveMessage::MediaChunk {
            mime_type: "audio/pcm;rate=16000".into(),
            data: vec![0; 640],
        })
        .unwrap();
    client
        .send(LiveMessage::ToolResponse {
            call_id,
            name: "conclude_interview".into(),
            result: json!({"result": "ok"}),
        })
        .unwrap();

    client.disconnect().await;
    client.disconnect().await;
    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .unwrap()
        .unwrap();

    assert!(!client.is_connected());
    assert_eq!(
        client.send(LiveMessage::ClientContent { text: "hi".into(), turn_complete: true }),
        Err(LiveError::NotConnected)
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err(), "local disconnect must not emit Closed");
}

#[tokio::test]
async fn test_policy_close_during_setup_is_auth_rejected() {
    let (listener, base) = bind().await;
    tokio::spawn(async move {
        let (mut ws, _) = accept_and_setup(&listener).await;
        let _ = ws
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "API key not valid".into(),
            })))
            .await;
        let _ = ws.next().await;
    });

    let mut client = GeminiLiveClient::new(options(base));
    let err = client.connect(&config()).await.unwrap_err();
    assert!(matches!(err, LiveError::AuthRejected(reason) if reason.contains("API key")));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_http_403_upgrade_is_auth_rejected() {
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    let (listener, base) = bind().await;
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let _ = tokio_tungstenite::accept_hdr_async(tcp, |_req: &Request, _resp: Response| {
            let denied: ErrorResponse = tokio_tungstenite::tungstenite::http::Response::builder()
                .status(403)
                .body(Some("forbidden".to_string()))
                .unwrap();
            Err(denied)
        })
        .await;
    });

    let mut client = GeminiLiveClient::new(options(base));
    let err = client.connect(&config()).await.unwrap_err();
    assert!(matches!(err, LiveError::AuthRejected(_)));
}

#[tokio::test]
async fn test_missing_setup_complete_times_out() {
    let (listener, base) = bind().await;
    let server = tokio::spawn(async move {
        let (ws, _) = accept_and_setup(&listener).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(ws);
    });

    let mut opts = options(base);
    opts.connect_timeout = Duration::from_millis(200);
    let mut client = GeminiLiveClient::new(opts);
    let err = client.connect(&config()).await.unwrap_err();
    assert_eq!(err, LiveError::Timeout(Duration::from_millis(200)));
    assert!(!client.is_connected());
    server.abort();
}

#[tokio::test]
async fn test_dropped_handshake_leaves_no_connection() {
    let (listener, base) = bind().await;
    let (setup_seen, setup_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_and_setup(&listener).await;
        let _ = setup_seen.send(());
        // Never answer; read until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut client = GeminiLiveClient::new(options(base));
    let cfg = config();
    {
        let attempt = client.connect(&cfg);
        tokio::pin!(attempt);
        tokio::select! {
            result = &mut attempt => panic!("handshake finished without setupComplete: {:?}", result),
            _ = setup_rx => {}
        }
    }

    assert!(!client.is_connected());
    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server never saw the socket close")
        .unwrap();
}

#[tokio::test]
async fn test_cancelled_disconnect_still_drops_the_socket() {
    let (listener, base) = bind().await;
    let (cancelled, cancelled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_and_setup(&listener).await;
        send_json(&mut ws, json!({"setupComplete": {}})).await;
        let _ = cancelled_rx.await;
        // Raw reads, so the client's close frame is never answered.
        let tcp = ws.get_mut();
        let mut buf = [0u8; 256];
        while tcp.read(&mut buf).await.is_ok_and(|n| n > 0) {}
    });

    let mut client = GeminiLiveClient::new(options(base));
    client.connect(&config()).await.unwrap();
    let gave_up = tokio::time::timeout(Duration::from_millis(100), client.disconnect()).await;
    assert!(gave_up.is_err());
    assert!(!client.is_connected());

    let _ = cancelled.send(());
    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("connection tasks outlived the cancelled disconnect")
        .unwrap();
}

#[tokio::test]
async fn test_remote_close_emits_closed_once() {
    let (listener, base) = bind().await;
    tokio::spawn(async move {
        let (mut ws, _) = accept_and_setup(&listener).await;
        send_json(&mut ws, json!({"setupComplete": {}})).await;
        let _ = ws
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "internal".into(),
            })))
            .await;
        while ws.next().await.is_some() {}
    });

    let mut client = GeminiLiveClient::new(options(base));
    let mut first = client.subscribe();
    let mut second = client.subscribe();
    client.connect(&config()).await.unwrap();

    assert_eq!(recv_event(&mut first).await, LiveEvent::Closed { code: Some(1011) });
    assert_eq!(recv_event(&mut second).await, LiveEvent::Closed { code: Some(1011) });
    assert!(!client.is_connected());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(first.try_recv().is_err());
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let (listener, base) = bind().await;
    tokio::spawn(async move {
        let (mut ws, _) = accept_and_setup(&listener).await;
        send_json(&mut ws, json!({"setupComplete": {}})).await;
        while ws.next().await.is_some() {}
    });

    let mut client = GeminiLiveClient::new(options(base));
    client.connect(&config()).await.unwrap();
    assert_eq!(client.connect(&config()).await, Err(LiveError::AlreadyConnected));
    client.disconnect().await;
}

#[tokio::test]
async fn test_garbage_frame_is_protocol_error_not_close() {
    let (listener, base) = bind().await;
    tokio::spawn(async move {
        let (mut ws, _) = accept_and_setup(&listener).await;
        send_json(&mut ws, json!({"setupComplete": {}})).await;
        ws.send(Message::Text("{{not json".to_string())).await.unwrap();
        send_json(&mut ws, json!({"serverContent": {"interrupted": true}})).await;
        while ws.next().await.is_some() {}
    });

    let mut client = GeminiLiveClient::new(options(base));
    let mut events = client.subscribe();
    client.connect(&config()).await.unwrap();

    assert!(matches!(
        recv_event(&mut events).await,
        LiveEvent::Error { kind: llm::LiveEventKind::Protocol, .. }
    ));
    assert_eq!(recv_event(&mut events).await, LiveEvent::Interrupted);
    assert!(client.is_connected());
    client.disconnect().await;
}
