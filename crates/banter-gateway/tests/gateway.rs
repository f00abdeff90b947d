//! Surface-level gateway tests: webhook signature enforcement and
//! routing, media-room tokens, and the WebSocket chat frame sequence —
//! all against scripted providers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use banter_agent::provider::TtsClient;
use banter_agent::testing::{MockLlm, MockRound, MockTts};
use banter_channels::channel::Channel;
use banter_channels::credentials::ChannelCredentials;
use banter_channels::error::ChannelError;
use banter_channels::verify::compute_signature;
use banter_checkpoint::memory::MemoryCheckpointStore;
use banter_core::config::BanterConfig;
use banter_core::types::ChannelMessageOut;
use banter_gateway::app::{build_router, AppState};
use banter_gateway::ws::connection::{start_chat_turn, ChatArgs};
use banter_gateway::ws::send::FrameSink;
use banter_memory::memory::InMemoryMemoryStore;
use banter_sessions::memory::MemorySessionStore;
use banter_sessions::store::SessionStore;
use banter_sessions::types::SessionKey;

/// Records every outbound message instead of hitting a network.
#[derive(Default)]
struct CaptureChannel {
    sent: Mutex<Vec<ChannelMessageOut>>,
}

#[async_trait]
impl Channel for CaptureChannel {
    fn name(&self) -> &str {
        "line"
    }

    async fn send(&self, msg: &ChannelMessageOut) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

fn test_state(llm: MockLlm, credentials_json: &str) -> (Arc<AppState>, Arc<CaptureChannel>) {
    test_state_with_tts(llm, None, credentials_json)
}

fn test_state_with_tts(
    llm: MockLlm,
    tts: Option<MockTts>,
    credentials_json: &str,
) -> (Arc<AppState>, Arc<CaptureChannel>) {
    let mut config = BanterConfig::default();
    config.media.url = "wss://media.example".to_string();
    config.media.api_key = "media-key".to_string();
    config.media.api_secret = "media-secret".to_string();

    let state = AppState::assemble(
        config,
        Arc::new(llm),
        tts.map(|t| Arc::new(t) as Arc<dyn TtsClient>),
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(InMemoryMemoryStore::new()),
        Arc::new(ChannelCredentials::from_json(credentials_json).unwrap()),
    );

    let capture = Arc::new(CaptureChannel::default());
    state
        .channels
        .insert("line".to_string(), Arc::clone(&capture) as Arc<dyn Channel>);
    (Arc::new(state), capture)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), "{}");
    let response = build_router(state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn webhook_get_is_liveness() {
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), "{}");
    let response = build_router(state)
        .oneshot(
            Request::get("/channels/line/webhook")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["handled"], 0);
}

const SIGNED_CREDS: &str = r#"{
    "tenants": {"default": {"channels": {"line": {
        "secret_env": "TEST_GW_LINE_SECRET"
    }}}}
}"#;

#[tokio::test]
async fn webhook_accepts_valid_signature_for_empty_events() {
    std::env::set_var("TEST_GW_LINE_SECRET", "s");
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), SIGNED_CREDS);

    let body: &[u8] = br#"{"events":[]}"#;
    let signature = compute_signature("s", body);

    let response = build_router(state)
        .oneshot(
            Request::post("/channels/line/webhook")
                .header("x-line-signature", signature)
                .header("content-type", "application/json")
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["handled"], 0);
}

#[tokio::test]
async fn webhook_rejects_corrupted_signature_and_creates_nothing() {
    std::env::set_var("TEST_GW_LINE_SECRET", "s");
    let (state, capture) = test_state(MockLlm::with_tokens(&["unused"]), SIGNED_CREDS);

    let body = serde_json::json!({
        "events": [{
            "type": "message",
            "replyToken": "rt-1",
            "message": {"type": "text", "text": "hello"},
            "source": {"type": "user", "userId": "u-sig"},
        }]
    })
    .to_string();
    let mut signature = compute_signature("s", body.as_bytes());
    let replacement = if signature.starts_with('A') { "B" } else { "A" };
    signature.replace_range(0..1, replacement);

    let response = build_router(Arc::clone(&state))
        .oneshot(
            Request::post("/channels/line/webhook")
                .header("x-line-signature", signature)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // No session was created and nothing was dispatched.
    let key = SessionKey::new("default", "line", "u-sig");
    assert!(state.sessions.get(&key).await.unwrap().is_none());
    assert!(capture.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn webhook_routes_text_event_through_reflex_and_replies() {
    std::env::set_var("TEST_GW_LINE_SECRET", "s");
    let (state, capture) = test_state(MockLlm::with_tokens(&["unused"]), SIGNED_CREDS);

    let body = serde_json::json!({
        "events": [
            {
                "type": "message",
                "replyToken": "rt-9",
                "message": {"type": "text", "text": "hello"},
                "source": {"type": "user", "userId": "u-hook"},
            },
            {"type": "follow"}
        ]
    })
    .to_string();
    let signature = compute_signature("s", body.as_bytes());

    let response = build_router(Arc::clone(&state))
        .oneshot(
            Request::post("/channels/line/webhook")
                .header("x-line-signature", signature)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["handled"], 1);

    let sent = capture.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "Hi! How can I help you?");
    assert_eq!(sent[0].target_id, "u-hook");
    assert_eq!(
        sent[0].metadata.get("reply_token").and_then(|v| v.as_str()),
        Some("rt-9")
    );
    drop(sent);

    // The same tuple resolves to the same session on the next call.
    let key = SessionKey::new("default", "line", "u-hook");
    assert!(state.sessions.get(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn room_token_mints_scoped_jwt() {
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), "{}");

    let response = build_router(state)
        .oneshot(
            Request::post("/rooms/token")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "tenant_id": "acme",
                        "session_id": "sess/1",
                        "identity": "alice",
                        "ttl_seconds": 999_999_999u64,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["url"], "wss://media.example");
    let room = json["room"].as_str().unwrap();
    assert_eq!(room, "t-acme-s-sess-1");

    #[derive(serde::Deserialize)]
    struct Grants {
        room: String,
        #[serde(rename = "roomJoin")]
        room_join: bool,
        #[serde(rename = "canPublishData")]
        can_publish_data: bool,
    }
    #[derive(serde::Deserialize)]
    struct Claims {
        exp: u64,
        iss: String,
        sub: String,
        video: Grants,
    }

    let token = json["token"].as_str().unwrap();
    let decoded = jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(b"media-secret"),
        &jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .unwrap();
    assert_eq!(decoded.claims.iss, "media-key");
    assert_eq!(decoded.claims.sub, "alice");
    assert_eq!(decoded.claims.video.room, room);
    assert!(decoded.claims.video.room_join);
    assert!(decoded.claims.video.can_publish_data);

    // TTL request far beyond the cap is clamped to 24h.
    let max_exp = chrono::Utc::now().timestamp() as u64 + 24 * 3600 + 60;
    assert!(decoded.claims.exp <= max_exp);
}

#[tokio::test]
async fn room_token_requires_tenant_and_session() {
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), "{}");
    let response = build_router(state)
        .oneshot(
            Request::post("/rooms/token")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({"tenant_id": "", "session_id": "x"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

async fn collect_frames_until_terminal(
    rx: &mut tokio::sync::mpsc::Receiver<String>,
) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame stream stalled")
            .expect("frame stream closed early");
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let kind = json["type"].as_str().unwrap_or("").to_string();
        frames.push(json);
        if matches!(kind.as_str(), "complete" | "error" | "interrupted") {
            break;
        }
    }
    frames
}

#[tokio::test]
async fn ws_ping_answers_pong_without_a_session() {
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), "{}");
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let sink = FrameSink::new(tx);

    assert!(sink.send_pong().await);
    let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["type"], "pong");
    // RFC3339 timestamp must parse.
    chrono::DateTime::parse_from_rfc3339(frame["timestamp"].as_str().unwrap()).unwrap();

    // Ping never resolves a session.
    let key = SessionKey::new("default", "websocket", "u1");
    assert!(state.sessions.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn ws_reflex_chat_emits_single_final_chunk_then_complete() {
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), "{}");
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let sink = FrameSink::new(tx);

    let session_id = start_chat_turn(
        &state,
        &sink,
        ChatArgs {
            user_id: "u1".to_string(),
            message: "hello".to_string(),
            configuration: None,
            context: None,
            stream_audio: false,
            voice_id: None,
        },
    )
    .await
    .expect("turn should start");

    let frames = collect_frames_until_terminal(&mut rx).await;
    let chunks: Vec<_> = frames
        .iter()
        .filter(|f| f["type"] == "text_chunk")
        .collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["chunk"], "Hi! How can I help you?");
    assert_eq!(chunks[0]["chunk_index"], 1);
    assert_eq!(chunks[0]["is_final"], true);
    assert_eq!(frames.last().unwrap()["type"], "complete");

    // The session is real and stable.
    let key = SessionKey::new("default", "websocket", "u1");
    let session = state.sessions.get(&key).await.unwrap().unwrap();
    assert_eq!(session.id, session_id);
}

#[tokio::test]
async fn ws_cognition_chat_streams_indexed_chunks() {
    let tokens = ["Why", "did", " the", " chicken", " cross", " the", " road", "?"];
    let (state, _) = test_state(MockLlm::with_tokens(&tokens), "{}");
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let sink = FrameSink::new(tx);

    start_chat_turn(
        &state,
        &sink,
        ChatArgs {
            user_id: "u1".to_string(),
            message: "tell me a joke".to_string(),
            configuration: None,
            context: None,
            stream_audio: false,
            voice_id: None,
        },
    )
    .await
    .expect("turn should start");

    let frames = collect_frames_until_terminal(&mut rx).await;
    let chunks: Vec<_> = frames
        .iter()
        .filter(|f| f["type"] == "text_chunk")
        .collect();
    assert_eq!(chunks.len(), 8);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c["chunk_index"], (i + 1) as u64);
        assert_eq!(c["is_final"], i == 7);
    }
    assert_eq!(chunks[7]["chunk"], "?");

    let metadata = frames.iter().find(|f| f["type"] == "metadata").unwrap();
    assert_eq!(metadata["model"], "mock-model");
    assert_eq!(frames.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn ws_second_chat_request_interrupts_first_turn() {
    // Round 1: forty slow tokens; the first sentence closes at token 10
    // so audio is flowing while plenty of stream remains. Round 2 is the
    // barge-in turn's quick reply.
    let mut first_round = Vec::new();
    for i in 0..40 {
        if i == 9 {
            first_round.push("word9. ".to_string());
        } else if i == 39 {
            first_round.push("done.".to_string());
        } else {
            first_round.push(format!("word{i} "));
        }
    }
    let first_refs: Vec<&str> = first_round.iter().map(String::as_str).collect();
    let llm = MockLlm::with_rounds(vec![
        MockRound::text(&first_refs),
        MockRound::text(&["Fresh", " start."]),
    ])
    .delayed(Duration::from_millis(10));
    // Two 700-byte chunks per sentence → at least one full-size frame.
    let (state, _) = test_state_with_tts(llm, Some(MockTts::new(700, 2)), "{}");

    let (tx, mut rx) = tokio::sync::mpsc::channel(512);
    let sink = FrameSink::new(tx);

    start_chat_turn(
        &state,
        &sink,
        ChatArgs {
            user_id: "u1".to_string(),
            message: "tell me something long".to_string(),
            configuration: None,
            context: None,
            stream_audio: true,
            voice_id: Some("voice".to_string()),
        },
    )
    .await
    .expect("first turn should start");

    // Wait until the first sentence's audio is actually on the wire.
    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("first turn stalled")
            .expect("connection closed early");
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let is_audio =
            json["type"] == "audio_chunk" && json["size_bytes"].as_u64().unwrap_or(0) > 0;
        frames.push(json);
        if is_audio {
            break;
        }
    }

    // Second chat_request on the same connection and session barges in.
    start_chat_turn(
        &state,
        &sink,
        ChatArgs {
            user_id: "u1".to_string(),
            message: "never mind, new question".to_string(),
            configuration: None,
            context: None,
            stream_audio: false,
            voice_id: None,
        },
    )
    .await
    .expect("second turn should start");

    // Drain until the new turn completes.
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("stream stalled")
            .expect("connection closed early");
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let done = json["type"] == "complete";
        frames.push(json);
        if done {
            break;
        }
    }

    let interrupted_pos = frames
        .iter()
        .position(|f| f["type"] == "interrupted")
        .expect("old turn must emit interrupted");
    let interrupted = &frames[interrupted_pos];
    assert_eq!(interrupted["reason"], "new_message");
    assert!(interrupted["interrupted_at_text_chunk"].as_u64().unwrap() >= 1);
    assert!(interrupted["interrupted_at_audio_chunk"].as_u64().unwrap() >= 1);

    // Nothing from the old turn leaks past the marker: no audio frames
    // appear after it (the new turn is text-only), and the first text
    // chunk after it restarts the sequence at 1.
    let after = &frames[interrupted_pos + 1..];
    assert!(after.iter().all(|f| f["type"] != "audio_chunk"));
    let first_text = after
        .iter()
        .find(|f| f["type"] == "text_chunk")
        .expect("new turn must stream text");
    assert_eq!(first_text["chunk_index"], 1);

    // The new turn proceeds normally on the same wire.
    let new_text: String = after
        .iter()
        .filter(|f| f["type"] == "text_chunk")
        .map(|f| f["chunk"].as_str().unwrap())
        .collect();
    assert_eq!(new_text, "Fresh start.");
    assert_eq!(frames.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn ws_invalid_request_starts_no_turn() {
    let (state, _) = test_state(MockLlm::with_tokens(&["unused"]), "{}");
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let sink = FrameSink::new(tx);

    let result = start_chat_turn(
        &state,
        &sink,
        ChatArgs {
            user_id: "u1".to_string(),
            message: "   ".to_string(),
            configuration: None,
            context: None,
            stream_audio: false,
            voice_id: None,
        },
    )
    .await;
    assert!(result.is_none());

    let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], "INVALID_REQUEST");

    let key = SessionKey::new("default", "websocket", "u1");
    assert!(state.sessions.get(&key).await.unwrap().is_none());
}
