use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use banter_agent::orchestrator::TurnRequest;
use banter_checkpoint::thread::resolve_thread_id;
use banter_core::types::ChannelMessageIn;
use banter_sessions::types::SessionKey;

use crate::app::AppState;
use crate::ws::message::{ClientMessage, Configuration, Context};
use crate::ws::send::{frame_for_event, FrameSink};

/// Outbound frame queue depth per connection.
const OUTBOUND_QUEUE: usize = 256;

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task — lives for the entire WS session lifetime.
///
/// A single writer task owns the socket sink; turn tasks enqueue frames
/// through the [`FrameSink`], which keeps per-connection ordering. The
/// connection survives turn-level errors — the client may just submit
/// another chat_request.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "new WS connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let sink = FrameSink::new(out_tx);

    let writer = tokio::spawn(async move {
        while let Some(json) = out_rx.recv().await {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // The most recent session this connection started a turn on; used
    // to cancel in-flight work when the transport closes.
    let mut active_session: Option<String> = None;

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let parsed: Result<ClientMessage, _> = serde_json::from_str(text.as_str());
                match parsed {
                    Ok(ClientMessage::Ping) => {
                        if !sink.send_pong().await {
                            break;
                        }
                    }
                    Ok(ClientMessage::ChatRequest {
                        user_id,
                        message,
                        configuration,
                        context,
                        stream_audio,
                        voice_id,
                    }) => {
                        match start_chat_turn(
                            &state,
                            &sink,
                            ChatArgs {
                                user_id,
                                message,
                                configuration,
                                context,
                                stream_audio,
                                voice_id,
                            },
                        )
                        .await
                        {
                            Some(session_id) => active_session = Some(session_id),
                            None => continue,
                        }
                    }
                    Err(e) => {
                        debug!(conn_id = %conn_id, error = %e, "malformed frame");
                        if !sink
                            .send_error("INVALID_REQUEST", "malformed message")
                            .await
                        {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    // Transport closed: cancel whatever turn is still running.
    if let Some(session_id) = active_session {
        state.orchestrator.interrupt(&session_id);
    }
    writer.abort();
    info!(conn_id = %conn_id, "WS connection closed");
}

pub struct ChatArgs {
    pub user_id: String,
    pub message: String,
    pub configuration: Option<Configuration>,
    pub context: Option<Context>,
    pub stream_audio: bool,
    pub voice_id: Option<String>,
}

/// Validate, resolve the session, and launch the turn. Frames stream to
/// the sink from a spawned task; returns the session id the turn runs
/// on, or `None` when no turn was started.
pub async fn start_chat_turn(
    state: &Arc<AppState>,
    sink: &FrameSink,
    args: ChatArgs,
) -> Option<String> {
    if args.user_id.trim().is_empty() || args.message.trim().is_empty() {
        sink.send_error("INVALID_REQUEST", "user_id and message are required")
            .await;
        return None;
    }

    let context = args.context.unwrap_or_default();
    let tenant_id = context
        .tenant_id
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "default".to_string());

    let inbound = ChannelMessageIn::new(&tenant_id, "websocket", &args.user_id, &args.message);
    if !state.policy.allow(&inbound) {
        sink.send_error("POLICY_DENIED", "tenant policy denied this request")
            .await;
        return None;
    }

    let key = SessionKey::from_inbound(&inbound);
    let mut session = match state.sessions.get_or_create(&key).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "session lookup failed");
            sink.send_error("BACKEND_UNAVAILABLE", &e.to_string()).await;
            return None;
        }
    };

    // An explicit context.session_id pins the checkpoint thread;
    // otherwise the session's own thread is used.
    let thread_id = match &context.session_id {
        Some(sid) if !sid.is_empty() => resolve_thread_id(Some(sid), Some(&args.user_id), "default"),
        _ => session.thread_id.clone(),
    };

    let configuration = args.configuration.unwrap_or_default();
    let request = TurnRequest {
        session_id: session.id.clone(),
        thread_id,
        user_id: args.user_id.clone(),
        text: args.message.clone(),
        stream_audio: args.stream_audio,
        voice_id: args.voice_id.clone(),
        model: configuration.model,
        temperature: configuration.temperature,
        max_tokens: configuration.max_tokens,
        user_name: context.user_name.clone(),
        audio_features: context.audio_features.clone(),
    };

    // Starting the turn preempts any in-flight turn on the same
    // session; the old stream ends with `interrupted` before this one
    // emits anything.
    let mut events = state.orchestrator.process(request);

    let session_id = session.id.clone();
    let forward_sink = sink.clone();
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !forward_sink.send(&frame_for_event(&event)).await {
                break;
            }
        }
        session.touch();
        if let Err(e) = sessions.save(&session).await {
            warn!(error = %e, "failed to persist session touch");
        }
    });

    Some(session_id)
}
