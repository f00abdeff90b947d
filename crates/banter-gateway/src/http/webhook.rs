//! Webhook ingress for push channels — POST /channels/{channel}/webhook.
//!
//! The raw body is HMAC-verified against the tenant-scoped secret before
//! anything is parsed; a bad signature means no session, no turn, no
//! outbound. Only text-message events are processed.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use banter_core::types::ChannelMessageIn;

use crate::app::AppState;
use crate::route::route_inbound;

/// GET on the webhook path — liveness/URL verification.
pub async fn webhook_verify() -> Json<Value> {
    Json(json!({ "status": "ok", "handled": 0 }))
}

/// POST /channels/{channel}/webhook
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant_id = tenant_id(&headers);

    verify_signature(&state, &tenant_id, &channel, &headers, &body)?;

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(channel = %channel, error = %e, "invalid JSON in webhook body");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid JSON body"})),
        )
    })?;

    let mut handled = 0;
    for event in payload["events"].as_array().cloned().unwrap_or_default() {
        if !is_text_event(&event) {
            continue;
        }
        let inbound = inbound_from_event(&tenant_id, &channel, &event);
        route_inbound(&state, inbound).await.map_err(|e| {
            warn!(channel = %channel, error = %e, "webhook routing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
        })?;
        handled += 1;
    }

    info!(channel = %channel, tenant = %tenant_id, handled, "webhook processed");
    Ok(Json(json!({ "status": "ok", "handled": handled })))
}

fn tenant_id(headers: &HeaderMap) -> String {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("default")
        .to_string()
}

/// Channel-specific signature header name.
fn signature_header(channel: &str) -> &'static str {
    match channel {
        "line" => "x-line-signature",
        _ => "x-signature",
    }
}

/// Verify the request HMAC when the tenant has a secret configured for
/// this channel. No secret configured means verification is skipped
/// (operator opted out).
fn verify_signature(
    state: &AppState,
    tenant_id: &str,
    channel: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(secret) = state.credentials.secret(tenant_id, channel, "default") else {
        return Ok(());
    };

    let header = headers
        .get(signature_header(channel))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if banter_channels::verify::verify_signature(&secret, body, header) {
        Ok(())
    } else {
        warn!(tenant = %tenant_id, channel = %channel, "webhook signature mismatch");
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid signature"})),
        ))
    }
}

fn is_text_event(event: &Value) -> bool {
    event["type"] == "message" && event["message"]["type"] == "text"
}

/// Normalize one platform event into the internal envelope. This is the
/// adapter's whole job — nothing downstream looks at the raw payload.
fn inbound_from_event(tenant_id: &str, channel: &str, event: &Value) -> ChannelMessageIn {
    let source = &event["source"];
    let source_type = source["type"].as_str().unwrap_or("user");
    let target_id = match source_type {
        "group" => source["groupId"].as_str().unwrap_or("unknown"),
        "room" => source["roomId"].as_str().unwrap_or("unknown"),
        _ => source["userId"].as_str().unwrap_or("unknown"),
    };
    let sender_id = source["userId"].as_str().unwrap_or("unknown");
    let text = event["message"]["text"].as_str().unwrap_or("");

    let mut metadata = serde_json::Map::new();
    metadata.insert("event_id".into(), event["webhookEventId"].clone());
    metadata.insert("timestamp".into(), event["timestamp"].clone());
    metadata.insert(
        "reply_token".into(),
        event["replyToken"].clone(),
    );
    metadata.insert("source_type".into(), json!(source_type));
    metadata.insert("sender_id".into(), json!(sender_id));
    metadata.insert("target_id".into(), json!(target_id));

    ChannelMessageIn::new(tenant_id, channel, target_id, text).with_metadata(metadata)
}
