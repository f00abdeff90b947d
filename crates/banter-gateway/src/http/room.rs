//! Media-room token endpoint — POST /rooms/token.
//!
//! Mints a JWT for the embedded media-room service. The room name is a
//! pure function of (tenant, session); credentials are tenant-scoped
//! through the channels table with config defaults as fallback.

use axum::{extract::State, http::StatusCode, Json};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use banter_core::config::{MAX_ROOM_NAME_LEN, MAX_ROOM_TOKEN_TTL_SECS};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct RoomTokenRequest {
    pub tenant_id: String,
    pub session_id: String,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct VideoGrants {
    room: String,
    #[serde(rename = "roomJoin")]
    room_join: bool,
    #[serde(rename = "canPublish")]
    can_publish: bool,
    #[serde(rename = "canSubscribe")]
    can_subscribe: bool,
    #[serde(rename = "canPublishData")]
    can_publish_data: bool,
}

#[derive(Debug, Serialize)]
struct RoomClaims {
    exp: u64,
    iss: String,
    sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<String>,
    video: VideoGrants,
}

/// POST /rooms/token
pub async fn room_token_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoomTokenRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if req.tenant_id.trim().is_empty() || req.session_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "tenant_id and session_id are required"})),
        ));
    }

    // Tenant-scoped keys via the credentials table ("media" channel),
    // falling back to the static config pair.
    let api_key = state
        .credentials
        .token(&req.tenant_id, "media", "default")
        .unwrap_or_else(|| state.config.media.api_key.clone());
    let api_secret = state
        .credentials
        .secret(&req.tenant_id, "media", "default")
        .unwrap_or_else(|| state.config.media.api_secret.clone());
    if api_key.is_empty() || api_secret.is_empty() {
        warn!(tenant = %req.tenant_id, "media credentials not configured");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "media credentials not configured"})),
        ));
    }

    let room = derive_room_name(&req.tenant_id, &req.session_id);
    let identity = req
        .identity
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("user-{}", uuid::Uuid::new_v4()));
    let ttl = req
        .ttl_seconds
        .unwrap_or(3600)
        .min(MAX_ROOM_TOKEN_TTL_SECS);

    let claims = RoomClaims {
        exp: chrono::Utc::now().timestamp() as u64 + ttl,
        iss: api_key.clone(),
        sub: identity,
        name: req.name.clone(),
        metadata: req.metadata.clone(),
        video: VideoGrants {
            room: room.clone(),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
        },
    };

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(api_key);
    let token = encode(&header, &claims, &EncodingKey::from_secret(api_secret.as_bytes()))
        .map_err(|e| {
            warn!(error = %e, "room token signing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "token signing failed"})),
            )
        })?;

    info!(tenant = %req.tenant_id, room = %room, ttl, "room token issued");
    Ok(Json(json!({
        "url": state.config.media.url,
        "room": room,
        "token": token,
    })))
}

/// Derive the deterministic room name `t-{tenant}-s-{session}`,
/// sanitized to `[A-Za-z0-9_-]` and trimmed to the maximum length.
pub fn derive_room_name(tenant_id: &str, session_id: &str) -> String {
    let raw = format!("t-{tenant_id}-s-{session_id}");
    let mut sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    sanitized.truncate(MAX_ROOM_NAME_LEN);
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_name_is_deterministic() {
        let a = derive_room_name("acme", "sess-1");
        let b = derive_room_name("acme", "sess-1");
        assert_eq!(a, b);
        assert_eq!(a, "t-acme-s-sess-1");
    }

    #[test]
    fn room_name_sanitizes_and_truncates() {
        let name = derive_room_name("a b/c", "日本x");
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert_eq!(name, "t-a-b-c-s---x");

        let long = derive_room_name(&"x".repeat(100), "s");
        assert_eq!(long.len(), MAX_ROOM_NAME_LEN);
    }

    #[test]
    fn room_name_always_matches_contract() {
        for (t, s) in [
            ("acme", "s1"),
            ("te na nt", "se/ss"),
            ("ünïcode", "überlang"),
            ("a", &"b".repeat(200) as &str),
        ] {
            let name = derive_room_name(t, s);
            assert!(!name.is_empty());
            assert!(name.len() <= MAX_ROOM_NAME_LEN);
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }
}
