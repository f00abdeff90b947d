use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use banter_core::config::OUTBOUND_DISPATCH_TIMEOUT_SECS;
use banter_core::types::ChannelMessageOut;

use crate::channel::Channel;
use crate::credentials::ChannelCredentials;
use crate::error::ChannelError;

/// Outbound client for LINE-style chat platforms.
///
/// Delivery strategy: if the inbound carried a short-lived reply handle
/// (`reply_token` in metadata), use the reply endpoint; otherwise push
/// to the target id. Tokens resolve per tenant through the credentials
/// table, with an optional static fallback token from config.
pub struct ChatPlatformClient {
    name: String,
    api_base: String,
    client: reqwest::Client,
    credentials: Arc<ChannelCredentials>,
    fallback_token: Option<String>,
}

impl ChatPlatformClient {
    pub fn new(
        name: impl Into<String>,
        api_base: impl Into<String>,
        credentials: Arc<ChannelCredentials>,
        fallback_token: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(OUTBOUND_DISPATCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            api_base: api_base.into(),
            client,
            credentials,
            fallback_token,
        }
    }

    fn resolve_token(&self, msg: &ChannelMessageOut) -> Option<String> {
        self.credentials
            .token(&msg.tenant_id, &msg.channel, &msg.target_id)
            .or_else(|| self.fallback_token.clone())
    }

    async fn post(&self, path: &str, payload: serde_json::Value, token: &str) -> Result<(), ChannelError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(url = %url, "channel dispatch");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChannelError::Timeout {
                        secs: OUTBOUND_DISPATCH_TIMEOUT_SECS,
                    }
                } else {
                    ChannelError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            warn!(status, body = %body, "channel delivery failed");
            return Err(ChannelError::DeliveryFailed { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for ChatPlatformClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, msg: &ChannelMessageOut) -> Result<(), ChannelError> {
        let token = self.resolve_token(msg).ok_or_else(|| ChannelError::NoCredentials {
            tenant: msg.tenant_id.clone(),
            channel: msg.channel.clone(),
        })?;

        let reply_token = msg
            .metadata
            .get("reply_token")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());

        match reply_token {
            Some(reply) => {
                debug!(target = %msg.target_id, "reply delivery");
                self.post(
                    "/v2/bot/message/reply",
                    serde_json::json!({
                        "replyToken": reply,
                        "messages": [{ "type": "text", "text": msg.text }],
                    }),
                    &token,
                )
                .await
            }
            None => {
                debug!(target = %msg.target_id, "push delivery");
                self.post(
                    "/v2/bot/message/push",
                    serde_json::json!({
                        "to": msg.target_id,
                        "messages": [{ "type": "text", "text": msg.text }],
                    }),
                    &token,
                )
                .await
            }
        }
    }
}
