//! The inbound routing use case shared by webhook channels: policy →
//! session → single-response turn → outbound dispatch → session touch.

use tracing::{info, warn};

use banter_agent::orchestrator::TurnRequest;
use banter_core::error::BanterError;
use banter_core::types::{ChannelMessageIn, ChannelMessageOut};
use banter_sessions::types::SessionKey;

use crate::app::AppState;

/// Result of routing one inbound message.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub session_id: String,
    pub response_text: String,
    pub allowed: bool,
}

impl RouteOutcome {
    fn denied() -> Self {
        Self {
            session_id: String::new(),
            response_text: String::new(),
            allowed: false,
        }
    }
}

/// Route one normalized inbound message end to end.
///
/// Policy denial short-circuits: no session is created or touched and
/// nothing is dispatched. Delivery failures are logged and surfaced in
/// the log only — the turn (and its checkpoint writes) stand.
pub async fn route_inbound(
    state: &AppState,
    inbound: ChannelMessageIn,
) -> Result<RouteOutcome, BanterError> {
    if !state.policy.allow(&inbound) {
        info!(tenant = %inbound.tenant_id, channel = %inbound.channel, "inbound denied by policy");
        return Ok(RouteOutcome::denied());
    }

    let key = SessionKey::from_inbound(&inbound);
    let mut session = state
        .sessions
        .get_or_create(&key)
        .await
        .map_err(|e| BanterError::BackendUnavailable(e.to_string()))?;

    let mut request = TurnRequest::text_only(
        &session.id,
        &session.thread_id,
        &inbound.user_external_id,
        &inbound.text,
    );
    request.user_name = inbound
        .meta_str("user_name")
        .map(str::to_string);

    // Webhook channels run in single-response mode: block until the
    // turn ends and reply with the final text.
    let response_text = state.orchestrator.respond(request).await?;

    if !response_text.is_empty() {
        let outbound = ChannelMessageOut::reply_to(&inbound, response_text.clone());
        match state.channels.get(&inbound.channel) {
            Some(channel) => {
                if let Err(e) = channel.send(&outbound).await {
                    warn!(
                        channel = %inbound.channel,
                        tenant = %inbound.tenant_id,
                        error = %e,
                        "outbound delivery failed"
                    );
                }
            }
            None => {
                warn!(channel = %inbound.channel, "no adapter registered, dropping outbound");
            }
        }
    }

    session.touch();
    if let Err(e) = state.sessions.save(&session).await {
        warn!(error = %e, "failed to persist session touch");
    }

    Ok(RouteOutcome {
        session_id: session.id,
        response_text,
        allowed: true,
    })
}
