use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::error::ChannelError;

/// Per-tenant channel credentials, loaded once at startup from the
/// channels config file.
///
/// The file stores env var *names*, never literal secrets:
///
/// ```json
/// {"tenants": {"acme": {"channels": {"line": {
///     "token_env": "ACME_LINE_TOKEN",
///     "secret_env": "ACME_LINE_SECRET",
///     "targets": {"grp-1": {"token_env": "ACME_GRP1_TOKEN"}}
/// }}}}}
/// ```
///
/// Lookup order: target-specific rule → channel default → none.
pub struct ChannelCredentials {
    config: CredentialsFile,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    tenants: HashMap<String, TenantEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct TenantEntry {
    #[serde(default)]
    channels: HashMap<String, ChannelEntry>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct ChannelEntry {
    token_env: Option<String>,
    secret_env: Option<String>,
    #[serde(default)]
    targets: HashMap<String, TargetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TargetEntry {
    token_env: Option<String>,
    secret_env: Option<String>,
}

impl ChannelCredentials {
    /// Load from `path`. A missing file yields an empty table (every
    /// lookup returns `None`) — adapters then fall back to their own
    /// config defaults.
    pub fn load(path: &str) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path, error = %e, "channels config is malformed, using empty table");
                    CredentialsFile::default()
                }
            },
            Err(_) => {
                warn!(path, "channels config not found, using empty table");
                CredentialsFile::default()
            }
        };
        Self { config }
    }

    /// Parse from an in-memory JSON string (tests, embedded config).
    pub fn from_json(raw: &str) -> Result<Self, ChannelError> {
        let config =
            serde_json::from_str(raw).map_err(|e| ChannelError::Credentials(e.to_string()))?;
        Ok(Self { config })
    }

    pub fn empty() -> Self {
        Self {
            config: CredentialsFile::default(),
        }
    }

    /// Delivery token for an outbound call.
    pub fn token(&self, tenant_id: &str, channel: &str, target_id: &str) -> Option<String> {
        let (token_env, _) = self.rule(tenant_id, channel, target_id)?;
        std::env::var(token_env?).ok()
    }

    /// Signing secret for inbound verification.
    pub fn secret(&self, tenant_id: &str, channel: &str, target_id: &str) -> Option<String> {
        let (_, secret_env) = self.rule(tenant_id, channel, target_id)?;
        std::env::var(secret_env?).ok()
    }

    /// Resolve the (token_env, secret_env) rule: target first, then the
    /// channel default.
    fn rule(
        &self,
        tenant_id: &str,
        channel: &str,
        target_id: &str,
    ) -> Option<(Option<String>, Option<String>)> {
        let entry = self
            .config
            .tenants
            .get(tenant_id)?
            .channels
            .get(channel)?;
        if let Some(target) = entry.targets.get(target_id) {
            return Some((target.token_env.clone(), target.secret_env.clone()));
        }
        Some((entry.token_env.clone(), entry.secret_env.clone()))
    }
}
