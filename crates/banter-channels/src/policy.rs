use std::collections::HashSet;

use dashmap::DashMap;
use tracing::debug;

use banter_core::config::PolicyConfig;
use banter_core::types::ChannelMessageIn;

/// Tenant admission policy: allow/deny lists plus an optional
/// per-tenant per-minute quota. A denied inbound produces no session,
/// no turn, and no outbound dispatch.
pub struct TenantPolicy {
    allowed: Option<HashSet<String>>,
    denied: HashSet<String>,
    quota_per_minute: u32,
    /// tenant → (window start unix minute, count in window).
    windows: DashMap<String, (i64, u32)>,
}

impl TenantPolicy {
    pub fn new(cfg: &PolicyConfig) -> Self {
        Self {
            allowed: if cfg.allowed_tenants.is_empty() {
                None
            } else {
                Some(cfg.allowed_tenants.iter().cloned().collect())
            },
            denied: cfg.denied_tenants.iter().cloned().collect(),
            quota_per_minute: cfg.quota_per_minute,
            windows: DashMap::new(),
        }
    }

    /// Admit everything (development default).
    pub fn allow_all() -> Self {
        Self::new(&PolicyConfig::default())
    }

    pub fn allow(&self, inbound: &ChannelMessageIn) -> bool {
        let tenant = &inbound.tenant_id;
        if tenant.is_empty() {
            return false;
        }
        if self.denied.contains(tenant) {
            debug!(tenant, "tenant denied by policy");
            return false;
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(tenant) {
                debug!(tenant, "tenant not in allow list");
                return false;
            }
        }
        self.within_quota(tenant)
    }

    fn within_quota(&self, tenant: &str) -> bool {
        if self.quota_per_minute == 0 {
            return true;
        }
        let minute = chrono::Utc::now().timestamp() / 60;
        let mut entry = self.windows.entry(tenant.to_string()).or_insert((minute, 0));
        let (window, count) = *entry;
        if window != minute {
            *entry = (minute, 1);
            return true;
        }
        if count >= self.quota_per_minute {
            debug!(tenant, count, "tenant over per-minute quota");
            return false;
        }
        *entry = (window, count + 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(tenant: &str) -> ChannelMessageIn {
        ChannelMessageIn::new(tenant, "line", "u1", "hi")
    }

    #[test]
    fn default_policy_admits_everyone() {
        let policy = TenantPolicy::allow_all();
        assert!(policy.allow(&inbound("anyone")));
    }

    #[test]
    fn denied_tenant_is_rejected() {
        let policy = TenantPolicy::new(&PolicyConfig {
            denied_tenants: vec!["evil".to_string()],
            ..Default::default()
        });
        assert!(!policy.allow(&inbound("evil")));
        assert!(policy.allow(&inbound("good")));
    }

    #[test]
    fn allow_list_excludes_unknown_tenants() {
        let policy = TenantPolicy::new(&PolicyConfig {
            allowed_tenants: vec!["acme".to_string()],
            ..Default::default()
        });
        assert!(policy.allow(&inbound("acme")));
        assert!(!policy.allow(&inbound("stranger")));
    }

    #[test]
    fn quota_caps_messages_per_minute() {
        let policy = TenantPolicy::new(&PolicyConfig {
            quota_per_minute: 2,
            ..Default::default()
        });
        assert!(policy.allow(&inbound("acme")));
        assert!(policy.allow(&inbound("acme")));
        assert!(!policy.allow(&inbound("acme")));
        // Other tenants have their own window.
        assert!(policy.allow(&inbound("other")));
    }

    #[test]
    fn empty_tenant_is_rejected() {
        let policy = TenantPolicy::allow_all();
        assert!(!policy.allow(&ChannelMessageIn::new("", "line", "u1", "hi")));
    }
}
