use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use tracing::info;

use banter_agent::orchestrator::Orchestrator;
use banter_agent::provider::{build_llm_client, build_tts_client, LlmClient, TtsClient};
use banter_channels::channel::Channel;
use banter_channels::client::ChatPlatformClient;
use banter_channels::credentials::ChannelCredentials;
use banter_channels::policy::TenantPolicy;
use banter_checkpoint::db::SqliteCheckpointStore;
use banter_checkpoint::memory::MemoryCheckpointStore;
use banter_checkpoint::store::CheckpointStore;
use banter_core::config::BanterConfig;
use banter_core::persona::Persona;
use banter_memory::db::SqliteMemoryStore;
use banter_memory::memory::InMemoryMemoryStore;
use banter_memory::store::MemoryStore;
use banter_sessions::db::SqliteSessionStore;
use banter_sessions::memory::MemorySessionStore;
use banter_sessions::remote::RemoteKvSessionStore;
use banter_sessions::store::SessionStore;

/// Central shared state — passed as `Arc<AppState>` to all Axum handlers.
///
/// Owns every process-wide service. Construction is the explicit init
/// phase (backend selection, provider factories); [`AppState::shutdown`]
/// is the explicit teardown. Dependents receive services by parameter,
/// never through globals.
pub struct AppState {
    pub config: BanterConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub memory: Arc<dyn MemoryStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub policy: TenantPolicy,
    pub credentials: Arc<ChannelCredentials>,
    /// Outbound adapters by channel name.
    pub channels: DashMap<String, Arc<dyn Channel>>,
}

impl AppState {
    /// Production init: choose backends from config, build provider
    /// clients, register channel adapters. Any failure here aborts
    /// startup with a non-zero exit.
    pub fn init(config: BanterConfig) -> anyhow::Result<Self> {
        let gw = &config.gateway;

        let sessions: Arc<dyn SessionStore> = if gw.redis_embedded && !gw.redis_file.is_empty() {
            info!(url = %gw.redis_file, "session backend: remote key-value");
            Arc::new(RemoteKvSessionStore::new(gw.redis_file.clone()))
        } else if gw.use_sqlite {
            info!(path = %gw.sqlite_file, "session backend: sqlite");
            Arc::new(SqliteSessionStore::open(&gw.sqlite_file)?)
        } else {
            info!("session backend: in-memory");
            Arc::new(MemorySessionStore::new())
        };

        let checkpoints: Arc<dyn CheckpointStore> = if gw.use_sqlite {
            Arc::new(SqliteCheckpointStore::open(&gw.sqlite_file)?)
        } else {
            Arc::new(MemoryCheckpointStore::new())
        };

        let memory: Arc<dyn MemoryStore> = if gw.use_sqlite {
            Arc::new(SqliteMemoryStore::open(&gw.sqlite_file)?)
        } else {
            Arc::new(InMemoryMemoryStore::new())
        };

        let llm = build_llm_client(&config.llm).map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let tts = build_tts_client(&config.tts).map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let credentials = Arc::new(ChannelCredentials::load(&gw.channels_config_file));

        Ok(Self::assemble(
            config,
            llm,
            tts,
            sessions,
            checkpoints,
            memory,
            credentials,
        ))
    }

    /// Wire the state from already-built parts (also the test seam).
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        config: BanterConfig,
        llm: Arc<dyn LlmClient>,
        tts: Option<Arc<dyn TtsClient>>,
        sessions: Arc<dyn SessionStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        memory: Arc<dyn MemoryStore>,
        credentials: Arc<ChannelCredentials>,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            llm,
            tts,
            Arc::clone(&checkpoints),
            Arc::clone(&memory),
            Persona::default(),
            config.llm.clone(),
            config.tts.clone(),
        );

        let policy = TenantPolicy::new(&config.policy);

        let channels: DashMap<String, Arc<dyn Channel>> = DashMap::new();
        channels.insert(
            "line".to_string(),
            Arc::new(ChatPlatformClient::new(
                "line",
                "https://api.line.me",
                Arc::clone(&credentials),
                None,
            )) as Arc<dyn Channel>,
        );

        Self {
            config,
            sessions,
            checkpoints,
            memory,
            orchestrator,
            policy,
            credentials,
            channels,
        }
    }

    /// Explicit teardown: cancel every active turn so workers unwind
    /// before the process exits.
    pub fn shutdown(&self) {
        self.orchestrator.interrupt_all();
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .route(
            "/channels/{channel}/webhook",
            post(crate::http::webhook::webhook_handler).get(crate::http::webhook::webhook_verify),
        )
        .route("/rooms/token", post(crate::http::room::room_token_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
