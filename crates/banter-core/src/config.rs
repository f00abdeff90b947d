use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Pipeline constants — shared between the TTS worker and its tests.
/// Minimum audio frame size. Smaller frames can carry incomplete codec
/// frames that audibly glitch on the client.
pub const MIN_AUDIO_CHUNK_BYTES: usize = 1024;
/// Capacity of the bounded sentence queue feeding the TTS worker.
/// This is the pipeline's only back-pressure point.
pub const SENTENCE_QUEUE_CAPACITY: usize = 8;
/// Hard cap on media-room token TTL.
pub const MAX_ROOM_TOKEN_TTL_SECS: u64 = 24 * 3600;
/// Maximum length of a derived room name.
pub const MAX_ROOM_NAME_LEN: usize = 64;

pub const DEFAULT_PORT: u16 = 18990;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Per-operation timeouts (all cancellation-inducing).
pub const SESSION_STORE_TIMEOUT_SECS: u64 = 5;
pub const OUTBOUND_DISPATCH_TIMEOUT_SECS: u64 = 10;
/// TTS synthesis timeout, per sentence.
pub const TTS_SENTENCE_TIMEOUT_SECS: u64 = 30;

/// Top-level config (banter.toml + env overrides per section:
/// `GATEWAY_*`, `LLM_*`, `TTS_*`, `DB_*`, `MEDIA_*`). Unrecognized
/// environment variables are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BanterConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Gateway listener and backend selection. Backend selection happens once
/// at startup; there is no request-time fallback between backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Use the embedded SQLite session backend instead of the in-memory map.
    #[serde(default)]
    pub use_sqlite: bool,
    /// Use the remote key-value session backend.
    #[serde(default)]
    pub redis_embedded: bool,
    /// SQLite database file for the session and checkpoint backends.
    #[serde(default = "default_db_file")]
    pub sqlite_file: String,
    /// Base URL of the remote key-value service.
    #[serde(default)]
    pub redis_file: String,
    /// Path to the per-tenant channel credentials JSON file.
    #[serde(default = "default_channels_config")]
    pub channels_config_file: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            use_sqlite: false,
            redis_embedded: false,
            sqlite_file: default_db_file(),
            redis_file: String::new(),
            channels_config_file: default_channels_config(),
        }
    }
}

/// LLM provider selection and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider kind: "openai" or "anthropic".
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    /// Token threshold that triggers background summarization.
    #[serde(default = "default_summarization_trigger")]
    pub summarization_trigger_tokens: u32,
    /// Context window returned to the LLM after summarization.
    #[serde(default = "default_summarization_max")]
    pub summarization_max_tokens: u32,
    /// Max tokens for the summary itself.
    #[serde(default = "default_summarization_summary")]
    pub summarization_summary_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: String::new(),
            base_url: None,
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            summarization_trigger_tokens: default_summarization_trigger(),
            summarization_max_tokens: default_summarization_max(),
            summarization_summary_tokens: default_summarization_summary(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// TTS provider selection and voice defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Provider kind: "elevenlabs".
    #[serde(default = "default_tts_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
    /// Fast model used for streaming synthesis.
    #[serde(default = "default_tts_streaming_model")]
    pub streaming_model_id: String,
    /// pcm_24000 for mobile compatibility, mp3_44100_128 for desktop.
    #[serde(default = "default_tts_output_format")]
    pub output_format: String,
    #[serde(default = "default_voice_id")]
    pub default_voice_id: String,
    #[serde(default = "default_stability")]
    pub default_stability: f64,
    #[serde(default = "default_similarity_boost")]
    pub default_similarity_boost: f64,
    #[serde(default)]
    pub default_style: f64,
    #[serde(default = "bool_true")]
    pub default_use_speaker_boost: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            api_key: String::new(),
            model_id: default_tts_model(),
            streaming_model_id: default_tts_streaming_model(),
            output_format: default_tts_output_format(),
            default_voice_id: default_voice_id(),
            default_stability: default_stability(),
            default_similarity_boost: default_similarity_boost(),
            default_style: 0.0,
            default_use_speaker_boost: true,
        }
    }
}

/// Relational backend for the remote checkpoint store variant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DbConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
}

/// Media-room service credentials. Tenant-scoped overrides come from the
/// channels credentials file under the "media" channel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MediaConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

/// Tenant policy attributes. An empty allow list means every tenant is
/// admitted unless explicitly denied.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub allowed_tenants: Vec<String>,
    #[serde(default)]
    pub denied_tenants: Vec<String>,
    /// Per-tenant inbound messages per minute; 0 disables the quota.
    #[serde(default)]
    pub quota_per_minute: u32,
}

impl BanterConfig {
    /// Load config from a TOML file with per-section env overrides.
    ///
    /// Checks in order: explicit path argument, `BANTER_CONFIG` env,
    /// `~/.banter/banter.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("BANTER_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: BanterConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("GATEWAY_").map(|k| format!("gateway.{}", k).into()))
            .merge(Env::prefixed("LLM_").map(|k| format!("llm.{}", k).into()))
            .merge(Env::prefixed("TTS_").map(|k| format!("tts.{}", k).into()))
            .merge(Env::prefixed("DB_").map(|k| format!("db.{}", k).into()))
            .merge(Env::prefixed("MEDIA_").map(|k| format!("media.{}", k).into()))
            .extract()
            .map_err(|e| crate::error::BanterError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_file() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.banter/banter.db", home)
}
fn default_channels_config() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.banter/channels.json", home)
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_summarization_trigger() -> u32 {
    1024
}
fn default_summarization_max() -> u32 {
    256
}
fn default_summarization_summary() -> u32 {
    128
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_tts_provider() -> String {
    "elevenlabs".to_string()
}
fn default_tts_model() -> String {
    "eleven_multilingual_v2".to_string()
}
fn default_tts_streaming_model() -> String {
    "eleven_turbo_v2_5".to_string()
}
fn default_tts_output_format() -> String {
    "pcm_24000".to_string()
}
fn default_voice_id() -> String {
    "EXAVITQu4vr4xnSDxMaL".to_string()
}
fn default_stability() -> f64 {
    0.5
}
fn default_similarity_boost() -> f64 {
    0.75
}
fn default_db_port() -> u16 {
    5432
}
fn bool_true() -> bool {
    true
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.banter/banter.toml", home)
}
