use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use banter_core::config::{TtsConfig, TTS_SENTENCE_TIMEOUT_SECS};

use crate::provider::{ProviderError, TtsClient};

/// ElevenLabs streaming TTS client.
///
/// Uses the low-latency streaming model for synthesis; the output format
/// comes from config (pcm_24000 by default for mobile clients).
pub struct ElevenLabsClient {
    client: reqwest::Client,
    cfg: TtsConfig,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(cfg: TtsConfig) -> Self {
        // Per-sentence budget: utterances are short, a stalled synthesis
        // call must not hold the pipeline open.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(TTS_SENTENCE_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            cfg,
            base_url: "https://api.elevenlabs.io".to_string(),
        }
    }
}

#[async_trait]
impl TtsClient for ElevenLabsClient {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn stream(
        &self,
        text: &str,
        voice_id: &str,
        tx: mpsc::Sender<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream?output_format={}",
            self.base_url, voice_id, self.cfg.output_format
        );

        let body = serde_json::json!({
            "text": text,
            "model_id": self.cfg.streaming_model_id,
            "voice_settings": {
                "stability": self.cfg.default_stability,
                "similarity_boost": self.cfg.default_similarity_boost,
                "style": self.cfg.default_style,
                "use_speaker_boost": self.cfg.default_use_speaker_boost,
            },
        });

        debug!(voice_id, chars = text.len(), "elevenlabs synthesis request");

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.cfg.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "elevenlabs API error");
            return Err(ProviderError::from_status(status, text));
        }

        let mut byte_stream = resp.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                chunk = byte_stream.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    if tx.send(bytes.to_vec()).await.is_err() {
                        // Receiver dropped — the turn ended underneath us.
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(ProviderError::Http(e)),
                None => return Ok(()),
            }
        }
    }
}
