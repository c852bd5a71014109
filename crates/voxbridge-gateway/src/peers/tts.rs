//! Per-sentence speech synthesis client.
//!
//! One POST per sentence chunk; the response body is the μ-law 8 kHz
//! payload, occasionally still inside a WAV/AU container (stripped by the
//! playback queue before it reaches the carrier).

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use voxbridge_core::error::{Peer, Result, VoxError};

use crate::config::TtsSection;

#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn synthesize(&self, voice_id: &str, text: &str) -> Result<Bytes>;
}

pub struct ElevenLabsSynth {
    client: reqwest::Client,
    base: String,
    api_key: String,
    model_id: String,
    stability: f32,
    similarity: f32,
}

impl ElevenLabsSynth {
    pub fn new(cfg: &TtsSection, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VoxError::Config(format!("tts client build failed: {e}")))?;
        Ok(Self {
            client,
            base: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model_id: cfg.model_id.clone(),
            stability: cfg.stability,
            similarity: cfg.similarity,
        })
    }
}

#[async_trait]
impl SpeechSynth for ElevenLabsSynth {
    async fn synthesize(&self, voice_id: &str, text: &str) -> Result<Bytes> {
        let url = format!("{}/{voice_id}?output_format=ulaw_8000", self.base);
        let body = json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": self.stability,
                "similarity_boost": self.similarity,
                "use_speaker_boost": false,
            },
        });

        let resp = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoxError::PeerTimeout(Peer::Tts)
                } else {
                    VoxError::peer(Peer::Tts, e)
                }
            })?;
        if !resp.status().is_success() {
            return Err(VoxError::peer(Peer::Tts, resp.status()));
        }
        resp.bytes().await.map_err(|e| VoxError::peer(Peer::Tts, e))
    }
}
