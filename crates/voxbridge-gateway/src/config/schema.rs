//! Config schema with strict parsing.
//!
//! `deny_unknown_fields` prevents silent misconfiguration. Vendor secrets may
//! be left empty in the file and filled from the environment via
//! [`GatewayConfig::apply_env`].

use serde::Deserialize;

use voxbridge_core::error::{Result, VoxError};

use crate::tenant::{Tenant, VoiceProfile};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub stt: SttSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tts: TtsSection,
    #[serde(default)]
    pub carrier: CarrierSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub billing: BillingSection,
    /// Seed tenants for the in-memory directory (dev / tests).
    #[serde(default)]
    pub tenants: Vec<Tenant>,
    #[serde(default)]
    pub voices: Vec<VoiceProfile>,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(VoxError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        if self.store.backend == StoreBackend::Rest && self.store.url.is_empty() {
            return Err(VoxError::Config("store.url required for rest backend".into()));
        }
        Ok(())
    }

    /// Fill empty secrets from the environment. Called once at startup,
    /// after `dotenvy`, and never from tests.
    pub fn apply_env(&mut self) {
        fill(&mut self.stt.api_key, "DEEPGRAM_API_KEY");
        fill(&mut self.llm.api_key, "OPENAI_API_KEY");
        fill(&mut self.tts.api_key, "ELEVENLABS_API_KEY");
        fill(&mut self.carrier.account_sid, "TWILIO_ACCOUNT_SID");
        fill(&mut self.carrier.auth_token, "TWILIO_AUTH_TOKEN");
        fill(&mut self.store.url, "STORE_URL");
        fill(&mut self.store.service_key, "STORE_SERVICE_KEY");
    }
}

fn fill(slot: &mut String, var: &str) {
    if slot.is_empty() {
        if let Ok(v) = std::env::var(var) {
            *slot = v;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Teardown deadline when no `start` frame arrives.
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    /// Playback budget for the admission-denied message before hangup.
    #[serde(default = "default_deny_playback_secs")]
    pub deny_playback_secs: u64,
    /// Bound on each outbound vendor HTTP call.
    #[serde(default = "default_peer_timeout_secs")]
    pub peer_timeout_secs: u64,
    /// Pause between chunks when speaking fixed text (greeting, rejection).
    #[serde(default = "default_fixed_speech_gap_ms")]
    pub fixed_speech_gap_ms: u64,
    #[serde(default)]
    pub upgrade_guard: UpgradeGuardSection,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            start_timeout_secs: default_start_timeout_secs(),
            deny_playback_secs: default_deny_playback_secs(),
            peer_timeout_secs: default_peer_timeout_secs(),
            fixed_speech_gap_ms: default_fixed_speech_gap_ms(),
            upgrade_guard: UpgradeGuardSection::default(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_start_timeout_secs() -> u64 {
    10
}
fn default_deny_playback_secs() -> u64 {
    10
}
fn default_peer_timeout_secs() -> u64 {
    30
}
fn default_fixed_speech_gap_ms() -> u64 {
    120
}

/// Pre-upgrade per-IP limiter.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeGuardSection {
    #[serde(default = "default_guard_enabled")]
    pub enabled: bool,
    #[serde(default = "default_guard_per_ip_rps")]
    pub per_ip_rps: u32,
    #[serde(default = "default_guard_per_ip_burst")]
    pub per_ip_burst: u32,
    #[serde(default = "default_guard_max_ip_entries")]
    pub max_ip_entries: usize,
}

impl Default for UpgradeGuardSection {
    fn default() -> Self {
        Self {
            enabled: default_guard_enabled(),
            per_ip_rps: default_guard_per_ip_rps(),
            per_ip_burst: default_guard_per_ip_burst(),
            max_ip_entries: default_guard_max_ip_entries(),
        }
    }
}

fn default_guard_enabled() -> bool {
    true
}
fn default_guard_per_ip_rps() -> u32 {
    5
}
fn default_guard_per_ip_burst() -> u32 {
    10
}
fn default_guard_max_ip_entries() -> usize {
    10_000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SttSection {
    #[serde(default = "default_stt_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for SttSection {
    fn default() -> Self {
        Self {
            url: default_stt_url(),
            api_key: String::new(),
        }
    }
}

fn default_stt_url() -> String {
    "wss://api.deepgram.com/v1/listen".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmSection {
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            api_key: String::new(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
        }
    }
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn default_llm_max_tokens() -> u32 {
    150
}
fn default_llm_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TtsSection {
    #[serde(default = "default_tts_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
    #[serde(default = "default_tts_stability")]
    pub stability: f32,
    #[serde(default = "default_tts_similarity")]
    pub similarity: f32,
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            url: default_tts_url(),
            api_key: String::new(),
            model_id: default_tts_model(),
            stability: default_tts_stability(),
            similarity: default_tts_similarity(),
        }
    }
}

fn default_tts_url() -> String {
    "https://api.elevenlabs.io/v1/text-to-speech".into()
}
fn default_tts_model() -> String {
    "eleven_turbo_v2".into()
}
fn default_tts_stability() -> f32 {
    0.5
}
fn default_tts_similarity() -> f32 {
    0.8
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarrierSection {
    #[serde(default = "default_carrier_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
}

impl Default for CarrierSection {
    fn default() -> Self {
        Self {
            api_base: default_carrier_api_base(),
            account_sid: String::new(),
            auth_token: String::new(),
        }
    }
}

fn default_carrier_api_base() -> String {
    "https://api.twilio.com".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Rest,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service_key: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: String::new(),
            service_key: String::new(),
        }
    }
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingSection {
    /// Sink for paid-plan overage events. Unset disables reporting.
    #[serde(default)]
    pub overage_url: Option<String>,
}
