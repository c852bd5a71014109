//! Live-transcription peer messages (JSON).
//!
//! The negotiation parameters are fixed by the carrier's audio format:
//! μ-law, 8 kHz, mono. Interim results and VAD events are requested so the
//! vendor emits `is_final` transcripts and utterance boundaries.

use serde::Deserialize;

/// Query parameters for the live-transcription WebSocket URL.
///
/// `endpointing` is the silence window (ms) after which the vendor finalises
/// an utterance.
pub fn live_query_params() -> [(&'static str, &'static str); 7] {
    [
        ("encoding", "mulaw"),
        ("sample_rate", "8000"),
        ("channels", "1"),
        ("interim_results", "true"),
        ("punctuate", "true"),
        ("endpointing", "300"),
        ("vad_events", "true"),
    ]
}

/// Keep-alive payload sent every [`KEEPALIVE_INTERVAL_SECS`] while the peer
/// is open, so the vendor does not drop an idle socket mid-call.
pub const KEEPALIVE_JSON: &str = r#"{"type":"KeepAlive"}"#;
pub const KEEPALIVE_INTERVAL_SECS: u64 = 5;

/// Inbound message from the transcription peer.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SttMessage {
    Results {
        channel: ResultsChannel,
        #[serde(default)]
        is_final: bool,
    },
    UtteranceEnd {
        #[serde(default)]
        last_word_end: Option<f64>,
    },
    SpeechStarted {
        #[serde(default)]
        timestamp: Option<f64>,
    },
    Metadata {},
}

#[derive(Debug, Deserialize)]
pub struct ResultsChannel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
}

impl SttMessage {
    /// The transcript of a final, non-empty result. `None` for interim
    /// results, empty transcripts, and non-result messages.
    pub fn final_transcript(&self) -> Option<&str> {
        match self {
            SttMessage::Results { channel, is_final } if *is_final => channel
                .alternatives
                .first()
                .map(|a| a.transcript.trim())
                .filter(|t| !t.is_empty()),
            _ => None,
        }
    }
}
