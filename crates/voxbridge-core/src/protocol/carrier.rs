//! Carrier media-stream frames (JSON).
//!
//! The carrier speaks lowercase `event`-tagged frames. Anything that does not
//! parse into [`CarrierFrame`] is treated as an unknown event: logged by the
//! transport layer and ignored, so carrier-side additions never break a call.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;

/// Inbound frame from the carrier media WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierFrame {
    /// Handshake ack; no state change.
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    /// Stream metadata; the tenant id travels in `customParameters`.
    Start { start: StartMeta },
    /// One μ-law audio packet, base64-encoded.
    Media { media: MediaPayload },
    /// Playback checkpoint echo.
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },
    /// Caller hung up; the session finalises.
    Stop {},
}

/// Metadata carried by the `start` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(default, rename = "callSid")]
    pub call_sid: Option<String>,
    #[serde(default, rename = "customParameters")]
    pub custom_parameters: HashMap<String, String>,
    #[serde(default, rename = "mediaFormat")]
    pub media_format: Option<MediaFormat>,
}

impl StartMeta {
    /// Tenant identifier. A start frame without one is grounds for closing.
    pub fn client_id(&self) -> Option<&str> {
        self.custom_parameters.get("client_id").map(String::as_str)
    }

    pub fn caller(&self) -> Option<&str> {
        self.custom_parameters.get("caller").map(String::as_str)
    }

    pub fn called(&self) -> Option<&str> {
        self.custom_parameters.get("called").map(String::as_str)
    }

    pub fn direction(&self) -> Option<&str> {
        self.custom_parameters.get("direction").map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default, rename = "sampleRate")]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// base64 μ-law audio.
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkPayload {
    #[serde(default)]
    pub name: Option<String>,
}

/// Outbound `media` frame: base64 μ-law with the stream id echoed back.
pub fn media_frame(stream_sid: &str, payload_b64: &str) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload_b64 }
    })
    .to_string()
}

/// Outbound `stop` frame: asks the carrier to hang up.
pub fn stop_frame(stream_sid: &str) -> String {
    json!({ "event": "stop", "streamSid": stream_sid }).to_string()
}
