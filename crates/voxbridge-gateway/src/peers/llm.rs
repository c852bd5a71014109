//! Streaming chat-completions client (SSE).

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};

use voxbridge_core::error::{Peer, Result, VoxError};

use crate::config::LlmSection;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Dialogue-model seam. `stream_chat` drives the per-turn response and must
/// call `on_delta` for every content fragment, in order; it returns the full
/// accumulated text. `complete_json` is the one-shot extraction path used by
/// the finaliser.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String>;

    async fn complete_json(&self, system: &str, user: &str) -> Result<Value>;
}

pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(cfg: &LlmSection, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VoxError::Config(format!("llm client build failed: {e}")))?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoxError::PeerTimeout(Peer::Llm)
                } else {
                    VoxError::peer(Peer::Llm, e)
                }
            })?;
        if !resp.status().is_success() {
            return Err(VoxError::peer(Peer::Llm, resp.status()));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": true,
        });
        let resp = self.post(&body).await?;

        let mut stream = resp.bytes_stream();
        let mut buf = BytesMut::new();
        let mut full = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| VoxError::peer(Peer::Llm, e))?;
            buf.extend_from_slice(&chunk);

            while let Some(line_end) = find_newline(&buf) {
                let line = buf.split_to(line_end);
                buf.advance(1); // the newline itself
                let line = String::from_utf8_lossy(&line);
                let trimmed = line.trim();

                if trimmed.is_empty() || trimmed.starts_with(':') {
                    continue;
                }
                let Some(data) = trimmed.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if data == "[DONE]" {
                    break 'outer;
                }
                match serde_json::from_str::<Value>(data) {
                    Ok(v) => {
                        let delta = v["choices"][0]["delta"]["content"]
                            .as_str()
                            .map(str::to_owned);
                        if let Some(delta) = delta {
                            full.push_str(&delta);
                            on_delta(&delta);
                        }
                    }
                    Err(e) => tracing::debug!(err = %e, "unparseable sse event"),
                }
            }
        }

        Ok(full)
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": 300,
            "temperature": 0.0,
        });
        let resp = self.post(&body).await?;
        let v: Value = resp.json().await.map_err(|e| VoxError::peer(Peer::Llm, e))?;
        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| VoxError::peer(Peer::Llm, "response without content"))?;
        parse_json_payload(content)
    }
}

fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Models wrap JSON in prose or code fences more often than not; extract the
/// outermost object before parsing.
pub fn parse_json_payload(content: &str) -> Result<Value> {
    let start = content.find('{');
    let end = content.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => content,
    };
    serde_json::from_str(slice)
        .map_err(|e| VoxError::peer(Peer::Llm, format!("bad json payload: {e}")))
}
