//! Outbound live-transcription WebSocket.
//!
//! One socket per call. Two tasks own the split halves: the writer forwards
//! μ-law audio and a 5 s keep-alive, the reader turns vendor messages into
//! [`SttEvent`]s for the session. If the peer drops mid-call the session is
//! not torn down; the caller just stops being understood (no reconnect).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use voxbridge_core::error::{Peer, Result, VoxError};
use voxbridge_core::protocol::stt::{
    live_query_params, SttMessage, KEEPALIVE_INTERVAL_SECS, KEEPALIVE_JSON,
};

use crate::config::SttSection;

/// Events surfaced to the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    /// Final, non-empty transcript: one complete user turn.
    Final(String),
    UtteranceEnd,
    /// Peer socket ended (graceful or not). The call continues degraded.
    Closed,
}

/// Connector seam so tests can script transcripts without a network.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn open(
        &self,
        call_sid: &str,
        events: mpsc::Sender<SttEvent>,
    ) -> Result<Box<dyn SttStream>>;
}

/// Live handle for one call's transcription socket.
#[async_trait]
pub trait SttStream: Send + Sync {
    async fn send_audio(&self, audio: Bytes);
    /// Idempotent; also stops the keep-alive.
    async fn close(&self);
}

pub struct DeepgramStt {
    ws_url: String,
    api_key: String,
}

impl DeepgramStt {
    pub fn new(cfg: &SttSection) -> Self {
        Self {
            ws_url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

enum Command {
    Audio(Bytes),
    Close,
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn open(
        &self,
        call_sid: &str,
        events: mpsc::Sender<SttEvent>,
    ) -> Result<Box<dyn SttStream>> {
        let mut url = url::Url::parse(&self.ws_url)
            .map_err(|e| VoxError::Config(format!("bad stt url: {e}")))?;
        for (k, v) in live_query_params() {
            url.query_pairs_mut().append_pair(k, v);
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| VoxError::peer(Peer::Stt, e))?;
        let proto = HeaderValue::from_str(&format!("token, {}", self.api_key))
            .map_err(|e| VoxError::peer(Peer::Stt, e))?;
        request.headers_mut().insert("Sec-WebSocket-Protocol", proto);

        let (socket, _resp) = connect_async(request)
            .await
            .map_err(|e| VoxError::peer(Peer::Stt, e))?;
        let (mut sink, mut stream) = socket.split();

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);

        // Writer: audio + keep-alive, serialised on one half.
        tokio::spawn(async move {
            let mut keepalive =
                tokio::time::interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECS));
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(Command::Audio(b)) => {
                            if sink.send(Message::Binary(b.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        Some(Command::Close) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    _ = keepalive.tick() => {
                        if sink.send(Message::Text(KEEPALIVE_JSON.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Reader: vendor messages -> SttEvents.
        let call = call_sid.to_string();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(s)) => match serde_json::from_str::<SttMessage>(&s) {
                        Ok(m) => {
                            if let Some(t) = m.final_transcript() {
                                if events.send(SttEvent::Final(t.to_string())).await.is_err() {
                                    break;
                                }
                            } else if matches!(m, SttMessage::UtteranceEnd { .. })
                                && events.send(SttEvent::UtteranceEnd).await.is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!(call = %call, err = %e, "unknown stt message"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(call = %call, err = %e, "stt socket error");
                        break;
                    }
                }
            }
            let _ = events.send(SttEvent::Closed).await;
        });

        Ok(Box::new(DeepgramStream {
            cmd_tx,
            closed: AtomicBool::new(false),
        }))
    }
}

struct DeepgramStream {
    cmd_tx: mpsc::Sender<Command>,
    closed: AtomicBool,
}

#[async_trait]
impl SttStream for DeepgramStream {
    async fn send_audio(&self, audio: Bytes) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        // Backpressure: if the writer is saturated, audio is dropped rather
        // than stalling the carrier read loop.
        let _ = self.cmd_tx.try_send(Command::Audio(audio));
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        let _ = self.cmd_tx.send(Command::Close).await;
    }
}
