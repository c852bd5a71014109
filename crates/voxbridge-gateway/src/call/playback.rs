//! Ordered audio release into the carrier stream.
//!
//! Sentence chunks are synthesised concurrently and may complete out of
//! order; this queue is the sole ordering authority. It buffers payloads by
//! chunk index and releases `media` frames strictly in index order. A chunk
//! arriving at index 0 while the cursor is elsewhere marks a new response
//! boundary and resets the queue.
//!
//! Single writer: one playback task per call owns the queue; its output goes
//! through the session's serialised outbound channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use tokio::sync::mpsc;

use voxbridge_core::audio;
use voxbridge_core::protocol::carrier;

use crate::obs::metrics::BridgeMetrics;

/// Commands from the dialogue worker and its synthesis tasks.
#[derive(Debug)]
pub enum PlaybackCmd {
    /// One synthesised sentence. An empty payload advances the cursor
    /// without emitting audio (a failed synthesis becomes a silent chunk
    /// instead of stalling everything behind it).
    Chunk { index: u32, audio: Bytes },
    /// The response finished streaming; `total` chunks were dispatched.
    ResponseEnd { total: u32 },
}

pub struct PlaybackQueue {
    stream_sid: String,
    out: mpsc::Sender<Message>,
    speaking: Arc<AtomicBool>,
    metrics: Arc<BridgeMetrics>,
    next_to_send: u32,
    buffer: HashMap<u32, Bytes>,
    expected_total: Option<u32>,
}

impl PlaybackQueue {
    pub fn new(
        stream_sid: String,
        out: mpsc::Sender<Message>,
        speaking: Arc<AtomicBool>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            stream_sid,
            out,
            speaking,
            metrics,
            next_to_send: 0,
            buffer: HashMap::new(),
            expected_total: None,
        }
    }

    pub async fn accept(&mut self, index: u32, payload: Bytes) {
        if index == 0 && self.next_to_send != 0 {
            // New response boundary; anything unreleased belongs to a
            // superseded response.
            self.buffer.clear();
            self.next_to_send = 0;
            self.expected_total = None;
            self.metrics.playback_resets_total.inc(&[]);
        }

        self.speaking.store(true, Ordering::Release);
        self.buffer.insert(index, audio::strip_container(payload));

        while let Some(chunk) = self.buffer.remove(&self.next_to_send) {
            if !chunk.is_empty() {
                let frame = carrier::media_frame(&self.stream_sid, &BASE64.encode(&chunk));
                if self.out.send(Message::Text(frame)).await.is_err() {
                    // Carrier gone; the session is finalising anyway.
                    break;
                }
            }
            self.next_to_send += 1;
        }
        self.refresh_speaking();
    }

    pub fn response_end(&mut self, total: u32) {
        self.expected_total = Some(total);
        self.refresh_speaking();
    }

    /// Speaking holds from the first chunk of a response until every
    /// dispatched chunk has been released.
    fn refresh_speaking(&self) {
        if self.buffer.is_empty() && self.expected_total == Some(self.next_to_send) {
            self.speaking.store(false, Ordering::Release);
        }
    }
}

/// Playback task: drains commands for the lifetime of the call.
pub async fn run(mut queue: PlaybackQueue, mut rx: mpsc::Receiver<PlaybackCmd>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            PlaybackCmd::Chunk { index, audio } => queue.accept(index, audio).await,
            PlaybackCmd::ResponseEnd { total } => queue.response_end(total),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn queue(out: mpsc::Sender<Message>) -> (PlaybackQueue, Arc<AtomicBool>) {
        let speaking = Arc::new(AtomicBool::new(false));
        let q = PlaybackQueue::new(
            "MZ1".into(),
            out,
            speaking.clone(),
            Arc::new(BridgeMetrics::default()),
        );
        (q, speaking)
    }

    fn payload_of(msg: &Message) -> Vec<u8> {
        let Message::Text(s) = msg else {
            panic!("expected text frame");
        };
        let v: serde_json::Value = serde_json::from_str(s).unwrap();
        BASE64.decode(v["media"]["payload"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn releases_chunks_in_index_order_under_reordering() {
        let (tx, mut rx) = mpsc::channel(16);
        let (mut q, _) = queue(tx);

        q.accept(2, Bytes::from_static(b"two")).await;
        q.accept(0, Bytes::from_static(b"zero")).await;
        q.accept(1, Bytes::from_static(b"one")).await;
        q.response_end(3);

        let mut seen = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            seen.push(payload_of(&msg));
        }
        assert_eq!(seen, vec![b"zero".to_vec(), b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn index_zero_resets_a_stale_response() {
        let (tx, mut rx) = mpsc::channel(16);
        let (mut q, _) = queue(tx);

        q.accept(0, Bytes::from_static(b"a0")).await;
        q.accept(2, Bytes::from_static(b"a2")).await; // never released
        q.accept(0, Bytes::from_static(b"b0")).await; // new response
        q.accept(1, Bytes::from_static(b"b1")).await;
        q.response_end(2);

        let mut seen = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            seen.push(payload_of(&msg));
        }
        assert_eq!(seen, vec![b"a0".to_vec(), b"b0".to_vec(), b"b1".to_vec()]);
    }

    #[tokio::test]
    async fn wav_wrapped_payload_round_trips_stripped() {
        let (tx, mut rx) = mpsc::channel(16);
        let (mut q, _) = queue(tx);

        let mut wav = b"RIFF".to_vec();
        wav.resize(44, 0);
        wav.extend_from_slice(&[0x7f, 0xff, 0x00]);
        q.accept(0, Bytes::from(wav)).await;

        let msg = rx.try_recv().unwrap();
        assert_eq!(payload_of(&msg), vec![0x7f, 0xff, 0x00]);
    }

    #[tokio::test]
    async fn empty_chunk_advances_without_a_frame() {
        let (tx, mut rx) = mpsc::channel(16);
        let (mut q, _) = queue(tx);

        q.accept(1, Bytes::from_static(b"one")).await;
        q.accept(0, Bytes::new()).await; // failed synthesis
        let msg = rx.try_recv().unwrap();
        assert_eq!(payload_of(&msg), b"one".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn speaking_holds_until_response_fully_released() {
        let (tx, _rx) = mpsc::channel(16);
        let (mut q, speaking) = queue(tx);

        q.accept(1, Bytes::from_static(b"one")).await;
        assert!(speaking.load(Ordering::Acquire));
        q.response_end(2);
        assert!(speaking.load(Ordering::Acquire)); // chunk 0 still missing
        q.accept(0, Bytes::from_static(b"zero")).await;
        assert!(!speaking.load(Ordering::Acquire));
    }
}
