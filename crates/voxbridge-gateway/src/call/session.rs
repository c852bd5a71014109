//! Per-call session task.
//!
//! One task multiplexes the carrier socket and the STT event stream; the
//! dialogue worker and playback queue run as sibling tasks owned by this
//! one. All carrier writes (greeting and rejection audio, streamed playback,
//! the final `stop`) funnel through a single writer task, so the socket has
//! exactly one writer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use voxbridge_core::audio;
use voxbridge_core::protocol::carrier::{self, CarrierFrame, StartMeta};
use voxbridge_core::speakable;

use crate::app_state::AppState;
use crate::call::dialogue::{self, Dialogue};
use crate::call::finalize::{CallOutcome, Finalizer};
use crate::call::playback::{self, PlaybackCmd, PlaybackQueue};
use crate::call::TranscriptLog;
use crate::gate::{self, DenyReason, GateDecision};
use crate::peers::stt::SttEvent;
use crate::peers::tts::SpeechSynth;
use crate::store::{CallRecord, CallStatus};
use crate::tenant::SharedSnapshot;
use crate::transport::codec::{self, Inbound};

pub async fn run(state: AppState, call_sid: &str, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);

    // Single socket writer.
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    run_call(&state, call_sid, &mut ws_rx, &out_tx).await;

    let _ = out_tx.send(Message::Close(None)).await;
    drop(out_tx);
    // Give the writer a moment to flush, then cut it loose.
    let mut writer = writer;
    if tokio::time::timeout(Duration::from_secs(1), &mut writer).await.is_err() {
        writer.abort();
    }
}

async fn run_call(
    state: &AppState,
    call_sid: &str,
    ws_rx: &mut SplitStream<WebSocket>,
    out_tx: &mpsc::Sender<Message>,
) {
    let start_timeout = Duration::from_secs(state.cfg().gateway.start_timeout_secs);
    let Some(start) = wait_for_start(ws_rx, start_timeout).await else {
        tracing::info!("no usable start frame; tearing down");
        return;
    };

    let stream_sid = start.stream_sid.clone();
    let Some(client_id) = start.client_id().map(str::to_string) else {
        tracing::warn!("start frame without client_id; closing");
        return;
    };
    let caller = start.caller().map(str::to_string);

    let snapshot: SharedSnapshot = match state.directory().lookup(&client_id).await {
        Ok(Some(s)) => Arc::new(s),
        Ok(None) => {
            tracing::warn!(client = %client_id, "unknown tenant; closing");
            return;
        }
        Err(e) => {
            tracing::warn!(client = %client_id, err = %e, "tenant lookup failed; closing");
            return;
        }
    };

    let gate_reason = match gate::admit(state.subs().as_ref(), &snapshot.tenant).await {
        GateDecision::Allow { reason } => {
            state
                .metrics()
                .gate_decisions
                .inc(&[("decision", "allow"), ("reason", reason.as_str())]);
            tracing::info!(tenant = %snapshot.tenant.id, reason = reason.as_str(), "call admitted");
            reason.as_str()
        }
        GateDecision::Deny { reason } => {
            state
                .metrics()
                .gate_decisions
                .inc(&[("decision", "deny"), ("reason", reason.as_str())]);
            deny_call(state, &snapshot, reason, &stream_sid, out_tx).await;
            state.metrics().calls_total.inc(&[("status", "denied")]);
            return;
        }
    };

    let started_at = Utc::now();
    let started = Instant::now();
    let speaking = Arc::new(AtomicBool::new(false));
    let busy = Arc::new(AtomicBool::new(false));
    let transferred = Arc::new(AtomicBool::new(false));
    let booked = Arc::new(AtomicBool::new(false));
    let transcript = TranscriptLog::new();

    // Playback task: sole ordering authority for outbound audio.
    let (playback_tx, playback_rx) = mpsc::channel::<PlaybackCmd>(64);
    let queue = PlaybackQueue::new(
        stream_sid.clone(),
        out_tx.clone(),
        speaking.clone(),
        state.metrics().clone(),
    );
    let playback_task = tokio::spawn(playback::run(queue, playback_rx));

    // STT peer. A failed connect degrades the call instead of ending it.
    let (stt_tx, mut stt_rx) = mpsc::channel::<SttEvent>(64);
    let stt = match state.stt().open(call_sid, stt_tx).await {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(err = %e, "stt connect failed; continuing without transcription");
            state.metrics().peer_errors.inc(&[("peer", "stt")]);
            None
        }
    };

    // Dialogue worker; finals are handed over one at a time.
    let (finals_tx, finals_rx) = mpsc::channel::<String>(1);
    let mut dlg = Dialogue::new(
        call_sid.to_string(),
        snapshot.clone(),
        state.llm().clone(),
        state.tts().clone(),
        state.control().clone(),
        state.store().clone(),
        playback_tx.clone(),
        transcript.clone(),
        state.metrics().clone(),
        transferred.clone(),
        booked.clone(),
    );

    let greeting = snapshot.tenant.greeting.clone().unwrap_or_else(|| {
        format!(
            "Thank you for calling {}. How can I help you today?",
            snapshot.tenant.business_name
        )
    });
    dlg.note_greeting(&greeting);
    tokio::spawn(speak_fixed(
        greeting,
        snapshot.voice.id.clone(),
        state.tts().clone(),
        playback_tx.clone(),
        Duration::from_millis(state.cfg().gateway.fixed_speech_gap_ms),
    ));

    let worker = tokio::spawn(dialogue::run_worker(dlg, busy.clone(), finals_rx));

    // Session record exists from the first frame on.
    let initial = CallRecord {
        call_sid: call_sid.to_string(),
        tenant_id: snapshot.tenant.id.clone(),
        caller: caller.clone(),
        stream_sid: Some(stream_sid.clone()),
        started_at,
        ended_at: None,
        duration_secs: 0,
        status: CallStatus::InProgress,
        summary: None,
        gate_reason: Some(gate_reason.to_string()),
    };
    if let Err(e) = state.store().upsert_call(&initial).await {
        tracing::warn!(err = %e, "initial call record failed");
    }

    let mut socket_failed = false;
    let mut stt_open = true;
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(m)) => match codec::decode(m) {
                        Ok(Inbound::Frame(frame)) => match frame {
                            CarrierFrame::Media { media } => {
                                state.metrics().carrier_frames.inc(&[("event", "media")]);
                                // Half-duplex: caller audio is dropped while
                                // the assistant is speaking to avoid echo.
                                if !speaking.load(Ordering::Acquire) {
                                    if let Some(stt) = &stt {
                                        match BASE64.decode(media.payload.as_bytes()) {
                                            Ok(bytes) => stt.send_audio(Bytes::from(bytes)).await,
                                            Err(e) => {
                                                tracing::debug!(err = %e, "undecodable media payload")
                                            }
                                        }
                                    }
                                }
                            }
                            CarrierFrame::Stop {} => {
                                state.metrics().carrier_frames.inc(&[("event", "stop")]);
                                tracing::info!("carrier stop");
                                break;
                            }
                            CarrierFrame::Connected { .. } | CarrierFrame::Start { .. } => {
                                tracing::debug!("redundant handshake frame mid-call");
                            }
                            CarrierFrame::Mark { .. } => {}
                        },
                        Ok(Inbound::Close) => {
                            tracing::info!("carrier socket closed");
                            break;
                        }
                        Ok(Inbound::Ping(_) | Inbound::Other) => {}
                        Err(e) => {
                            // Forward-compatible: unknown events are noise.
                            tracing::debug!(err = %e, "ignoring unknown carrier frame");
                        }
                    },
                    Some(Err(e)) => {
                        tracing::warn!(err = %e, "carrier socket error");
                        socket_failed = true;
                        break;
                    }
                    None => break,
                }
            }

            ev = stt_rx.recv(), if stt_open => match ev {
                Some(SttEvent::Final(text)) => {
                    state.metrics().stt_finals_total.inc(&[]);
                    // Single flight: one turn at a time, later finals are
                    // dropped rather than queued.
                    if busy.swap(true, Ordering::AcqRel) {
                        state.metrics().finals_dropped_total.inc(&[]);
                        tracing::debug!("final dropped; turn already in flight");
                    } else if finals_tx.try_send(text).is_err() {
                        busy.store(false, Ordering::Release);
                    }
                }
                Some(SttEvent::UtteranceEnd) => {
                    tracing::trace!("utterance end");
                }
                Some(SttEvent::Closed) => {
                    tracing::warn!("stt peer closed mid-call; no further transcription");
                }
                None => stt_open = false,
            },
        }
    }

    // Teardown order: keep-alive and STT peer first, then the worker, then
    // playback. An in-flight turn gets a grace period; its output is
    // discarded either way.
    if let Some(stt) = &stt {
        stt.close().await;
    }
    drop(finals_tx);
    let mut worker = worker;
    if tokio::time::timeout(Duration::from_secs(5), &mut worker).await.is_err() {
        tracing::debug!("dialogue worker cut off mid-turn");
        worker.abort();
    }
    drop(playback_tx);

    let outcome = CallOutcome {
        call_sid: call_sid.to_string(),
        snapshot,
        caller,
        stream_sid,
        started_at,
        duration_secs: started.elapsed().as_secs(),
        transferred: transferred.load(Ordering::Acquire),
        failed: socket_failed,
        booked: booked.load(Ordering::Acquire),
        gate_reason: Some(gate_reason.to_string()),
        transcript,
    };
    Finalizer::new()
        .run(
            state.store().as_ref(),
            state.billing().as_ref(),
            state.llm().as_ref(),
            state.metrics(),
            &outcome,
        )
        .await;

    playback_task.abort();
}

/// Wait for the `start` frame, bounded. `None` tears the session down with
/// nothing persisted.
async fn wait_for_start(
    ws_rx: &mut SplitStream<WebSocket>,
    timeout: Duration,
) -> Option<StartMeta> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(m)) => match codec::decode(m) {
                    Ok(Inbound::Frame(CarrierFrame::Start { start })) => return Some(start),
                    Ok(Inbound::Frame(CarrierFrame::Connected { .. })) => {}
                    Ok(Inbound::Frame(_)) => {
                        tracing::debug!("frame before start");
                    }
                    Ok(Inbound::Close) => return None,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(err = %e, "ignoring unknown carrier frame");
                    }
                },
                Some(Err(_)) | None => return None,
            },
            _ = tokio::time::sleep_until(deadline) => {
                tracing::info!("start frame deadline passed");
                return None;
            }
        }
    }
}

/// Speak the admission rejection, wait out (an estimate of) its playback,
/// then hang up. No STT, no LLM: the only vendor spend is this one synthesis.
async fn deny_call(
    state: &AppState,
    snapshot: &SharedSnapshot,
    reason: DenyReason,
    stream_sid: &str,
    out_tx: &mpsc::Sender<Message>,
) {
    let budget = Duration::from_secs(state.cfg().gateway.deny_playback_secs);
    let text = speakable::normalize(&reason.spoken_text(&snapshot.tenant));
    tracing::info!(tenant = %snapshot.tenant.id, reason = reason.as_str(), "call denied");

    match state.tts().synthesize(&snapshot.voice.id, &text).await {
        Ok(payload) => {
            let payload = audio::strip_container(payload);
            let frame = carrier::media_frame(stream_sid, &BASE64.encode(&payload));
            let _ = out_tx.send(Message::Text(frame)).await;
            // μ-law 8 kHz is 8000 bytes/second of speech.
            let playback = Duration::from_secs_f64(payload.len() as f64 / 8000.0);
            tokio::time::sleep(playback.min(budget)).await;
        }
        Err(e) => {
            tracing::warn!(err = %e, "rejection synthesis failed; hanging up silently");
            state.metrics().peer_errors.inc(&[("peer", "tts")]);
        }
    }
    let _ = out_tx.send(Message::Text(carrier::stop_frame(stream_sid))).await;
}

/// Fixed speech (the greeting): sentences synthesised sequentially with a
/// short pause between them, released through the playback queue like any
/// other response.
async fn speak_fixed(
    text: String,
    voice_id: String,
    tts: Arc<dyn SpeechSynth>,
    playback: mpsc::Sender<PlaybackCmd>,
    gap: Duration,
) {
    let sentences = split_fixed(&text);
    let mut index = 0u32;
    for sentence in &sentences {
        if index > 0 && !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }
        let audio = match tts.synthesize(&voice_id, &speakable::normalize(sentence)).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(err = %e, "fixed speech synthesis failed");
                Bytes::new()
            }
        };
        if playback.send(PlaybackCmd::Chunk { index, audio }).await.is_err() {
            return;
        }
        index += 1;
    }
    let _ = playback.send(PlaybackCmd::ResponseEnd { total: index }).await;
}

fn split_fixed(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let t = current.trim();
            if !t.is_empty() {
                sentences.push(t.to_string());
            }
            current.clear();
        }
    }
    let t = current.trim();
    if !t.is_empty() {
        sentences.push(t.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_text_splits_on_terminal_punctuation() {
        let s = split_fixed("Thanks for calling Acme. How can I help you today?");
        assert_eq!(s, vec!["Thanks for calling Acme.", "How can I help you today?"]);
    }

    #[test]
    fn fixed_text_without_punctuation_is_one_sentence() {
        assert_eq!(split_fixed("hello there"), vec!["hello there"]);
    }
}
