//! Dialogue orchestrator: one worker task per call.
//!
//! The worker owns the conversation history and session memory exclusively.
//! User turns arrive one at a time (the session drops finals while a turn is
//! in flight), stream through the model, get chunked at sentence boundaries
//! and dispatched to synthesis in index order. Marker side effects run after
//! the stream ends, against the accumulated response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;

use voxbridge_core::markers::{self, BookingBlock};
use voxbridge_core::sentence::SentenceChunker;
use voxbridge_core::speakable;

use crate::call::playback::PlaybackCmd;
use crate::call::{prompt, TranscriptLog};
use crate::obs::metrics::BridgeMetrics;
use crate::peers::carrier::CallControl;
use crate::peers::llm::{ChatMessage, ChatModel};
use crate::peers::tts::SpeechSynth;
use crate::store::{
    Appointment, AppointmentStatus, CallStore, Speaker, Turn, TurnKind,
};
use crate::tenant::SharedSnapshot;

/// Number of history turns included in each prompt.
const HISTORY_TAIL: usize = 10;

const APOLOGY: &str = "I'm sorry, I'm having a little trouble right now. Could you say that again?";

/// Per-call conversational flags, owned by the worker.
#[derive(Debug, Default, Clone)]
pub struct SessionMemory {
    pub intro_played: bool,
    pub pricing_discussed: bool,
    pub service_explained: bool,
}

/// Facts extracted from the conversation as it happens.
#[derive(Debug, Default, Clone)]
pub struct SessionVariables {
    pub customer_name: Option<String>,
}

pub struct Dialogue {
    pub call_sid: String,
    pub snapshot: SharedSnapshot,
    pub llm: Arc<dyn ChatModel>,
    pub tts: Arc<dyn SpeechSynth>,
    pub control: Arc<dyn CallControl>,
    pub store: Arc<dyn CallStore>,
    pub playback: mpsc::Sender<PlaybackCmd>,
    pub transcript: TranscriptLog,
    pub metrics: Arc<BridgeMetrics>,
    /// Set on a successful transfer; the finaliser stores the call as
    /// transferred once the carrier tears the stream down.
    pub transferred: Arc<AtomicBool>,
    /// Set when a booking was created mid-call, so the post-call extraction
    /// pass does not create a second appointment.
    pub booked: Arc<AtomicBool>,

    pub memory: SessionMemory,
    pub variables: SessionVariables,
    history: Vec<ChatMessage>,
}

impl Dialogue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        call_sid: String,
        snapshot: SharedSnapshot,
        llm: Arc<dyn ChatModel>,
        tts: Arc<dyn SpeechSynth>,
        control: Arc<dyn CallControl>,
        store: Arc<dyn CallStore>,
        playback: mpsc::Sender<PlaybackCmd>,
        transcript: TranscriptLog,
        metrics: Arc<BridgeMetrics>,
        transferred: Arc<AtomicBool>,
        booked: Arc<AtomicBool>,
    ) -> Self {
        Self {
            call_sid,
            snapshot,
            llm,
            tts,
            control,
            store,
            playback,
            transcript,
            metrics,
            transferred,
            booked,
            memory: SessionMemory::default(),
            variables: SessionVariables::default(),
            history: Vec::new(),
        }
    }

    /// Record the spoken greeting so the prompt and transcript know about it.
    pub fn note_greeting(&mut self, text: &str) {
        self.memory.intro_played = true;
        self.history.push(ChatMessage::assistant(text));
        self.transcript
            .append(Turn::now(Speaker::Assistant, TurnKind::Greeting, text));
    }

    /// Process one final utterance end-to-end. The session has already set
    /// the busy flag; the worker loop clears it when this returns.
    pub async fn handle_final(&mut self, utterance: &str) {
        let turn_started = Instant::now();

        self.transcript
            .append(Turn::now(Speaker::User, TurnKind::Transcription, utterance));

        let mut messages = Vec::with_capacity(HISTORY_TAIL + 2);
        messages.push(ChatMessage::system(prompt::system_prompt(
            &self.snapshot,
            &self.memory,
            &self.variables,
            chrono::Utc::now(),
        )));
        let tail_from = self.history.len().saturating_sub(HISTORY_TAIL);
        messages.extend_from_slice(&self.history[tail_from..]);
        messages.push(ChatMessage::user(utterance));
        self.history.push(ChatMessage::user(utterance));

        let mut chunker = SentenceChunker::new();
        let mut dispatcher = ChunkDispatcher {
            next_index: 0,
            call_sid: self.call_sid.clone(),
            voice_id: self.snapshot.voice.id.clone(),
            tts: self.tts.clone(),
            playback: self.playback.clone(),
            metrics: self.metrics.clone(),
        };

        let streamed = self
            .llm
            .stream_chat(&messages, &mut |delta| {
                if let Some(sentence) = chunker.push(delta) {
                    dispatcher.dispatch(&sentence);
                }
            })
            .await;

        let full = match streamed {
            Ok(full) => full,
            Err(e) => {
                tracing::warn!(call = %self.call_sid, err = %e, "model stream failed");
                self.metrics.peer_errors.inc(&[("peer", "llm")]);
                dispatcher.dispatch(APOLOGY);
                dispatcher.finish().await;
                return;
            }
        };
        if let Some(tail) = chunker.flush() {
            dispatcher.dispatch(&tail);
        }

        let outcome = markers::scan(&full);
        if !outcome.clean.is_empty() {
            self.history.push(ChatMessage::assistant(&outcome.clean));
            self.transcript
                .append(Turn::now(Speaker::Assistant, TurnKind::AiResponse, &outcome.clean));
        }

        if let Some(block) = outcome.booking {
            self.handle_booking(block, &mut dispatcher).await;
        }
        if outcome.transfer {
            self.handle_transfer(&mut dispatcher).await;
        }
        dispatcher.finish().await;

        self.note_signals(utterance, &outcome.clean);
        self.metrics.turn_duration.observe(&[], turn_started.elapsed());
    }

    /// Transfer marker handling, per tenant configuration.
    async fn handle_transfer(&mut self, dispatcher: &mut ChunkDispatcher) {
        let tenant = &self.snapshot.tenant;
        if !tenant.call_transfer_enabled {
            tracing::debug!(call = %self.call_sid, "transfer marker ignored (disabled)");
            return;
        }

        let Some(number) = tenant.call_transfer_number.clone() else {
            let fallback = format!(
                "I'm sorry, no one is available to take the call right now. \
                 Please email {} and the team will get back to you.",
                tenant.contact_email
            );
            dispatcher.dispatch(&fallback);
            self.transcript.append(Turn::now(
                Speaker::System,
                TurnKind::TransferFallback,
                "transfer failed: number not configured",
            ));
            return;
        };

        let conversation = self.transcript.flatten();
        match self.control.transfer(&self.call_sid, &number, &conversation).await {
            Ok(()) => {
                self.transferred.store(true, Ordering::Release);
                self.transcript.append(Turn::now(
                    Speaker::System,
                    TurnKind::Transfer,
                    format!("transfer initiated to {number}"),
                ));
            }
            Err(e) => {
                tracing::warn!(call = %self.call_sid, err = %e, "transfer request failed");
                self.metrics.peer_errors.inc(&[("peer", "carrier")]);
                self.transcript.append(Turn::now(
                    Speaker::System,
                    TurnKind::TransferFallback,
                    "transfer failed: carrier error",
                ));
            }
        }
    }

    /// Booking marker handling: create the appointment and confirm out loud.
    async fn handle_booking(&mut self, block: BookingBlock, dispatcher: &mut ChunkDispatcher) {
        if !block.is_complete() {
            tracing::warn!(call = %self.call_sid, ?block, "booking block missing required fields");
            self.transcript.append(Turn::now(
                Speaker::System,
                TurnKind::BookingError,
                "booking request missing required fields",
            ));
            return;
        }

        // is_complete guarantees date, times and name.
        let name = block.customer_name.clone().unwrap_or_default();
        let date = block.date.clone().unwrap_or_default();
        let start = block.start_time.clone().unwrap_or_default();
        let appt = Appointment {
            tenant_id: self.snapshot.tenant.id.clone(),
            call_sid: self.call_sid.clone(),
            customer_name: name.clone(),
            customer_phone: block.customer_phone,
            customer_email: block.customer_email,
            date: block.date,
            start_time: block.start_time,
            end_time: block.end_time,
            service: block.service,
            notes: block.notes,
            status: AppointmentStatus::Confirmed,
        };

        match self.store.insert_appointment(&appt).await {
            Ok(()) => {
                self.booked.store(true, Ordering::Release);
                let confirmation = format!("You're all set, {name}: {date} at {start}.");
                dispatcher.dispatch(&confirmation);
                self.transcript.append(Turn::now(
                    Speaker::System,
                    TurnKind::BookingConfirmation,
                    confirmation,
                ));
            }
            Err(e) => {
                tracing::warn!(call = %self.call_sid, err = %e, "appointment insert failed");
                self.metrics.finalize_errors.inc(&[("step", "booking_marker")]);
                self.transcript.append(Turn::now(
                    Speaker::System,
                    TurnKind::BookingError,
                    "booking could not be saved",
                ));
            }
        }
    }

    /// Cheap per-turn signal extraction: caller name and topic flags.
    fn note_signals(&mut self, utterance: &str, response: &str) {
        if self.variables.customer_name.is_none() {
            self.variables.customer_name = heuristic_name(utterance);
        }
        let lower = format!("{} {}", utterance, response).to_lowercase();
        if lower.contains("price") || lower.contains("cost") || lower.contains("dollar") {
            self.memory.pricing_discussed = true;
        }
        if self
            .snapshot
            .tenant
            .services
            .iter()
            .any(|s| lower.contains(&s.to_lowercase()))
        {
            self.memory.service_explained = true;
        }
    }
}

/// Assigns monotonic chunk indices and fans synthesis out. Dispatch order is
/// index order; completion order is whatever the vendor does, which is why
/// the playback queue re-orders.
struct ChunkDispatcher {
    next_index: u32,
    call_sid: String,
    voice_id: String,
    tts: Arc<dyn SpeechSynth>,
    playback: mpsc::Sender<PlaybackCmd>,
    metrics: Arc<BridgeMetrics>,
}

impl ChunkDispatcher {
    fn dispatch(&mut self, raw: &str) {
        let text = markers::strip_inline(raw);
        if text.is_empty() {
            return;
        }
        let speakable = speakable::normalize(&text);

        let index = self.next_index;
        self.next_index += 1;
        self.metrics.tts_chunks_total.inc(&[]);

        let call = self.call_sid.clone();
        let voice = self.voice_id.clone();
        let tts = self.tts.clone();
        let playback = self.playback.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let audio = match tts.synthesize(&voice, &speakable).await {
                Ok(b) => b,
                Err(e) => {
                    // Silent chunk: the caller hears nothing for this
                    // sentence but later chunks still play.
                    tracing::warn!(call = %call, index, err = %e, "synthesis failed");
                    metrics.peer_errors.inc(&[("peer", "tts")]);
                    Bytes::new()
                }
            };
            let _ = playback.send(PlaybackCmd::Chunk { index, audio }).await;
        });
    }

    async fn finish(&mut self) {
        let _ = self
            .playback
            .send(PlaybackCmd::ResponseEnd {
                total: self.next_index,
            })
            .await;
    }
}

/// Worker loop: drains finals until the session drops the channel.
pub async fn run_worker(
    mut dialogue: Dialogue,
    busy: Arc<AtomicBool>,
    mut finals: mpsc::Receiver<String>,
) {
    while let Some(utterance) = finals.recv().await {
        dialogue.handle_final(&utterance).await;
        busy.store(false, Ordering::Release);
    }
}

/// "my name is X" / "this is X" / "I'm X" → X, capped at two words.
fn heuristic_name(utterance: &str) -> Option<String> {
    let lower = utterance.to_lowercase();
    let patterns = ["my name is ", "this is ", "i'm ", "i am "];
    for p in patterns {
        if let Some(pos) = lower.find(p) {
            let rest = &utterance[pos + p.len()..];
            let name: Vec<&str> = rest
                .split_whitespace()
                .take(2)
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
                .take_while(|w| w.chars().next().is_some_and(char::is_uppercase))
                .collect();
            if !name.is_empty() {
                return Some(name.join(" "));
            }
        }
    }
    None
}
