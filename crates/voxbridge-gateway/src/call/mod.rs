//! Per-call runtime: one task per call owns the carrier socket, the STT
//! peer, the dialogue worker and the playback queue. Nothing here is shared
//! across calls except the registry and metrics.

pub mod dialogue;
pub mod extract;
pub mod finalize;
pub mod playback;
pub mod prompt;
pub mod registry;
pub mod session;

use std::sync::{Arc, Mutex};

use crate::store::{Speaker, Turn};

/// Append-only transcript shared between the dialogue worker (writer) and
/// the finaliser (reader, after the worker stops).
#[derive(Clone, Default)]
pub struct TranscriptLog {
    turns: Arc<Mutex<Vec<Turn>>>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, turn: Turn) {
        if let Ok(mut g) = self.turns.lock() {
            g.push(turn);
        }
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Flattened "speaker: content" lines, the shape handed to the
    /// extraction passes and the transfer API.
    pub fn flatten(&self) -> String {
        self.snapshot()
            .iter()
            .map(|t| {
                let who = match t.speaker {
                    Speaker::User => "user",
                    Speaker::Assistant => "assistant",
                    Speaker::System => "system",
                };
                format!("{who}: {}", t.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Short call summary: user turns concatenated, truncated to 200 chars.
    pub fn summary(&self) -> String {
        let joined = self
            .snapshot()
            .iter()
            .filter(|t| t.speaker == Speaker::User)
            .map(|t| t.content.clone())
            .collect::<Vec<_>>()
            .join(" ");
        truncate_chars(&joined, 200)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
