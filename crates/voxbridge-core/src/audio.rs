//! μ-law payload handling.
//!
//! TTS vendors sometimes hand back the 8 kHz μ-law stream inside a WAV or AU
//! container even when a raw format was requested. The carrier must receive
//! bare μ-law, so leading containers are stripped before any payload enters
//! the playback queue.
//!
//! Parsing rules follow the rest of the wire layer: length-check before
//! slicing, never panic on short input.

use bytes::{Buf, Bytes};

/// RIFF/WAVE canonical header length.
const WAV_HEADER_LEN: usize = 44;
/// Sun AU header length.
const AU_HEADER_LEN: usize = 24;

/// One carrier media frame: 20 ms of μ-law at 8 kHz.
pub const FRAME_BYTES: usize = 160;

/// Strip a leading WAV (`RIFF`, 44 bytes) or AU (`.snd`, 24 bytes) wrapper.
/// Unwrapped payloads pass through untouched, as do payloads too short to
/// hold the header they advertise.
pub fn strip_container(mut payload: Bytes) -> Bytes {
    if payload.len() > WAV_HEADER_LEN && payload.starts_with(b"RIFF") {
        payload.advance(WAV_HEADER_LEN);
    } else if payload.len() > AU_HEADER_LEN && payload.starts_with(b".snd") {
        payload.advance(AU_HEADER_LEN);
    }
    payload
}

/// Split a μ-law payload into carrier-sized frames (final frame may be short).
pub fn frames(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    payload.chunks(FRAME_BYTES)
}
