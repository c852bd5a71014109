//! Wire taxonomies for the two per-call sockets.
//!
//! - Carrier lane: JSON frames on the inbound media WebSocket (Twilio shape).
//! - STT lane: JSON messages on the outbound live-transcription WebSocket.

pub mod carrier;
pub mod stt;
