//! Decode-once codec for the carrier socket.
//!
//! Text frames become [`CarrierFrame`]s; lifecycle frames are surfaced for
//! the session loop. A text frame that does not parse is an unknown carrier
//! event: the caller logs it and moves on.

use axum::extract::ws::Message;

use voxbridge_core::error::{Result, VoxError};
use voxbridge_core::protocol::carrier::CarrierFrame;

#[derive(Debug)]
pub enum Inbound {
    Frame(CarrierFrame),
    Ping(Vec<u8>),
    Close,
    Other,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => {
            let frame: CarrierFrame = serde_json::from_str(&s)
                .map_err(|e| VoxError::BadFrame(format!("unparseable carrier frame: {e}")))?;
            Ok(Inbound::Frame(frame))
        }
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Close(_) => Ok(Inbound::Close),
        _ => Ok(Inbound::Other),
    }
}
