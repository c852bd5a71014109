//! Shared error type across voxbridge crates.

use thiserror::Error;

/// External peers a call talks to. Used for error labelling and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Stt,
    Llm,
    Tts,
    Carrier,
    Store,
    Billing,
}

impl Peer {
    /// Stable string used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Peer::Stt => "stt",
            Peer::Llm => "llm",
            Peer::Tts => "tts",
            Peer::Carrier => "carrier",
            Peer::Store => "store",
            Peer::Billing => "billing",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, VoxError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum VoxError {
    #[error("bad frame: {0}")]
    BadFrame(String),
    #[error("call admission denied: {0}")]
    Denied(&'static str),
    #[error("{} peer failed: {detail}", .peer.as_str())]
    PeerFailed { peer: Peer, detail: String },
    #[error("{} peer timed out", .0.as_str())]
    PeerTimeout(Peer),
    #[error("config: {0}")]
    Config(String),
    #[error("store: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl VoxError {
    /// Shorthand for peer failures wrapping a vendor client error.
    pub fn peer(peer: Peer, err: impl std::fmt::Display) -> Self {
        VoxError::PeerFailed {
            peer,
            detail: err.to_string(),
        }
    }

    /// Which peer this error is attributable to, if any.
    pub fn peer_label(&self) -> Option<&'static str> {
        match self {
            VoxError::PeerFailed { peer, .. } | VoxError::PeerTimeout(peer) => Some(peer.as_str()),
            VoxError::Store(_) => Some(Peer::Store.as_str()),
            _ => None,
        }
    }
}
