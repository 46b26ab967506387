//! Wire contract for session-synchronized death wards.
//!
//! Transport independent: peers exchange [`WardMessage`] frames however the
//! host session layer likes; this crate only defines the schema and the
//! binary/JSON codecs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifespan value meaning "never expires".
pub const INDEFINITE_LIFESPAN: i16 = -1;

/// Minimal serializable state of one ward, sufficient to reconstruct it on
/// another session peer. Targets are referenced by stable net id, never by
/// local entity index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WardSnapshot {
    pub target: u64,
    pub modes: u8,
    pub safe_pos: Option<(i32, i32)>,
    pub save_cooldown: u8,
    pub revivals_left: u8,
    pub lifespan: i16,
    pub force_revive: bool,
}

impl WardSnapshot {
    pub fn is_indefinite(&self) -> bool {
        self.lifespan < 0
    }
}

/// Session traffic for the ward engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WardMessage {
    /// Broadcast by the peer owning the target when a ward is created.
    RequestProtection(WardSnapshot),
    /// Broadcast when a ward is destroyed.
    StopProtection(WardSnapshot),
    /// Full-state reconciliation, authority to joining peer. Receivers must
    /// check `from_authority` before replacing local state.
    SyncWards {
        from_authority: bool,
        wards: Vec<WardSnapshot>,
    },
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("binary ward frame decode failed: {0}")]
    Binary(#[from] bincode::Error),
    #[error("json ward frame decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn encode_message(message: &WardMessage) -> bincode::Result<Vec<u8>> {
    bincode::serialize(message)
}

pub fn decode_message(bytes: &[u8]) -> Result<WardMessage, ProtoError> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn encode_message_json(message: &WardMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

pub fn decode_message_json(data: &str) -> Result<WardMessage, ProtoError> {
    Ok(serde_json::from_str(data)?)
}
