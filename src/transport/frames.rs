//! Wire frames.
//!
//! Every frame is a JSON object `{"type": "...", "payload": {...}}`.
//! Outbound frames are what the client may send; inbound frames are what
//! the backend emits during a session.

use crate::state::types::{CharacterSummary, ModelInfo, PlaybackTask};
use serde::{Deserialize, Serialize};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientFrame {
    #[serde(rename = "session:start")]
    SessionStart { character_id: String },

    #[serde(rename = "user:text")]
    UserText { text: String },

    /// Base64 PCM16 mono captured speech.
    #[serde(rename = "user:audio_chunk")]
    UserAudioChunk { data: String },

    #[serde(rename = "user:audio_end")]
    UserAudioEnd {},

    #[serde(rename = "user:interrupt")]
    UserInterrupt {},
}

/// Frames received from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerFrame {
    #[serde(rename = "session:ready")]
    SessionReady {
        character: CharacterSummary,
        live2d_model_info: ModelInfo,
    },

    #[serde(rename = "avatar:speak")]
    AvatarSpeak(PlaybackTask),

    #[serde(rename = "avatar:idle")]
    AvatarIdle {},

    #[serde(rename = "asr:partial")]
    AsrPartial { text: String },

    #[serde(rename = "asr:final")]
    AsrFinal { text: String },
}
