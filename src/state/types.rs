//! Session state types
//!
//! The whole conversation is modelled as a single immutable `Session`
//! aggregate mutated only by `reducer::transition`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of the websocket connection to the avatar backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// What the AI is currently doing.
///
/// `ThinkingSpeaking` covers the window where the LLM is still generating
/// while earlier audio chunks are already playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Idle,
    Thinking,
    Speaking,
    ThinkingSpeaking,
}

impl AiState {
    /// True while any playback may legitimately be in flight.
    pub fn is_speaking(self) -> bool {
        matches!(self, AiState::Speaking | AiState::ThinkingSpeaking)
    }

    /// True while the AI is producing a reply in any form. Barge-in is
    /// only meaningful in these states.
    pub fn is_busy(self) -> bool {
        !matches!(self, AiState::Idle)
    }
}

/// State of the speech-recognition side of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrState {
    Idle,
    Listening,
    ListeningProcessing,
    Processing,
}

impl AsrState {
    /// Whether the capture device must be physically active in this state.
    pub fn requires_capture(self) -> bool {
        matches!(self, AsrState::Listening | AsrState::ListeningProcessing)
    }
}

/// How voice input is driven: explicit push-to-talk, or hands-free
/// conversation (optionally continuous, i.e. the mic stays hot while the
/// AI is replying).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceInputMode {
    Manual,
    Conversation { continuous: bool },
}

impl VoiceInputMode {
    pub fn is_conversation(self) -> bool {
        matches!(self, VoiceInputMode::Conversation { .. })
    }

    pub fn is_continuous(self) -> bool {
        matches!(self, VoiceInputMode::Conversation { continuous: true })
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Ai,
}

/// A single chat message. Append-only, except that consecutive AI speech
/// chunks coalesce into the most recent AI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub author: Author,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(author: Author, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Live2D model configuration. The core never interprets anything beyond
/// the model URL; the rest is an opaque payload handed to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Static character descriptor as served by the catalog endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub live2d_model_info: ModelInfo,
}

/// Character fields as carried inside a `session:ready` frame, where the
/// model info travels as a sibling payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub id: String,
    pub name: String,
    pub image_url: String,
}

impl CharacterSummary {
    pub fn into_character(self, live2d_model_info: ModelInfo) -> Character {
        Character {
            id: self.id,
            name: self.name,
            image_url: self.image_url,
            live2d_model_info,
        }
    }
}

/// An expression directive carried by an `avatar:speak` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionDirective {
    pub name: String,
    #[serde(default)]
    pub value: f32,
}

/// A motion directive carried by an `avatar:speak` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionDirective {
    pub group: String,
    #[serde(default)]
    pub index: u32,
}

/// One unit of avatar work: speak a text chunk, play its audio, present
/// expression and motion. Produced by the transport on `avatar:speak`,
/// destroyed by the scheduler after playback or on interrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTask {
    #[serde(default)]
    pub text: String,
    /// Base64-encoded audio payload, WAV or bare PCM16 mono.
    #[serde(default)]
    pub audio: String,
    #[serde(default)]
    pub expressions: Vec<ExpressionDirective>,
    #[serde(default)]
    pub motions: Vec<MotionDirective>,
}

/// The single authoritative session aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub connection_status: ConnectionStatus,
    pub ai_state: AiState,
    pub asr_state: AsrState,
    pub voice_input: VoiceInputMode,
    pub messages: Vec<Message>,
    pub selected_character: Option<Character>,
    pub character_loaded: bool,
    pub character_catalog: Vec<Character>,
    pub playback_queue: Vec<PlaybackTask>,
    pub partial_transcript: String,
    pub is_llm_complete: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            connection_status: ConnectionStatus::Disconnected,
            ai_state: AiState::Idle,
            asr_state: AsrState::Idle,
            voice_input: VoiceInputMode::Conversation { continuous: true },
            messages: Vec::new(),
            selected_character: None,
            character_loaded: false,
            character_catalog: Vec::new(),
            playback_queue: Vec::new(),
            partial_transcript: String::new(),
            is_llm_complete: true,
        }
    }
}

impl Session {
    /// Core consistency check: a non-empty playback queue implies the AI
    /// is in a speaking state, and an empty-queue idle AI never claims to
    /// be speaking-with-queue. Evaluated after every transition in tests.
    pub fn invariants_hold(&self) -> bool {
        self.playback_queue.is_empty() || self.ai_state.is_speaking()
    }
}

/// Every event the state machine can consume, from all four producers:
/// user actions, system-internal events, transport events, and the
/// playback scheduler.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    // User actions
    UserSendText { text: String },
    UserStartRecording,
    UserStopRecording,
    UserSelectCharacter { character_id: String },
    UserInterrupt,
    UserAudioChunkSent,
    UserAudioEndSent,

    // System events
    SystemConnect,
    SystemDisconnect,
    SystemCharactersFetched { characters: Vec<Character> },
    SystemPlaybackFinished,
    SystemSetVoiceInput { mode: VoiceInputMode },

    // Server messages
    ServerConnectSuccess,
    ServerCharacterReady { character: Character },
    ServerConnectError,
    ServerDisconnected,
    ServerAvatarSpeak { task: PlaybackTask },
    ServerAvatarIdle,
    ServerAsrPartial { text: String },
    ServerAsrFinal { text: String },
}
