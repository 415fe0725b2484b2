pub mod reducer;
pub mod store;
pub mod types;

pub use reducer::transition;
pub use store::SessionStore;
pub use types::{
    AiState, AsrState, Author, Character, CharacterSummary, ConnectionStatus, ExpressionDirective,
    Message, ModelInfo, MotionDirective, PlaybackTask, Session, SessionEvent, VoiceInputMode,
};
