//! The session transition function.
//!
//! `transition` is a pure, total mapping from (session, event) to the next
//! session value. It performs no I/O and never blocks; all side effects
//! (frame sends, capture start/stop, presentation) are issued by the
//! components that observe the resulting state.

use crate::state::types::{
    AiState, AsrState, Author, ConnectionStatus, Message, Session, SessionEvent, VoiceInputMode,
};

pub fn transition(current: &Session, event: &SessionEvent) -> Session {
    let mut next = current.clone();

    match event {
        SessionEvent::UserSendText { text } => {
            next.ai_state = AiState::Thinking;
            next.asr_state = if current.voice_input.is_continuous() {
                AsrState::Listening
            } else {
                AsrState::Idle
            };
            next.messages.push(Message::new(Author::User, text.clone()));
            next.is_llm_complete = false;
        }

        SessionEvent::UserStartRecording => {
            next.asr_state = AsrState::Listening;
        }

        SessionEvent::UserStopRecording => {
            next.asr_state = match current.asr_state {
                AsrState::Processing | AsrState::ListeningProcessing => AsrState::Processing,
                _ => AsrState::Idle,
            };
        }

        SessionEvent::UserSelectCharacter { character_id } => {
            // Unknown ids are a caller-contract violation and leave the
            // session untouched.
            if let Some(character) = current
                .character_catalog
                .iter()
                .find(|c| &c.id == character_id)
            {
                next.selected_character = Some(character.clone());
                next.character_loaded = false;
            }
        }

        SessionEvent::UserInterrupt => {
            next.ai_state = AiState::Idle;
            next.asr_state = AsrState::Listening;
            next.playback_queue.clear();
            next.is_llm_complete = true;
        }

        SessionEvent::UserAudioChunkSent => {
            next.asr_state = AsrState::ListeningProcessing;
        }

        SessionEvent::UserAudioEndSent => {
            if current.voice_input.is_conversation() {
                next.asr_state = if current.voice_input.is_continuous() {
                    AsrState::ListeningProcessing
                } else {
                    AsrState::Processing
                };
            }
        }

        SessionEvent::SystemConnect => {
            next.connection_status = ConnectionStatus::Connecting;
        }

        SessionEvent::SystemDisconnect | SessionEvent::ServerDisconnected => {
            next = Session::default();
        }

        SessionEvent::SystemCharactersFetched { characters } => {
            next.character_catalog = characters.clone();
        }

        SessionEvent::SystemPlaybackFinished => {
            // A completion with nothing queued is a late straggler from a
            // superseded task; ignore it.
            if current.playback_queue.is_empty() {
                return next;
            }
            next.playback_queue.remove(0);

            if next.playback_queue.is_empty() && current.is_llm_complete {
                next.ai_state = AiState::Idle;
                // Hands-free non-continuous mode re-arms the mic once the
                // reply has fully played out.
                if current.voice_input.is_conversation() && !current.voice_input.is_continuous() {
                    next.asr_state = AsrState::Listening;
                }
            } else {
                next.ai_state = if current.is_llm_complete {
                    AiState::Speaking
                } else {
                    AiState::ThinkingSpeaking
                };
            }
        }

        SessionEvent::SystemSetVoiceInput { mode } => {
            next.voice_input = *mode;
            next.asr_state = match mode {
                VoiceInputMode::Conversation { continuous }
                    if current.ai_state == AiState::Idle || *continuous =>
                {
                    AsrState::Listening
                }
                _ => AsrState::Idle,
            };
        }

        SessionEvent::ServerConnectSuccess => {
            next.connection_status = ConnectionStatus::Connected;
        }

        SessionEvent::ServerCharacterReady { character } => {
            next.selected_character = Some(character.clone());
            next.character_loaded = true;
            next.asr_state = AsrState::Listening;
        }

        SessionEvent::ServerConnectError => {
            next.connection_status = ConnectionStatus::Error;
        }

        SessionEvent::ServerAvatarSpeak { task } => {
            // Consecutive speech chunks of one reply coalesce into the
            // most recent AI message.
            match next.messages.last_mut() {
                Some(last) if last.author == Author::Ai => {
                    last.text.push(' ');
                    last.text.push_str(&task.text);
                }
                _ => next.messages.push(Message::new(Author::Ai, task.text.clone())),
            }
            next.playback_queue.push(task.clone());
            next.ai_state = AiState::ThinkingSpeaking;
            next.is_llm_complete = false;
        }

        SessionEvent::ServerAvatarIdle => {
            // The LLM is done but queued audio may still be playing; the
            // final SystemPlaybackFinished takes the state to Idle.
            next.ai_state = if current.playback_queue.is_empty() {
                AiState::Idle
            } else {
                AiState::Speaking
            };
            next.is_llm_complete = true;
        }

        SessionEvent::ServerAsrPartial { text } => {
            next.partial_transcript = text.clone();
            next.asr_state = AsrState::ListeningProcessing;
        }

        SessionEvent::ServerAsrFinal { text } => {
            if text.is_empty() {
                next.asr_state = if current.voice_input.is_conversation() {
                    AsrState::Listening
                } else {
                    AsrState::Idle
                };
            } else {
                next.messages.push(Message::new(Author::User, text.clone()));
                next.partial_transcript.clear();
                next.ai_state = AiState::Thinking;
                next.asr_state = if current.voice_input.is_continuous() {
                    AsrState::Listening
                } else {
                    AsrState::Idle
                };
                next.is_llm_complete = false;
            }
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{Character, ModelInfo, PlaybackTask};

    fn apply(session: Session, events: &[SessionEvent]) -> Session {
        events.iter().fold(session, |s, e| {
            let next = transition(&s, e);
            assert!(next.invariants_hold(), "invariant broken by {:?}", e);
            next
        })
    }

    fn character(id: &str) -> Character {
        Character {
            id: id.to_string(),
            name: format!("Character {}", id),
            image_url: format!("https://example.com/{}.png", id),
            live2d_model_info: ModelInfo::default(),
        }
    }

    fn speak_task(text: &str) -> PlaybackTask {
        PlaybackTask {
            text: text.to_string(),
            audio: String::new(),
            expressions: Vec::new(),
            motions: Vec::new(),
        }
    }

    fn manual_session() -> Session {
        Session {
            voice_input: VoiceInputMode::Manual,
            asr_state: AsrState::Idle,
            ..Session::default()
        }
    }

    #[test]
    fn send_text_appends_message_and_starts_thinking() {
        let next = apply(
            Session::default(),
            &[SessionEvent::UserSendText {
                text: "hello".into(),
            }],
        );
        assert_eq!(next.ai_state, AiState::Thinking);
        assert_eq!(next.asr_state, AsrState::Listening);
        assert!(!next.is_llm_complete);
        assert_eq!(next.messages.len(), 1);
        assert_eq!(next.messages[0].author, Author::User);
        assert_eq!(next.messages[0].text, "hello");
    }

    #[test]
    fn send_text_in_manual_mode_keeps_mic_idle() {
        let next = apply(
            manual_session(),
            &[SessionEvent::UserSendText {
                text: "hello".into(),
            }],
        );
        assert_eq!(next.asr_state, AsrState::Idle);
    }

    #[test]
    fn stop_recording_keeps_processing_when_transcription_pending() {
        // Manual mode scenario from the push-to-talk flow: chunk already
        // sent, so stopping must wait for the final transcript.
        let next = apply(
            manual_session(),
            &[
                SessionEvent::UserStartRecording,
                SessionEvent::UserAudioChunkSent,
                SessionEvent::UserStopRecording,
            ],
        );
        assert_eq!(next.asr_state, AsrState::Processing);
    }

    #[test]
    fn stop_recording_without_pending_audio_goes_idle() {
        let next = apply(
            manual_session(),
            &[
                SessionEvent::UserStartRecording,
                SessionEvent::UserStopRecording,
            ],
        );
        assert_eq!(next.asr_state, AsrState::Idle);
    }

    #[test]
    fn select_character_requires_catalog_entry() {
        let session = apply(
            Session::default(),
            &[SessionEvent::SystemCharactersFetched {
                characters: vec![character("miku")],
            }],
        );

        let missing = transition(
            &session,
            &SessionEvent::UserSelectCharacter {
                character_id: "nobody".into(),
            },
        );
        assert_eq!(missing, session);

        let found = transition(
            &session,
            &SessionEvent::UserSelectCharacter {
                character_id: "miku".into(),
            },
        );
        assert_eq!(found.selected_character.as_ref().unwrap().id, "miku");
        assert!(!found.character_loaded);
    }

    #[test]
    fn interrupt_resets_from_any_state() {
        let busy = apply(
            Session::default(),
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("one"),
                },
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("two"),
                },
            ],
        );
        assert_eq!(busy.playback_queue.len(), 2);

        let next = transition(&busy, &SessionEvent::UserInterrupt);
        assert!(next.playback_queue.is_empty());
        assert_eq!(next.ai_state, AiState::Idle);
        assert_eq!(next.asr_state, AsrState::Listening);
        assert!(next.is_llm_complete);
        // Conversation context survives an interrupt.
        assert_eq!(next.messages.len(), busy.messages.len());
    }

    #[test]
    fn audio_end_in_continuous_mode_keeps_listening() {
        let next = apply(Session::default(), &[SessionEvent::UserAudioEndSent]);
        assert_eq!(next.asr_state, AsrState::ListeningProcessing);
    }

    #[test]
    fn audio_end_in_non_continuous_conversation_processes() {
        let session = Session {
            voice_input: VoiceInputMode::Conversation { continuous: false },
            ..Session::default()
        };
        let next = transition(&session, &SessionEvent::UserAudioEndSent);
        assert_eq!(next.asr_state, AsrState::Processing);
    }

    #[test]
    fn audio_end_in_manual_mode_is_a_no_op() {
        let session = manual_session();
        let next = transition(&session, &SessionEvent::UserAudioEndSent);
        assert_eq!(next, session);
    }

    #[test]
    fn avatar_speak_coalesces_consecutive_chunks() {
        let next = apply(
            Session::default(),
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("Hello"),
                },
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("there!"),
                },
            ],
        );
        assert_eq!(next.messages.len(), 1);
        assert_eq!(next.messages[0].author, Author::Ai);
        assert_eq!(next.messages[0].text, "Hello there!");
        assert_eq!(next.playback_queue.len(), 2);
        assert_eq!(next.ai_state, AiState::ThinkingSpeaking);
    }

    #[test]
    fn user_message_breaks_ai_coalescing() {
        let next = apply(
            Session::default(),
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("First reply"),
                },
                SessionEvent::UserSendText {
                    text: "next question".into(),
                },
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("Second reply"),
                },
            ],
        );
        assert_eq!(next.messages.len(), 3);
        assert_eq!(next.messages[0].text, "First reply");
        assert_eq!(next.messages[2].text, "Second reply");
    }

    #[test]
    fn avatar_idle_before_queue_drains_keeps_speaking() {
        let next = apply(
            Session::default(),
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("hi"),
                },
                SessionEvent::ServerAvatarIdle,
            ],
        );
        assert_eq!(next.ai_state, AiState::Speaking);
        assert!(next.is_llm_complete);
        assert_eq!(next.playback_queue.len(), 1);
    }

    #[test]
    fn avatar_idle_with_empty_queue_goes_idle() {
        let next = apply(Session::default(), &[SessionEvent::ServerAvatarIdle]);
        assert_eq!(next.ai_state, AiState::Idle);
        assert!(next.is_llm_complete);
    }

    #[test]
    fn playback_finished_drains_queue_to_idle_when_llm_complete() {
        let next = apply(
            Session::default(),
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("hi"),
                },
                SessionEvent::ServerAvatarIdle,
                SessionEvent::SystemPlaybackFinished,
            ],
        );
        assert_eq!(next.ai_state, AiState::Idle);
        assert!(next.playback_queue.is_empty());
        // Continuous conversation keeps the mic state untouched.
        assert_eq!(next.asr_state, AsrState::Idle);
    }

    #[test]
    fn playback_finished_with_llm_incomplete_stays_thinking_speaking() {
        let next = apply(
            Session::default(),
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("hi"),
                },
                SessionEvent::SystemPlaybackFinished,
            ],
        );
        assert!(next.playback_queue.is_empty());
        assert_eq!(next.ai_state, AiState::ThinkingSpeaking);
    }

    #[test]
    fn playback_finished_rearms_mic_in_non_continuous_conversation() {
        let session = Session {
            voice_input: VoiceInputMode::Conversation { continuous: false },
            ..Session::default()
        };
        let next = apply(
            session,
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("hi"),
                },
                SessionEvent::ServerAvatarIdle,
                SessionEvent::SystemPlaybackFinished,
            ],
        );
        assert_eq!(next.ai_state, AiState::Idle);
        assert_eq!(next.asr_state, AsrState::Listening);
    }

    #[test]
    fn playback_finished_with_multiple_queued_tasks_keeps_speaking() {
        let next = apply(
            Session::default(),
            &[
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("one"),
                },
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("two"),
                },
                SessionEvent::ServerAvatarIdle,
                SessionEvent::SystemPlaybackFinished,
            ],
        );
        assert_eq!(next.playback_queue.len(), 1);
        assert_eq!(next.ai_state, AiState::Speaking);
    }

    #[test]
    fn late_playback_finished_on_empty_queue_is_ignored() {
        let session = transition(&Session::default(), &SessionEvent::UserInterrupt);
        let next = transition(&session, &SessionEvent::SystemPlaybackFinished);
        assert_eq!(next, session);
    }

    #[test]
    fn set_voice_input_recomputes_mic_state() {
        // Switching to conversation mode while the AI is idle arms the mic.
        let next = transition(
            &manual_session(),
            &SessionEvent::SystemSetVoiceInput {
                mode: VoiceInputMode::Conversation { continuous: false },
            },
        );
        assert_eq!(next.asr_state, AsrState::Listening);

        // Non-continuous conversation while the AI talks stays muted.
        let talking = Session {
            ai_state: AiState::Speaking,
            playback_queue: vec![speak_task("hi")],
            ..Session::default()
        };
        let next = transition(
            &talking,
            &SessionEvent::SystemSetVoiceInput {
                mode: VoiceInputMode::Conversation { continuous: false },
            },
        );
        assert_eq!(next.asr_state, AsrState::Idle);

        // Continuous conversation is always armed.
        let next = transition(
            &talking,
            &SessionEvent::SystemSetVoiceInput {
                mode: VoiceInputMode::Conversation { continuous: true },
            },
        );
        assert_eq!(next.asr_state, AsrState::Listening);

        // Manual mode disarms.
        let next = transition(
            &Session::default(),
            &SessionEvent::SystemSetVoiceInput {
                mode: VoiceInputMode::Manual,
            },
        );
        assert_eq!(next.asr_state, AsrState::Idle);
        assert_eq!(next.voice_input, VoiceInputMode::Manual);
    }

    #[test]
    fn character_ready_marks_loaded_and_listens() {
        let next = apply(
            Session::default(),
            &[SessionEvent::ServerCharacterReady {
                character: character("miku"),
            }],
        );
        assert!(next.character_loaded);
        assert_eq!(next.asr_state, AsrState::Listening);
        assert_eq!(next.selected_character.unwrap().id, "miku");
    }

    #[test]
    fn connection_lifecycle() {
        let next = apply(Session::default(), &[SessionEvent::SystemConnect]);
        assert_eq!(next.connection_status, ConnectionStatus::Connecting);

        let next = apply(next, &[SessionEvent::ServerConnectSuccess]);
        assert_eq!(next.connection_status, ConnectionStatus::Connected);

        let next = apply(next, &[SessionEvent::ServerConnectError]);
        assert_eq!(next.connection_status, ConnectionStatus::Error);
    }

    #[test]
    fn disconnect_resets_to_initial_defaults() {
        let busy = apply(
            Session::default(),
            &[
                SessionEvent::SystemCharactersFetched {
                    characters: vec![character("miku")],
                },
                SessionEvent::UserSelectCharacter {
                    character_id: "miku".into(),
                },
                SessionEvent::SystemConnect,
                SessionEvent::ServerConnectSuccess,
                SessionEvent::ServerAvatarSpeak {
                    task: speak_task("hi"),
                },
            ],
        );

        let after_system = transition(&busy, &SessionEvent::SystemDisconnect);
        let after_server = transition(&busy, &SessionEvent::ServerDisconnected);
        assert_eq!(after_system, Session::default());
        assert_eq!(after_server, Session::default());
        // The catalog is part of the reset; it is fetched again per session.
        assert!(after_system.character_catalog.is_empty());
    }

    #[test]
    fn asr_partial_updates_transcript() {
        let next = apply(
            Session::default(),
            &[SessionEvent::ServerAsrPartial {
                text: "hel".into(),
            }],
        );
        assert_eq!(next.partial_transcript, "hel");
        assert_eq!(next.asr_state, AsrState::ListeningProcessing);
    }

    #[test]
    fn asr_final_appends_user_message() {
        let next = apply(
            Session::default(),
            &[
                SessionEvent::ServerAsrPartial {
                    text: "hell".into(),
                },
                SessionEvent::ServerAsrFinal {
                    text: "hello there".into(),
                },
            ],
        );
        assert_eq!(next.messages.len(), 1);
        assert_eq!(next.messages[0].author, Author::User);
        assert!(next.partial_transcript.is_empty());
        assert_eq!(next.ai_state, AiState::Thinking);
        assert_eq!(next.asr_state, AsrState::Listening);
        assert!(!next.is_llm_complete);
    }

    #[test]
    fn empty_asr_final_only_rearms_mic() {
        let conversation = apply(
            Session::default(),
            &[
                SessionEvent::ServerAsrPartial { text: "um".into() },
                SessionEvent::ServerAsrFinal { text: String::new() },
            ],
        );
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.asr_state, AsrState::Listening);

        let manual = apply(
            manual_session(),
            &[SessionEvent::ServerAsrFinal { text: String::new() }],
        );
        assert_eq!(manual.asr_state, AsrState::Idle);
    }

    #[test]
    fn continuous_conversation_scenario_keeps_mic_armed() {
        // Full reply cycle in continuous mode: mic stays hot throughout.
        let session = Session {
            asr_state: AsrState::Listening,
            ..Session::default()
        };
        let next = apply(
            session,
            &[SessionEvent::ServerAvatarSpeak {
                task: speak_task("hi"),
            }],
        );
        assert_eq!(next.ai_state, AiState::ThinkingSpeaking);
        assert_eq!(next.playback_queue.len(), 1);

        let next = apply(next, &[SessionEvent::ServerAvatarIdle]);
        assert_eq!(next.ai_state, AiState::Speaking);
        assert_eq!(next.playback_queue.len(), 1);

        let next = apply(next, &[SessionEvent::SystemPlaybackFinished]);
        assert_eq!(next.ai_state, AiState::Idle);
        assert_eq!(next.asr_state, AsrState::Listening);
    }
}
