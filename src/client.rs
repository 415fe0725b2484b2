//! The avatar client facade.
//!
//! `AvatarClient` wires the session store, transport, playback scheduler
//! and voice controller together and exposes the user-facing actions.
//! All components communicate only through the shared session state; the
//! facade's methods dispatch events and perform the matching side
//! effects (frame sends, connection management, playback interrupts).

use crate::catalog;
use crate::config::ClientConfig;
use crate::playback::{PlaybackScheduler, Presenter, SchedulerHandle};
use crate::state::{Character, Session, SessionEvent, SessionStore, VoiceInputMode};
use crate::transport::{ClientFrame, TransportClient, TransportHandle};
use crate::voice::{CaptureEvent, CaptureSource, VoiceInputController};
use crate::Result;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AvatarClient {
    config: ClientConfig,
    store: Arc<SessionStore>,
    transport_handle: TransportHandle,
    connection: Mutex<Option<TransportClient>>,
    scheduler_handle: SchedulerHandle,
    // Workers are held for their Drop impls, which stop the threads.
    _scheduler: PlaybackScheduler,
    _voice: VoiceInputController,
}

impl AvatarClient {
    /// Build a client around injected presentation and capture
    /// capabilities. Requires a running tokio runtime for the transport
    /// and catalog calls.
    pub fn new<C: CaptureSource>(
        config: ClientConfig,
        presenter: Arc<dyn Presenter>,
        capture: C,
        capture_rx: Receiver<CaptureEvent>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SessionStore::new());
        let transport_handle = TransportHandle::new();

        let (scheduler, scheduler_handle) = PlaybackScheduler::spawn(
            Arc::clone(&store),
            presenter,
            config.playback_sample_rate,
        );
        let voice = VoiceInputController::spawn(
            Arc::clone(&store),
            transport_handle.clone(),
            capture,
            capture_rx,
        );

        Ok(Self {
            config,
            store,
            transport_handle,
            connection: Mutex::new(None),
            scheduler_handle,
            _scheduler: scheduler,
            _voice: voice,
        })
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.store.snapshot()
    }

    /// Subscribe to session snapshots; one per dispatched event.
    pub fn subscribe(&self) -> Receiver<Session> {
        self.store.subscribe()
    }

    /// Fetch the character catalog and store it in the session.
    pub async fn fetch_characters(&self) -> Result<Vec<Character>> {
        let characters = catalog::fetch_characters(&self.config.http_url()).await?;
        self.store.dispatch(SessionEvent::SystemCharactersFetched {
            characters: characters.clone(),
        });
        Ok(characters)
    }

    /// Select a character from the catalog. A changed selection tears
    /// down any existing connection and opens a fresh one; an unknown id
    /// is a no-op.
    pub fn select_character(&self, character_id: &str) {
        let snapshot = self.store.dispatch(SessionEvent::UserSelectCharacter {
            character_id: character_id.to_string(),
        });
        // A rejected selection keeps any previous character; only a
        // selection that actually took effect replaces the connection.
        match snapshot.selected_character {
            Some(character) if character.id == character_id => {
                self.open_connection(&character.id);
            }
            _ => debug!(character_id, "character not in catalog, ignoring selection"),
        }
    }

    /// Disconnect and reset the session to its initial defaults.
    pub fn disconnect(&self) {
        self.teardown_connection();
        self.scheduler_handle.interrupt();
        self.store.dispatch(SessionEvent::SystemDisconnect);
        info!("session disconnected");
    }

    /// Send a chat message. Dropped while not connected.
    pub fn send_text(&self, text: &str) {
        if !self.transport_handle.is_connected() {
            debug!("dropping text message, not connected");
            return;
        }
        self.transport_handle.send(ClientFrame::UserText {
            text: text.to_string(),
        });
        self.store.dispatch(SessionEvent::UserSendText {
            text: text.to_string(),
        });
    }

    /// Begin push-to-talk recording.
    pub fn start_recording(&self) {
        self.store.dispatch(SessionEvent::UserStartRecording);
    }

    /// End push-to-talk recording.
    pub fn stop_recording(&self) {
        self.store.dispatch(SessionEvent::UserStopRecording);
    }

    /// Stop the AI immediately: cancel playback, clear the queue and tell
    /// the server to abandon the reply.
    pub fn interrupt(&self) {
        self.scheduler_handle.interrupt();
        self.transport_handle.send(ClientFrame::UserInterrupt {});
        self.store.dispatch(SessionEvent::UserInterrupt);
    }

    /// Switch voice input mode.
    pub fn set_voice_input(&self, mode: VoiceInputMode) {
        self.store.dispatch(SessionEvent::SystemSetVoiceInput { mode });
    }

    fn open_connection(&self, character_id: &str) {
        self.teardown_connection();
        self.store.dispatch(SessionEvent::SystemConnect);
        let client = TransportClient::connect(
            &self.config.ws_url(),
            character_id,
            Arc::clone(&self.store),
            self.transport_handle.clone(),
        );
        *self.connection.lock() = Some(client);
    }

    fn teardown_connection(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.disconnect();
        }
    }
}

impl Drop for AvatarClient {
    fn drop(&mut self) {
        self.teardown_connection();
        self.scheduler_handle.interrupt();
    }
}
