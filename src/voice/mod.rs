//! Voice input control.
//!
//! The controller derives a single "should capture" boolean from the ASR
//! state and keeps the capture capability matched to it, so the physical
//! microphone never drifts from what the session claims. Captured speech
//! is encoded and forwarded to the transport; speech onset while the AI
//! is talking becomes a barge-in interrupt in conversation mode.

use crate::audio;
use crate::state::{Session, SessionEvent, SessionStore};
use crate::transport::{ClientFrame, TransportHandle};
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Events emitted by the capture capability while it is running.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The VAD confirmed real speech onset.
    SpeechStarted,

    /// Speech ended; carries the captured mono float samples.
    SpeechEnded(Vec<f32>),
}

/// Push-to-talk/VAD capture capability. `start` and `pause` must be
/// idempotent; events arrive on the channel given to the controller.
pub trait CaptureSource: Send + 'static {
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
}

/// Worker that gates capture on session state and forwards speech.
pub struct VoiceInputController {
    worker: Option<JoinHandle<()>>,
    shutdown_tx: Sender<()>,
}

impl VoiceInputController {
    pub fn spawn<C: CaptureSource>(
        store: Arc<SessionStore>,
        transport: TransportHandle,
        capture: C,
        capture_rx: Receiver<CaptureEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = unbounded();
        let state_rx = store.subscribe();

        let worker = thread::spawn(move || {
            run_worker(store, transport, capture, capture_rx, state_rx, shutdown_rx);
        });

        Self {
            worker: Some(worker),
            shutdown_tx,
        }
    }
}

impl Drop for VoiceInputController {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker<C: CaptureSource>(
    store: Arc<SessionStore>,
    transport: TransportHandle,
    mut capture: C,
    capture_rx: Receiver<CaptureEvent>,
    state_rx: Receiver<Session>,
    shutdown_rx: Receiver<()>,
) {
    let mut session = store.snapshot();
    let mut capturing = false;

    info!("voice input controller started");
    sync_capture(&mut capture, &mut capturing, &session, &transport, &store);

    loop {
        crossbeam_channel::select! {
            recv(state_rx) -> snapshot => {
                session = match snapshot {
                    Ok(snapshot) => snapshot,
                    Err(_) => break,
                };
                sync_capture(&mut capture, &mut capturing, &session, &transport, &store);
            }
            recv(capture_rx) -> event => {
                let event = match event {
                    Ok(event) => event,
                    Err(_) => break,
                };
                handle_capture_event(event, &session, &transport, &store);
            }
            recv(shutdown_rx) -> _ => break,
        }
    }

    let _ = capture.pause();
    info!("voice input controller stopped");
}

/// Start or pause capture so the device matches the session's ASR state.
/// Pausing in manual mode while a transcript is pending also flushes the
/// deferred `user:audio_end`.
fn sync_capture<C: CaptureSource>(
    capture: &mut C,
    capturing: &mut bool,
    session: &Session,
    transport: &TransportHandle,
    store: &SessionStore,
) {
    let should_capture = session.asr_state.requires_capture();
    if should_capture == *capturing {
        return;
    }

    if should_capture {
        match capture.start() {
            Ok(()) => {
                *capturing = true;
                debug!("capture started");
            }
            Err(e) => warn!("failed to start capture: {}", e),
        }
    } else {
        match capture.pause() {
            Ok(()) => {
                *capturing = false;
                debug!("capture paused");
            }
            Err(e) => warn!("failed to pause capture: {}", e),
        }
        if session.voice_input == crate::state::VoiceInputMode::Manual
            && session.asr_state == crate::state::AsrState::Processing
        {
            transport.send(ClientFrame::UserAudioEnd {});
            store.dispatch(SessionEvent::UserAudioEndSent);
        }
    }
}

fn handle_capture_event(
    event: CaptureEvent,
    session: &Session,
    transport: &TransportHandle,
    store: &SessionStore,
) {
    match event {
        CaptureEvent::SpeechStarted => {
            // Barge-in: speaking over the AI interrupts it, but only in
            // conversation mode.
            if session.voice_input.is_conversation() && session.ai_state.is_busy() {
                info!("speech onset while AI busy, interrupting");
                store.dispatch(SessionEvent::UserInterrupt);
                transport.send(ClientFrame::UserInterrupt {});
            }
        }
        CaptureEvent::SpeechEnded(samples) => {
            if samples.is_empty() {
                debug!("discarding empty speech segment");
                return;
            }
            let data = audio::encode_capture_chunk(&samples);
            transport.send(ClientFrame::UserAudioChunk { data });
            store.dispatch(SessionEvent::UserAudioChunkSent);

            // Conversation mode ends the utterance immediately; manual
            // mode waits for the explicit stop-recording action.
            if session.voice_input.is_conversation() {
                transport.send(ClientFrame::UserAudioEnd {});
                store.dispatch(SessionEvent::UserAudioEndSent);
            }
        }
    }
}
