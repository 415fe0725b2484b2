//! Playback scheduling.
//!
//! The scheduler drains the session's playback queue strictly in order,
//! one task in flight at a time. Each in-flight task is tagged with a
//! generation number; an interrupt bumps the generation and cancels the
//! running audio, so a completion arriving from a superseded task is
//! recognized and dropped instead of popping the wrong queue head.

use crate::audio;
use crate::state::{Session, SessionEvent, SessionStore};
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Motion priority applied to a task's leading motion directive.
const MOTION_PRIORITY: u32 = 2;

/// Cooperative cancellation flag polled by `Presenter::play_audio`.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Presentation capability consumed by the scheduler: the avatar renderer
/// plus audio output, injected at construction time.
pub trait Presenter: Send + Sync + 'static {
    fn set_expression(&self, name: &str);

    fn start_motion(&self, group: &str, index: u32, priority: u32);

    /// Play a complete WAV payload, blocking until the audio finishes or
    /// `cancel` fires. Implementations must poll the token.
    fn play_audio(&self, wav: Vec<u8>, cancel: &CancelToken) -> Result<()>;
}

/// Handle for interrupting playback from any thread.
#[derive(Clone)]
pub struct SchedulerHandle {
    generation: Arc<AtomicU64>,
    current_cancel: Arc<Mutex<Option<CancelToken>>>,
}

impl SchedulerHandle {
    /// Stop any in-flight audio and invalidate its completion. Returns
    /// once no task of the old generation can reach the state machine.
    pub fn interrupt(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.current_cancel.lock().take() {
            token.cancel();
            info!("playback interrupted");
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Worker that reacts to session snapshots and plays queued tasks.
pub struct PlaybackScheduler {
    worker: Option<JoinHandle<()>>,
    shutdown_tx: Sender<()>,
}

impl PlaybackScheduler {
    /// Spawn the scheduler worker. `playback_sample_rate` is assumed for
    /// bare PCM payloads when wrapping them as WAV.
    pub fn spawn(
        store: Arc<SessionStore>,
        presenter: Arc<dyn Presenter>,
        playback_sample_rate: u32,
    ) -> (Self, SchedulerHandle) {
        let handle = SchedulerHandle {
            generation: Arc::new(AtomicU64::new(0)),
            current_cancel: Arc::new(Mutex::new(None)),
        };

        let (shutdown_tx, shutdown_rx) = unbounded();
        let state_rx = store.subscribe();
        let worker_handle = handle.clone();

        let worker = thread::spawn(move || {
            run_worker(
                store,
                presenter,
                worker_handle,
                state_rx,
                shutdown_rx,
                playback_sample_rate,
            );
        });

        (
            Self {
                worker: Some(worker),
                shutdown_tx,
            },
            handle,
        )
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(
    store: Arc<SessionStore>,
    presenter: Arc<dyn Presenter>,
    handle: SchedulerHandle,
    state_rx: Receiver<Session>,
    shutdown_rx: Receiver<()>,
    playback_sample_rate: u32,
) {
    let (done_tx, done_rx) = unbounded::<u64>();
    let mut in_flight = false;

    info!("playback scheduler started");
    loop {
        crossbeam_channel::select! {
            recv(state_rx) -> snapshot => {
                let snapshot = match snapshot {
                    Ok(snapshot) => snapshot,
                    Err(_) => break,
                };

                // Safety rule: state and playback must never disagree
                // about whether the AI is speaking.
                if in_flight && !snapshot.ai_state.is_speaking() {
                    handle.interrupt();
                    in_flight = false;
                }

                if !in_flight && !snapshot.playback_queue.is_empty() {
                    in_flight = true;
                    let head = snapshot.playback_queue[0].clone();
                    start_task(&head, &presenter, &handle, &done_tx, playback_sample_rate);
                }
            }
            recv(done_rx) -> generation => {
                let generation = match generation {
                    Ok(generation) => generation,
                    Err(_) => break,
                };
                // A stale completion belongs to a task the interrupt
                // already accounted for; the bookkeeping here describes
                // whatever task replaced it and must stay untouched.
                if generation != handle.current_generation() {
                    debug!(generation, "ignoring completion from superseded task");
                    continue;
                }
                in_flight = false;
                handle.current_cancel.lock().take();
                store.dispatch(SessionEvent::SystemPlaybackFinished);
            }
            recv(shutdown_rx) -> _ => break,
        }
    }
    handle.interrupt();
    info!("playback scheduler stopped");
}

fn start_task(
    task: &crate::state::PlaybackTask,
    presenter: &Arc<dyn Presenter>,
    handle: &SchedulerHandle,
    done_tx: &Sender<u64>,
    playback_sample_rate: u32,
) {
    let generation = handle.current_generation();
    debug!(generation, text = %task.text, "starting playback task");

    if let Some(expression) = task.expressions.first() {
        presenter.set_expression(&expression.name);
    }
    if let Some(motion) = task.motions.first() {
        presenter.start_motion(&motion.group, motion.index, MOTION_PRIORITY);
    }

    if task.audio.is_empty() {
        // Text-only task, nothing to play.
        let _ = done_tx.send(generation);
        return;
    }

    let wav = match audio::decode_audio_payload(&task.audio)
        .and_then(|bytes| audio::ensure_wav(bytes, playback_sample_rate))
    {
        Ok(wav) => wav,
        Err(e) => {
            // Decode faults count as completed for sequencing so the
            // queue always drains.
            warn!("audio decode failed: {}", e);
            let _ = done_tx.send(generation);
            return;
        }
    };

    let cancel = CancelToken::new();
    *handle.current_cancel.lock() = Some(cancel.clone());

    let presenter = Arc::clone(presenter);
    let done_tx = done_tx.clone();
    thread::spawn(move || {
        if let Err(e) = presenter.play_audio(wav, &cancel) {
            warn!("audio playback failed: {}", e);
        }
        let _ = done_tx.send(generation);
    });
}
