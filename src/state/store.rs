//! Serialized ownership of the session state.
//!
//! All four event producers (transport, voice controller, playback
//! scheduler, direct user calls) funnel through `SessionStore::dispatch`,
//! which applies the pure transition under a mutex and fans the resulting
//! snapshot out to subscribers. Subscribers react to snapshots on their
//! own threads, so a dispatch never re-enters the transition.

use crate::state::reducer::transition;
use crate::state::types::{Session, SessionEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

pub struct SessionStore {
    session: Mutex<Session>,
    subscribers: Mutex<Vec<Sender<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Session::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Apply one event and return the resulting snapshot.
    pub fn dispatch(&self, event: SessionEvent) -> Session {
        let snapshot = {
            let mut session = self.session.lock();
            debug!(?event, "dispatching session event");
            let next = transition(&session, &event);
            if !next.invariants_hold() {
                warn!(?event, "session invariant violated after transition");
            }
            *session = next;
            session.clone()
        };
        self.notify(&snapshot);
        snapshot
    }

    /// Current state without mutation.
    pub fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    /// Register a snapshot listener. Every dispatch delivers the new state
    /// to all live subscribers; dropped receivers are pruned lazily.
    pub fn subscribe(&self) -> Receiver<Session> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn notify(&self, snapshot: &Session) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{AiState, AsrState};

    #[test]
    fn dispatch_updates_snapshot() {
        let store = SessionStore::new();
        let next = store.dispatch(SessionEvent::UserSendText {
            text: "hi".into(),
        });
        assert_eq!(next.ai_state, AiState::Thinking);
        assert_eq!(store.snapshot(), next);
    }

    #[test]
    fn subscribers_see_every_snapshot() {
        let store = SessionStore::new();
        let rx = store.subscribe();

        store.dispatch(SessionEvent::UserStartRecording);
        store.dispatch(SessionEvent::UserInterrupt);

        let first = rx.recv().unwrap();
        assert_eq!(first.asr_state, AsrState::Listening);
        let second = rx.recv().unwrap();
        assert!(second.is_llm_complete);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let store = SessionStore::new();
        drop(store.subscribe());
        store.dispatch(SessionEvent::UserStartRecording);
        assert!(store.subscribers.lock().is_empty());
    }

    #[test]
    fn concurrent_dispatch_is_serialized() {
        use std::sync::Arc;

        let store = Arc::new(SessionStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    store.dispatch(SessionEvent::UserSendText {
                        text: "ping".into(),
                    });
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.snapshot().messages.len(), 400);
    }
}
