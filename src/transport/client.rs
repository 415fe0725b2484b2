//! Websocket transport.
//!
//! One `TransportClient` owns one connection for the lifetime of a
//! character session. Inbound frames become exactly one session event
//! each; outbound frames are serialized from `ClientFrame`. Sending while
//! disconnected is a silent drop, and a locally requested close does not
//! produce a `ServerDisconnected` event.

use crate::state::{SessionEvent, SessionStore};
use crate::transport::frames::{ClientFrame, ServerFrame};
use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stable outbound endpoint handed to the voice controller and the
/// facade. It survives connection replacement: each new connection binds
/// a fresh channel into the same handle.
#[derive(Clone, Default)]
pub struct TransportHandle {
    inner: Arc<HandleInner>,
}

#[derive(Default)]
struct HandleInner {
    frame_tx: Mutex<Option<UnboundedSender<ClientFrame>>>,
    connected: AtomicBool,
}

impl TransportHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for sending. A no-op while the connection is not
    /// open; callers gate user-visible behavior on `connection_status`.
    pub fn send(&self, frame: ClientFrame) {
        if !self.inner.connected.load(Ordering::SeqCst) {
            debug!(?frame, "dropping frame, transport not connected");
            return;
        }
        if let Some(tx) = &*self.inner.frame_tx.lock() {
            if tx.send(frame).is_err() {
                debug!("dropping frame, transport task gone");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn bind(&self, tx: UnboundedSender<ClientFrame>) {
        *self.inner.frame_tx.lock() = Some(tx);
        self.inner.connected.store(true, Ordering::SeqCst);
    }

    fn unbind(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        *self.inner.frame_tx.lock() = None;
    }

    /// Bind a raw channel so outbound frames can be observed without a
    /// live websocket.
    #[cfg(test)]
    pub(crate) fn bind_for_test(&self) -> UnboundedReceiver<ClientFrame> {
        let (tx, rx) = unbounded_channel();
        self.bind(tx);
        rx
    }
}

/// A single websocket connection, driven by a background tokio task.
pub struct TransportClient {
    handle: TransportHandle,
    closing: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl TransportClient {
    /// Open a connection for `character_id` and start the frame pump.
    /// Must be called within a tokio runtime.
    pub fn connect(
        ws_base_url: &str,
        character_id: &str,
        store: Arc<SessionStore>,
        handle: TransportHandle,
    ) -> Self {
        let closing = Arc::new(AtomicBool::new(false));
        let url = format!("{}/ws/{}", ws_base_url, Uuid::new_v4());
        let character_id = character_id.to_string();

        let task = tokio::spawn(run_connection(
            url,
            character_id,
            store,
            handle.clone(),
            Arc::clone(&closing),
        ));

        Self {
            handle,
            closing,
            task,
        }
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// Tear the connection down without surfacing a disconnect event.
    pub fn disconnect(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.handle.unbind();
        self.task.abort();
        info!("transport closed locally");
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        self.handle.unbind();
        self.task.abort();
    }
}

async fn run_connection(
    url: String,
    character_id: String,
    store: Arc<SessionStore>,
    handle: TransportHandle,
    closing: Arc<AtomicBool>,
) {
    info!(%url, "connecting");
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            error!("websocket connect failed: {}", e);
            if !closing.load(Ordering::SeqCst) {
                store.dispatch(SessionEvent::ServerConnectError);
            }
            return;
        }
    };

    let (frame_tx, frame_rx) = unbounded_channel();
    handle.bind(frame_tx);
    store.dispatch(SessionEvent::ServerConnectSuccess);
    info!("websocket connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // The session handshake goes out before anything else.
    if let Err(e) = send_frame(&mut ws_tx, &ClientFrame::SessionStart { character_id }).await {
        error!("failed to start session: {}", e);
        handle.unbind();
        if !closing.load(Ordering::SeqCst) {
            store.dispatch(SessionEvent::ServerDisconnected);
        }
        return;
    }

    let mut frame_rx: UnboundedReceiver<ClientFrame> = frame_rx;
    loop {
        tokio::select! {
            outbound = frame_rx.recv() => {
                let frame = match outbound {
                    Some(frame) => frame,
                    None => break,
                };
                if let Err(e) = send_frame(&mut ws_tx, &frame).await {
                    error!("websocket send failed: {}", e);
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => handle_frame(&text, &store),
                    Some(Ok(Message::Close(_))) => {
                        info!("websocket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                    Some(Err(e)) => {
                        error!("websocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handle.unbind();
    if !closing.load(Ordering::SeqCst) {
        store.dispatch(SessionEvent::ServerDisconnected);
    }
}

async fn send_frame<S>(ws_tx: &mut S, frame: &ClientFrame) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    ws_tx
        .send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

/// Translate one inbound frame into one session event. Unknown or
/// malformed frames are logged and dropped, never fatal.
fn handle_frame(text: &str, store: &SessionStore) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("dropping unrecognized frame: {}", e);
            return;
        }
    };

    let event = match frame {
        ServerFrame::SessionReady {
            character,
            live2d_model_info,
        } => SessionEvent::ServerCharacterReady {
            character: character.into_character(live2d_model_info),
        },
        ServerFrame::AvatarSpeak(task) => SessionEvent::ServerAvatarSpeak { task },
        ServerFrame::AvatarIdle {} => SessionEvent::ServerAvatarIdle,
        ServerFrame::AsrPartial { text } => SessionEvent::ServerAsrPartial { text },
        ServerFrame::AsrFinal { text } => SessionEvent::ServerAsrFinal { text },
    };
    store.dispatch(event);
}
