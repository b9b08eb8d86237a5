//! A live engine connection: the child process plus the framed channel to it.
//!
//! Two tasks service the channel. The writer drains a command queue into the
//! socket; the reader routes responses to their pending requests by id,
//! answers engine-initiated requests, and reports when the engine goes away.
//! A connection whose channel ends on its own terminates the engine itself,
//! so a disconnected session never keeps a process alive.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use fcs_types::RootId;

use crate::channel::{ChannelReader, ChannelStream, ChannelWriter};
use crate::codec::{FrameReader, FrameWriter};
use crate::process::ChildGuard;
use crate::protocol::{self, Incoming, Request, RpcError};
use crate::types::{CloseReason, SessionEvent};

const WRITER_CHANNEL_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

/// Taken by whichever side ends the connection first.
type SharedChild = Arc<std::sync::Mutex<Option<ChildGuard>>>;

fn take_child(child: &SharedChild) -> Option<ChildGuard> {
    child.lock().unwrap_or_else(PoisonError::into_inner).take()
}

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

/// Timeouts a connection applies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionTimeouts {
    pub request: Duration,
    pub shutdown: Duration,
}

pub(crate) struct EngineConnection {
    root: RootId,
    child: SharedChild,
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: u64,
    pending: PendingMap,
    /// Cleared when the engine closes the channel or a write to it fails.
    connected: Arc<AtomicBool>,
    timeouts: ConnectionTimeouts,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl EngineConnection {
    pub fn start(
        root: RootId,
        stream: ChannelStream,
        child: ChildGuard,
        events: mpsc::Sender<SessionEvent>,
        timeouts: ConnectionTimeouts,
    ) -> Self {
        let ChannelStream { reader, writer } = stream;
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let child: SharedChild = Arc::new(std::sync::Mutex::new(Some(child)));

        let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(write_loop(root, writer, writer_rx, connected.clone()));
        let reader_handle = tokio::spawn(read_loop(
            ReaderContext {
                root,
                pending: pending.clone(),
                writer_tx: writer_tx.clone(),
                connected: connected.clone(),
                child: child.clone(),
                grace: timeouts.shutdown,
            },
            reader,
            events,
        ));

        Self {
            root,
            child,
            writer_tx,
            next_id: 1,
            pending,
            connected,
            timeouts,
            reader_handle,
            writer_handle,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send one request and wait for its response body.
    pub async fn request(
        &mut self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        if !self.is_connected() {
            return Err(RpcError::Closed);
        }
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request::new(id, method, params))?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(RpcError::Closed);
        }

        match tokio::time::timeout(self.timeouts.request, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                Err(RpcError::Closed)
            }
            Err(_) => {
                // Drop the entry so a late reply is ignored and the map doesn't grow.
                self.pending.lock().await.remove(&id);
                Err(RpcError::Timeout(self.timeouts.request))
            }
        }
    }

    /// Engine process id; `None` once the engine has been terminated.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(ChildGuard::id)
    }

    /// Stop servicing the channel and terminate the engine process tree.
    ///
    /// The reader is stopped first so a deliberate close is not reported as
    /// an unexpected disconnect.
    pub async fn shutdown(self) {
        self.reader_handle.abort();
        self.connected.store(false, Ordering::Release);
        let _ = self.writer_tx.try_send(WriterCommand::Shutdown);

        // `None` when the reader already terminated the engine after a disconnect.
        if let Some(child) = take_child(&self.child) {
            tracing::debug!(root = %self.root, pid = ?child.id(), "terminating engine");
            child.terminate(self.timeouts.shutdown).await;
        }

        self.writer_handle.abort();
        self.pending.lock().await.clear();
    }
}

async fn write_loop(
    root: RootId,
    writer: ChannelWriter,
    mut rx: mpsc::Receiver<WriterCommand>,
    connected: Arc<AtomicBool>,
) {
    let mut writer = FrameWriter::new(writer);
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Send(frame) => {
                if let Err(e) = writer.write_frame(&frame).await {
                    tracing::warn!(root = %root, "engine write error: {e:#}");
                    // Later requests fail fast instead of waiting out their timeout.
                    connected.store(false, Ordering::Release);
                    break;
                }
            }
            WriterCommand::Shutdown => break,
        }
    }
}

/// State the reader task shares with its connection.
struct ReaderContext {
    root: RootId,
    pending: PendingMap,
    writer_tx: mpsc::Sender<WriterCommand>,
    connected: Arc<AtomicBool>,
    child: SharedChild,
    grace: Duration,
}

async fn read_loop(
    ctx: ReaderContext,
    reader: ChannelReader,
    events: mpsc::Sender<SessionEvent>,
) {
    let ReaderContext {
        root,
        pending,
        writer_tx,
        connected,
        child,
        grace,
    } = ctx;
    let mut reader = FrameReader::new(reader);
    let reason = loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => dispatch_frame(root, &frame, &pending, &writer_tx).await,
            Ok(None) => {
                tracing::info!(root = %root, "engine closed the channel");
                break CloseReason::Exited;
            }
            Err(e) => {
                tracing::warn!(root = %root, "engine channel failed: {e:#}");
                break CloseReason::Failed(format!("{e:#}"));
            }
        }
    };

    // The engine is gone before the session can be seen as disconnected.
    if let Some(child) = take_child(&child) {
        tracing::debug!(root = %root, pid = ?child.id(), "terminating disconnected engine");
        child.terminate(grace).await;
    }
    connected.store(false, Ordering::Release);
    // Dropping the senders fails every in-flight request immediately.
    pending.lock().await.clear();
    let _ = events.send(SessionEvent::Closed { root, reason }).await;
}

async fn dispatch_frame(
    root: RootId,
    frame: &serde_json::Value,
    pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
    writer_tx: &mpsc::Sender<WriterCommand>,
) {
    let Some(incoming) = protocol::classify(frame) else {
        tracing::trace!(root = %root, "ignoring malformed JSON-RPC frame");
        return;
    };

    match incoming {
        Incoming::Response { id, body } => {
            let sender = pending.lock().await.remove(&id);
            match sender {
                Some(tx) => {
                    let _ = tx.send(body);
                }
                None => tracing::debug!(root = %root, id, "response for unknown request"),
            }
        }
        Incoming::EngineRequest { id, method } => {
            tracing::debug!(root = %root, "engine sent request {method}; replying method not found");
            let reply = protocol::method_not_found(id, &method);
            let _ = writer_tx.send(WriterCommand::Send(reply)).await;
        }
        Incoming::Notification { method, params } => match method.as_str() {
            "log" => {
                let text = params
                    .as_ref()
                    .and_then(|p| p.get(0).or(Some(p)))
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from))
                    .unwrap_or_default();
                tracing::info!(target: "fcs::engine", root = %root, "{text}");
            }
            _ => tracing::trace!(root = %root, "ignoring notification {method}"),
        },
    }
}
