//! Client side of a session transport.

use crate::protocol::{read_frame, write_frame, Frame};
use crate::types::TermSize;
use settings::constants::session::{CONNECT_TIMEOUT, HOST, LINE_TERMINATOR};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use util::debug_panic;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one [`SessionHandle`], unique for the life of the process.
///
/// Events carry it so a slot can tell a late event from a handle it already
/// disposed apart from one for its current handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Notification from a session handle's transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Output(Vec<u8>),
    ProcessName(String),
    Cwd(String),
    /// The backend exited or the connection dropped. Sent at most once,
    /// and never after [`SessionHandle::dispose`].
    Closed,
}

/// Connection to one session backend, bound to one slot.
pub struct SessionHandle {
    id: HandleId,
    slot: usize,
    port: u16,
    outgoing: mpsc::UnboundedSender<Frame>,
    task: JoinHandle<()>,
    focused: bool,
    disposed: bool,
}

impl SessionHandle {
    /// Start connecting to `127.0.0.1:<port>`.
    ///
    /// Returns immediately; writes issued before the connection is up are
    /// queued. A failed connect is reported as [`SessionEvent::Closed`].
    /// Must be called from within a tokio runtime.
    pub fn open<F>(slot: usize, port: u16, on_event: F) -> Self
    where
        F: Fn(HandleId, SessionEvent) + Send + 'static,
    {
        let id = HandleId::next();
        let (outgoing, queued) = mpsc::unbounded_channel();
        let task = tokio::spawn(transport(id, slot, port, queued, on_event));
        tracing::debug!(slot, port, handle = %id, "Opening session handle");
        Self {
            id,
            slot,
            port,
            outgoing,
            task,
            focused: false,
            disposed: false,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send raw text to the remote PTY.
    pub fn write(&self, text: &str) {
        self.send("write", Frame::Data(text.as_bytes().to_vec()));
    }

    /// Send text followed by the line terminator.
    pub fn write_line(&self, text: &str) {
        self.send(
            "write_line",
            Frame::Data(format!("{text}{LINE_TERMINATOR}").into_bytes()),
        );
    }

    pub fn resize(&self, size: TermSize) {
        self.send(
            "resize",
            Frame::Resize {
                cols: size.cols,
                rows: size.rows,
            },
        );
    }

    /// Ask the backend to report its working directory again.
    pub fn resend_working_directory(&self) {
        self.send("resend_working_directory", Frame::RequestCwd);
    }

    /// Mark this handle as the one receiving keyboard input.
    pub fn focus(&mut self) {
        if self.check_disposed("focus") {
            return;
        }
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Close the connection. No events are delivered afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.focused = false;
        self.task.abort();
        tracing::debug!(slot = self.slot, handle = %self.id, "Session handle disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn check_disposed(&self, op: &str) -> bool {
        if self.disposed {
            debug_panic!(
                "{} on session handle {} for slot {} after dispose",
                op,
                self.id,
                self.slot
            );
        }
        self.disposed
    }

    fn send(&self, op: &str, frame: Frame) {
        if self.check_disposed(op) {
            return;
        }
        if self.outgoing.send(frame).is_err() {
            tracing::debug!(slot = self.slot, handle = %self.id, op, "Transport already closed, dropping frame");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn transport<F>(
    id: HandleId,
    slot: usize,
    port: u16,
    mut queued: mpsc::UnboundedReceiver<Frame>,
    on_event: F,
) where
    F: Fn(HandleId, SessionEvent) + Send + 'static,
{
    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((HOST, port))).await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(slot, port, "Failed to connect to session backend: {}", e);
            on_event(id, SessionEvent::Closed);
            return;
        }
        Err(_) => {
            tracing::warn!(slot, port, "Timed out connecting to session backend");
            on_event(id, SessionEvent::Closed);
            return;
        }
    };
    stream.set_nodelay(true).ok();
    tracing::info!(slot, port, "Connected to session backend");

    let (mut reader, mut writer) = stream.into_split();

    // Frames from the backend are read on their own task: read_frame is not
    // cancel safe and must not sit in a select! arm.
    let (incoming_tx, mut incoming) = mpsc::unbounded_channel();
    let read_task = tokio::spawn(async move {
        loop {
            let result = read_frame(&mut reader).await;
            let done = !matches!(result, Ok(Some(_)));
            if incoming_tx.send(result).is_err() || done {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = queued.recv() => {
                let Some(frame) = frame else {
                    // Handle dropped
                    break;
                };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    tracing::info!(slot, port, "Session write failed: {}", e);
                    break;
                }
            }
            result = incoming.recv() => {
                match result {
                    Some(Ok(Some(frame))) => match frame {
                        Frame::Data(bytes) => on_event(id, SessionEvent::Output(bytes)),
                        Frame::ProcessName(name) => on_event(id, SessionEvent::ProcessName(name)),
                        Frame::Cwd(cwd) => on_event(id, SessionEvent::Cwd(cwd)),
                        other => tracing::debug!(slot, ?other, "Ignoring frame not meant for a client"),
                    },
                    Some(Ok(None)) | None => {
                        tracing::info!(slot, port, "Session backend closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(slot, port, "Session protocol error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    read_task.abort();
    on_event(id, SessionEvent::Closed);
}
