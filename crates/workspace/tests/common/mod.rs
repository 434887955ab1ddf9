//! Shared fixtures for multiplexer integration tests.
//!
//! Sessions are real loopback connections to [`FakeBackend`]s; the spawn
//! broker, front end and file browser record what they are asked to do.

// Not every test uses every helper
#![allow(dead_code)]

use parking_lot::Mutex;
use platform::InMemoryHotkeys;
use settings::ShortcutEntry;
use std::sync::Arc;
use std::time::Duration;
use tabterm_workspace::{
    Collaborators, FileBrowser, Frontend, Multiplexer, SpawnBroker, SpawnTicket, TabLabel,
};
use terminal::protocol::{read_frame, write_frame};
use terminal::{Frame, TermSize};
use tokio::net::{TcpListener, TcpStream};

/// Default timeout for async test operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to listen for frames that must not arrive
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

// ============================================================================
// Fake session backends
// ============================================================================

/// A listener standing in for a session backend process.
pub struct FakeBackend {
    listener: TcpListener,
}

impl FakeBackend {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub async fn accept(&self) -> BackendConn {
        let (stream, _) = tokio::time::timeout(DEFAULT_TIMEOUT, self.listener.accept())
            .await
            .expect("Timed out waiting for the multiplexer to connect")
            .expect("Accept failed");
        BackendConn { stream }
    }
}

/// The backend side of one session connection.
pub struct BackendConn {
    stream: TcpStream,
}

impl BackendConn {
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(DEFAULT_TIMEOUT, read_frame(&mut self.stream))
            .await
            .expect("Timed out waiting for a frame")
            .expect("Protocol error")
            .expect("Connection closed")
    }

    /// Next data frame, skipping resizes and cwd requests.
    pub async fn next_data(&mut self) -> Vec<u8> {
        loop {
            if let Frame::Data(bytes) = self.next_frame().await {
                return bytes;
            }
        }
    }

    /// Next resize frame, skipping everything else.
    pub async fn next_resize(&mut self) -> TermSize {
        loop {
            if let Frame::Resize { cols, rows } = self.next_frame().await {
                return TermSize { cols, rows };
            }
        }
    }

    /// Panics if a data frame arrives within [`QUIET_PERIOD`].
    pub async fn assert_no_data(&mut self) {
        let deadline = tokio::time::Instant::now() + QUIET_PERIOD;
        loop {
            match tokio::time::timeout_at(deadline, read_frame(&mut self.stream)).await {
                Err(_) => return,
                Ok(Ok(Some(Frame::Data(bytes)))) => {
                    panic!("Unexpected data: {:?}", String::from_utf8_lossy(&bytes))
                }
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) | Ok(Err(_)) => return,
            }
        }
    }

    pub async fn send(&mut self, frame: Frame) {
        write_frame(&mut self.stream, &frame)
            .await
            .expect("Failed to write frame");
    }

    /// Half-close the connection, as a backend whose shell exited does.
    pub async fn shutdown(&mut self) {
        use tokio::io::AsyncWriteExt;
        self.stream.shutdown().await.ok();
    }

    /// Simulate the backend exiting.
    pub fn close(self) {
        drop(self.stream);
    }
}

// ============================================================================
// Recording collaborators
// ============================================================================

#[derive(Debug, Default)]
pub struct FrontendLog {
    pub labels: [String; 5],
    pub shown: Vec<usize>,
    pub hidden: Vec<usize>,
    pub output: Vec<(usize, Vec<u8>)>,
    pub actions: Vec<String>,
    pub help_rows: Vec<(String, String)>,
    pub clipboard: Option<String>,
}

impl FrontendLog {
    pub fn visible(&self) -> Option<usize> {
        self.shown.last().copied()
    }
}

#[derive(Clone, Default)]
pub struct RecordingFrontend {
    pub log: Arc<Mutex<FrontendLog>>,
}

impl Frontend for RecordingFrontend {
    fn set_tab_label(&mut self, slot: usize, label: &TabLabel) {
        self.log.lock().labels[slot] = label.to_string();
    }

    fn show_slot(&mut self, slot: usize) {
        self.log.lock().shown.push(slot);
    }

    fn hide_slot(&mut self, slot: usize) {
        self.log.lock().hidden.push(slot);
    }

    fn session_output(&mut self, slot: usize, bytes: &[u8]) {
        self.log.lock().output.push((slot, bytes.to_vec()));
    }

    fn copy_selection(&mut self, slot: usize) {
        self.log.lock().actions.push(format!("copy {}", slot));
    }

    fn clipboard_text(&mut self) -> Option<String> {
        self.log.lock().clipboard.clone()
    }

    fn open_settings(&mut self) {
        self.log.lock().actions.push("settings".into());
    }

    fn show_shortcuts_help(&mut self, rows: &[(String, String)]) {
        let mut log = self.log.lock();
        log.actions.push("shortcuts".into());
        log.help_rows = rows.to_vec();
    }

    fn open_fuzzy_finder(&mut self) {
        self.log.lock().actions.push("fuzzy".into());
    }

    fn toggle_password_mode(&mut self) {
        self.log.lock().actions.push("passmode".into());
    }

    fn toggle_devtools(&mut self) {
        self.log.lock().actions.push("devtools".into());
    }

    fn reload(&mut self) {
        self.log.lock().actions.push("reload".into());
    }
}

#[derive(Clone, Default)]
pub struct RecordingFiles {
    pub follows: Arc<Mutex<Vec<(usize, Option<String>)>>>,
}

impl FileBrowser for RecordingFiles {
    fn follow_session(&mut self, slot: usize, cwd: Option<String>) {
        self.follows.lock().push((slot, cwd));
    }

    fn toggle_list_view(&mut self) {}

    fn toggle_hidden_dotfiles(&mut self) {}
}

/// Broker that parks tickets until the test answers them.
#[derive(Clone, Default)]
pub struct ParkingBroker {
    pub tickets: Arc<Mutex<Vec<SpawnTicket>>>,
}

impl ParkingBroker {
    pub fn take(&self) -> SpawnTicket {
        self.tickets.lock().pop().expect("No spawn request was made")
    }

    pub fn requests(&self) -> usize {
        self.tickets.lock().len()
    }
}

impl SpawnBroker for ParkingBroker {
    fn request_spawn(&mut self, ticket: SpawnTicket) {
        self.tickets.lock().push(ticket);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub mux: Multiplexer,
    pub primary: BackendConn,
    pub frontend: Arc<Mutex<FrontendLog>>,
    pub files: Arc<Mutex<Vec<(usize, Option<String>)>>>,
    pub broker: ParkingBroker,
    pub hotkeys: InMemoryHotkeys,
    // Keeps the primary listener open for the life of the test
    _primary_backend: FakeBackend,
}

impl Harness {
    pub async fn start(shortcuts: Vec<ShortcutEntry>) -> Self {
        Self::start_with(shortcuts, TermSize::default()).await
    }

    pub async fn start_with(shortcuts: Vec<ShortcutEntry>, viewport: TermSize) -> Self {
        let backend = FakeBackend::bind().await;
        let frontend = RecordingFrontend::default();
        let files = RecordingFiles::default();
        let broker = ParkingBroker::default();
        let hotkeys = InMemoryHotkeys::new();

        let mux = Multiplexer::new(
            backend.port(),
            viewport,
            shortcuts,
            Collaborators {
                broker: Box::new(broker.clone()),
                frontend: Box::new(frontend.clone()),
                files: Box::new(files.clone()),
                hotkeys: Box::new(hotkeys.clone()),
            },
        );
        let primary = backend.accept().await;

        Self {
            mux,
            primary,
            frontend: frontend.log,
            files: files.follows,
            broker,
            hotkeys,
            _primary_backend: backend,
        }
    }

    /// Drive the multiplexer until `condition` holds.
    pub async fn wait_for(&mut self, what: &str, condition: impl Fn(&Multiplexer) -> bool) {
        wait_for(&mut self.mux, what, condition).await;
    }

    /// Spawn a session into the empty `slot` and return its backend side,
    /// with the frames sent on focus already consumed.
    pub async fn bind_slot(&mut self, slot: usize) -> (FakeBackend, BackendConn) {
        self.mux.focus_or_create(slot);
        let backend = FakeBackend::bind().await;
        self.broker.take().succeed(backend.port());
        self.wait_for("slot to bind", |mux| mux.registry().is_bound(slot))
            .await;

        let mut conn = backend.accept().await;
        assert!(matches!(conn.next_frame().await, Frame::Resize { .. }));
        assert_eq!(conn.next_frame().await, Frame::RequestCwd);
        (backend, conn)
    }

    pub fn label(&self, slot: usize) -> String {
        self.frontend.lock().labels[slot].clone()
    }

    /// Let the multiplexer handle whatever arrives within [`QUIET_PERIOD`].
    pub async fn settle(&mut self) {
        let _ = tokio::time::timeout(QUIET_PERIOD, async {
            loop {
                if !self.mux.step().await {
                    break;
                }
            }
        })
        .await;
    }
}

pub async fn wait_for(mux: &mut Multiplexer, what: &str, condition: impl Fn(&Multiplexer) -> bool) {
    let result = tokio::time::timeout(DEFAULT_TIMEOUT, async {
        while !condition(mux) {
            if !mux.step().await {
                break;
            }
        }
    })
    .await;
    assert!(
        result.is_ok() && condition(mux),
        "Timed out waiting for {}",
        what
    );
}
