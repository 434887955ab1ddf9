//! The multiplexer event loop.

use crate::collaborators::{FileBrowser, Frontend};
use crate::shortcuts::{Binding, ShortcutDispatcher};
use crate::spawn::{PendingSpawns, SpawnBroker, SpawnRequestId, SpawnTicket};
use crate::tab_registry::TabRegistry;
use actions::AppAction;
use platform::HotkeyRegistry;
use settings::constants::slots::{COUNT, PRIMARY};
use settings::ShortcutEntry;
use terminal::{HandleId, SessionEvent, SessionHandle, SpawnReply, TermSize};
use tokio::sync::mpsc;
use util::ResultExt;

/// Everything the multiplexer reacts to.
#[derive(Debug)]
pub enum MuxEvent {
    /// Focus a slot, spawning a session for it when empty.
    FocusOrCreate(usize),
    NextTab,
    PreviousTab,
    /// Run an app action by name, as a shortcut entry would.
    AppAction(String),
    /// A global hotkey fired.
    HotkeyFired { generation: u64, trigger: String },
    /// Type a line into the focused session.
    TypeLine(String),
    SpawnReply { id: SpawnRequestId, reply: String },
    Session {
        slot: usize,
        handle: HandleId,
        event: SessionEvent,
    },
    /// The application window gained (`true`) or lost keyboard focus.
    WindowFocus(bool),
    Resize(TermSize),
    /// The shortcut table was saved.
    ShortcutsChanged(Vec<ShortcutEntry>),
    Quit,
}

/// Posts events to a [`Multiplexer`] from any thread.
#[derive(Debug, Clone)]
pub struct MuxClient {
    tx: mpsc::UnboundedSender<MuxEvent>,
}

impl MuxClient {
    /// A client and the receiving end it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MuxEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the multiplexer is gone.
    pub fn send(&self, event: MuxEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Collaborators the multiplexer drives.
pub struct Collaborators {
    pub broker: Box<dyn SpawnBroker>,
    pub frontend: Box<dyn Frontend>,
    pub files: Box<dyn FileBrowser>,
    pub hotkeys: Box<dyn HotkeyRegistry>,
}

/// Result of [`Multiplexer::focus_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    Focused,
    AlreadyFocused,
    /// A spawn request was sent; the slot is focused once it binds.
    Spawning,
    Ignored,
}

pub struct Multiplexer {
    registry: TabRegistry,
    pending: PendingSpawns,
    dispatcher: ShortcutDispatcher,
    broker: Box<dyn SpawnBroker>,
    frontend: Box<dyn Frontend>,
    files: Box<dyn FileBrowser>,
    viewport: TermSize,
    window_focused: bool,
    running: bool,
    client: MuxClient,
    events: mpsc::UnboundedReceiver<MuxEvent>,
}

impl Multiplexer {
    /// Connect the primary session on `primary_port` and register shortcuts.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        primary_port: u16,
        viewport: TermSize,
        shortcuts: Vec<ShortcutEntry>,
        collaborators: Collaborators,
    ) -> Self {
        let (client, events) = MuxClient::channel();
        let primary = open_handle(&client, PRIMARY, primary_port);

        let fire_client = client.clone();
        let dispatcher =
            ShortcutDispatcher::new(shortcuts, collaborators.hotkeys, move |generation, trigger| {
                fire_client.send(MuxEvent::HotkeyFired {
                    generation,
                    trigger: trigger.to_string(),
                });
            });

        let mut mux = Self {
            registry: TabRegistry::new(primary_port, primary),
            pending: PendingSpawns::default(),
            dispatcher,
            broker: collaborators.broker,
            frontend: collaborators.frontend,
            files: collaborators.files,
            viewport,
            window_focused: true,
            running: true,
            client,
            events,
        };

        for slot in 0..COUNT {
            mux.relabel(slot);
        }
        mux.present(PRIMARY, None);
        mux.dispatcher.rebuild();
        tracing::info!(port = primary_port, "Multiplexer started");
        mux
    }

    pub fn client(&self) -> MuxClient {
        self.client.clone()
    }

    pub fn registry(&self) -> &TabRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &ShortcutDispatcher {
        &self.dispatcher
    }

    pub fn focused(&self) -> usize {
        self.registry.focused()
    }

    pub fn viewport(&self) -> TermSize {
        self.viewport
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending_spawns(&self) -> usize {
        self.pending.len()
    }

    /// Process events until the primary session closes or `Quit` arrives.
    pub async fn run(mut self) {
        while self.running {
            if !self.step().await {
                break;
            }
        }
        tracing::info!("Multiplexer stopped");
    }

    /// Wait for and handle one event. Returns false if the channel closed.
    pub async fn step(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Handle every event already queued. Returns how many were handled.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: MuxEvent) {
        match event {
            MuxEvent::FocusOrCreate(slot) => {
                self.focus_or_create(slot);
            }
            MuxEvent::NextTab => self.next_tab(),
            MuxEvent::PreviousTab => self.previous_tab(),
            MuxEvent::AppAction(name) => {
                self.use_app_shortcut(&name);
            }
            MuxEvent::HotkeyFired {
                generation,
                trigger,
            } => {
                self.fire(generation, &trigger);
            }
            MuxEvent::TypeLine(text) => self.type_line(&text),
            MuxEvent::SpawnReply { id, reply } => self.handle_spawn_reply(id, &reply),
            MuxEvent::Session {
                slot,
                handle,
                event,
            } => self.on_session_event(slot, handle, event),
            MuxEvent::WindowFocus(focused) => self.on_window_focus(focused),
            MuxEvent::Resize(size) => self.resize(size),
            MuxEvent::ShortcutsChanged(entries) => self.reload_shortcuts(entries),
            MuxEvent::Quit => {
                tracing::info!("Quit requested");
                self.running = false;
            }
        }
    }

    /// Focus `slot`, or start a session for it when it is empty.
    pub fn focus_or_create(&mut self, slot: usize) -> FocusOutcome {
        if slot >= COUNT {
            tracing::debug!(slot, "Ignoring focus request for nonexistent slot");
            return FocusOutcome::Ignored;
        }
        if slot == self.registry.focused() {
            return FocusOutcome::AlreadyFocused;
        }
        if self.registry.is_bound(slot) {
            let previous = self.registry.set_focus(slot).log_err();
            self.present(slot, previous);
            return FocusOutcome::Focused;
        }
        if self.registry.is_spawning(slot) {
            tracing::debug!(slot, "Spawn already in flight");
            return FocusOutcome::Ignored;
        }

        let id = SpawnRequestId::new();
        if self.registry.begin_spawn(slot, id).log_err().is_none() {
            return FocusOutcome::Ignored;
        }
        self.pending.insert(id, slot);
        self.relabel(slot);
        tracing::info!(slot, request = %id, "Requesting session spawn");
        self.broker
            .request_spawn(SpawnTicket::new(id, self.client.clone()));
        FocusOutcome::Spawning
    }

    pub fn handle_spawn_reply(&mut self, id: SpawnRequestId, reply: &str) {
        let Some(slot) = self.pending.take(id) else {
            tracing::warn!(request = %id, reply, "Ignoring reply for unknown or already answered spawn request");
            return;
        };

        match SpawnReply::parse(reply) {
            SpawnReply::Success { port } => {
                let handle = open_handle(&self.client, slot, port);
                if self.registry.bind(slot, id, port, handle).log_err().is_none() {
                    return;
                }
                tracing::info!(slot, port, "Session bound");
                self.relabel(slot);
                self.focus_or_create(slot);
            }
            SpawnReply::Failure { details } => {
                tracing::warn!(slot, details = %details, "Session spawn failed");
                self.registry.fail_spawn(slot, id).log_err();
                self.relabel(slot);
            }
        }
    }

    /// A session's transport closed. Frees the slot; the primary session
    /// closing ends the multiplexer instead.
    pub fn on_handle_closed(&mut self, slot: usize, handle: HandleId) {
        if slot == PRIMARY {
            if self.registry.session_for(PRIMARY, handle).is_some() {
                tracing::info!("Primary session closed, shutting down");
                self.running = false;
            }
            return;
        }

        let Some(released) = self.registry.release(slot, handle).log_err() else {
            return;
        };
        let mut closed = released.handle;
        closed.dispose();
        tracing::info!(slot, "Session closed");

        self.relabel(slot);
        self.frontend.hide_slot(slot);
        if let Some(target) = released.refocused {
            self.present(target, None);
        }
    }

    pub fn next_tab(&mut self) {
        let target = self.registry.next();
        self.focus_or_create(target);
    }

    pub fn previous_tab(&mut self) {
        let target = self.registry.previous();
        self.focus_or_create(target);
    }

    /// Run the app action called `name`. Unknown names warn and return false.
    pub fn use_app_shortcut(&mut self, name: &str) -> bool {
        match name.parse::<AppAction>() {
            Ok(action) => self.run_app_action(action),
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    pub fn run_app_action(&mut self, action: AppAction) -> bool {
        tracing::debug!(%action, "App action");
        let focused = self.registry.focused();
        match action {
            AppAction::Copy => self.frontend.copy_selection(focused),
            AppAction::Paste => {
                if let Some(text) = self.frontend.clipboard_text() {
                    if let Some(session) = self.registry.focused_session() {
                        session.handle.write(&text);
                    }
                }
            }
            AppAction::NextTab => self.next_tab(),
            AppAction::PreviousTab => self.previous_tab(),
            AppAction::Tab(slot) => {
                self.focus_or_create(slot);
            }
            AppAction::Settings => self.frontend.open_settings(),
            AppAction::Shortcuts => {
                let rows = self.dispatcher.help();
                self.frontend.show_shortcuts_help(&rows);
            }
            AppAction::FuzzySearch => self.frontend.open_fuzzy_finder(),
            AppAction::FsListView => self.files.toggle_list_view(),
            AppAction::FsDotfiles => self.files.toggle_hidden_dotfiles(),
            AppAction::KbPassmode => self.frontend.toggle_password_mode(),
            AppAction::DevDebug => self.frontend.toggle_devtools(),
            AppAction::DevReload => {
                self.frontend.reload();
                // Resync the file browser without restarting the shell.
                if let Some(session) = self.registry.focused_session() {
                    session.handle.resend_working_directory();
                }
            }
        }
        true
    }

    /// Run a binding. Returns false for unknown app actions and when there
    /// is no session to type into.
    pub fn dispatch(&mut self, binding: &Binding) -> bool {
        match binding {
            Binding::App(action) => self.run_app_action(*action),
            Binding::UnknownApp(name) => {
                tracing::warn!("Unknown \"{}\" app shortcut action", name);
                false
            }
            Binding::Shell { text, linebreak } => {
                let Some(session) = self.registry.focused_session() else {
                    return false;
                };
                if *linebreak {
                    session.handle.write_line(text);
                } else {
                    session.handle.write(text);
                }
                true
            }
        }
    }

    /// A registered hotkey fired under `generation`.
    pub fn fire(&mut self, generation: u64, trigger: &str) -> bool {
        let Some(binding) = self.dispatcher.resolve(generation, trigger).cloned() else {
            return false;
        };
        tracing::debug!(trigger, ?binding, "Shortcut fired");
        self.dispatch(&binding)
    }

    /// Register shortcuts while the window has focus, clear them otherwise.
    pub fn on_window_focus(&mut self, focused: bool) {
        self.window_focused = focused;
        if focused {
            self.dispatcher.rebuild();
        } else {
            self.dispatcher.clear();
        }
    }

    /// The window was resized. Only the focused session follows; others
    /// resize when they are next focused.
    pub fn resize(&mut self, size: TermSize) {
        self.viewport = size;
        if let Some(session) = self.registry.focused_session() {
            session.handle.resize(size);
        }
    }

    pub fn reload_shortcuts(&mut self, entries: Vec<ShortcutEntry>) {
        tracing::info!(count = entries.len(), "Reloading shortcuts");
        self.dispatcher.set_entries(entries);
        if self.window_focused {
            self.dispatcher.rebuild();
        }
    }

    pub fn type_line(&mut self, text: &str) {
        if let Some(session) = self.registry.focused_session() {
            session.handle.write_line(text);
        }
    }

    fn on_session_event(&mut self, slot: usize, handle: HandleId, event: SessionEvent) {
        if let SessionEvent::Closed = event {
            self.on_handle_closed(slot, handle);
            return;
        }

        let focused = self.registry.focused() == slot;
        let Some(session) = self.registry.session_for(slot, handle) else {
            tracing::debug!(slot, %handle, "Dropping event from a released session");
            return;
        };

        match event {
            SessionEvent::Output(bytes) => self.frontend.session_output(slot, &bytes),
            SessionEvent::ProcessName(name) => {
                if session.process.as_deref() != Some(name.as_str()) {
                    session.process = Some(name);
                    self.relabel(slot);
                }
            }
            SessionEvent::Cwd(cwd) => {
                session.cwd = Some(cwd.clone());
                if focused {
                    self.files.follow_session(slot, Some(cwd));
                }
            }
            SessionEvent::Closed => {}
        }
    }

    /// Show `slot` as the focused view. `previous` is hidden when given.
    fn present(&mut self, slot: usize, previous: Option<usize>) {
        if let Some(previous) = previous.filter(|&p| p != slot) {
            if let Some(session) = self.registry.session_mut(previous) {
                session.handle.blur();
            }
            self.frontend.hide_slot(previous);
        }
        self.frontend.show_slot(slot);

        let viewport = self.viewport;
        let Some(session) = self.registry.session_mut(slot) else {
            return;
        };
        session.handle.resize(viewport);
        session.handle.focus();
        session.handle.resend_working_directory();
        let cwd = session.cwd.clone();
        self.files.follow_session(slot, cwd);
        tracing::debug!(slot, "Focused");
    }

    fn relabel(&mut self, slot: usize) {
        let label = self.registry.label(slot);
        self.frontend.set_tab_label(slot, &label);
    }
}

fn open_handle(client: &MuxClient, slot: usize, port: u16) -> SessionHandle {
    let client = client.clone();
    SessionHandle::open(slot, port, move |handle, event| {
        client.send(MuxEvent::Session {
            slot,
            handle,
            event,
        });
    })
}
