//! Headless console front end.
//!
//! The focused session's output goes to stdout. Everything else (tab
//! labels, overlays, the file browser) is reported through the log, and
//! stdin lines are either `:` commands or text typed into the focused
//! session.

use actions::AppAction;
use platform::InMemoryHotkeys;
use std::io::Write;
use tabterm_workspace::{FileBrowser, Frontend, MuxClient, MuxEvent, TabLabel};
use terminal::TermSize;
use tokio::io::{AsyncBufReadExt, BufReader};
use util::ResultExt;

pub struct ConsoleFrontend {
    visible: usize,
}

impl ConsoleFrontend {
    pub fn new() -> Self {
        Self { visible: 0 }
    }
}

impl Frontend for ConsoleFrontend {
    fn set_tab_label(&mut self, slot: usize, label: &TabLabel) {
        tracing::info!(tab = slot + 1, "{}", label);
    }

    fn show_slot(&mut self, slot: usize) {
        self.visible = slot;
        tracing::info!(tab = slot + 1, "Now showing");
    }

    fn hide_slot(&mut self, _slot: usize) {}

    fn session_output(&mut self, slot: usize, bytes: &[u8]) {
        if slot != self.visible {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes).log_err();
        stdout.flush().log_err();
    }

    fn copy_selection(&mut self, slot: usize) {
        tracing::info!(tab = slot + 1, "Nothing to copy: the console has no selection");
    }

    fn clipboard_text(&mut self) -> Option<String> {
        tracing::info!("Paste is not available in the console");
        None
    }

    fn open_settings(&mut self) {
        match settings::config_path() {
            Some(path) => tracing::info!("Settings live in {:?}; saved changes apply live", path),
            None => tracing::warn!("No config directory available"),
        }
    }

    fn show_shortcuts_help(&mut self, rows: &[(String, String)]) {
        let width = rows.iter().map(|(t, _)| t.len()).max().unwrap_or(0);
        eprintln!("Global shortcuts:");
        for (trigger, description) in rows {
            eprintln!("  {:width$}  {}", trigger, description, width = width);
        }
    }

    fn open_fuzzy_finder(&mut self) {
        tracing::info!("Fuzzy finder is not available in the console");
    }

    fn toggle_password_mode(&mut self) {
        tracing::info!("Password mode toggled");
    }

    fn toggle_devtools(&mut self) {
        tracing::info!("Developer tools are not available in the console");
    }

    fn reload(&mut self) {
        tracing::info!("Front end reloaded");
    }
}

/// File browser stand-in that logs what it would display.
#[derive(Default)]
pub struct ConsoleFiles {
    list_view: bool,
    show_dotfiles: bool,
}

impl FileBrowser for ConsoleFiles {
    fn follow_session(&mut self, slot: usize, cwd: Option<String>) {
        match cwd {
            Some(cwd) => tracing::info!(tab = slot + 1, cwd = %cwd, "File browser follows session"),
            None => tracing::debug!(tab = slot + 1, "Session has not reported a directory yet"),
        }
    }

    fn toggle_list_view(&mut self) {
        self.list_view = !self.list_view;
        tracing::info!(list_view = self.list_view, "File browser view changed");
    }

    fn toggle_hidden_dotfiles(&mut self) {
        self.show_dotfiles = !self.show_dotfiles;
        tracing::info!(show_dotfiles = self.show_dotfiles, "File browser dotfiles changed");
    }
}

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Zero-based slot.
    Tab(usize),
    Next,
    Prev,
    Fire(String),
    Action(String),
    Focus,
    Blur,
    Resize(TermSize),
    Help,
    Quit,
    Type(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let Some(command) = line.strip_prefix(':') else {
            return Ok(Command::Type(line.to_string()));
        };
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command.trim(), ""),
        };
        match (name, arg) {
            ("tab", n) => match n.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(Command::Tab(n - 1)),
                _ => Err(format!("expected a tab number, got '{}'", n)),
            },
            ("next", "") => Ok(Command::Next),
            ("prev", "") => Ok(Command::Prev),
            ("fire", trigger) if !trigger.is_empty() => Ok(Command::Fire(trigger.to_string())),
            ("action", name) if !name.is_empty() => Ok(Command::Action(name.to_ascii_uppercase())),
            ("focus", "") => Ok(Command::Focus),
            ("blur", "") => Ok(Command::Blur),
            ("resize", size) => size.parse().map(Command::Resize),
            ("help", "") => Ok(Command::Help),
            ("quit", "") | ("q", "") => Ok(Command::Quit),
            _ => Err(format!("unknown command ':{}'", command.trim())),
        }
    }
}

fn print_help() {
    eprintln!(
        "Commands:\n  :tab N  :next  :prev  :fire <trigger>  :action <NAME>\n  :focus  :blur  :resize <cols>x<rows>  :help  :quit\nAny other line is typed into the focused tab."
    );
    let names: Vec<String> = AppAction::all().map(|a| a.to_string()).collect();
    eprintln!("Actions: {}", names.join(" "));
}

/// Read stdin until EOF, forwarding commands to the multiplexer.
///
/// `hotkeys` is the in-process registry `:fire` presses; `None` when native
/// hotkeys are in use.
pub async fn read_commands(client: MuxClient, hotkeys: Option<InMemoryHotkeys>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        let event = match command {
            Command::Tab(slot) => MuxEvent::FocusOrCreate(slot),
            Command::Next => MuxEvent::NextTab,
            Command::Prev => MuxEvent::PreviousTab,
            Command::Fire(trigger) => {
                match &hotkeys {
                    Some(hotkeys) if !hotkeys.fire(&trigger) => {
                        tracing::warn!(trigger = %trigger, "No shortcut registered for trigger");
                    }
                    Some(_) => {}
                    None => tracing::warn!("Native hotkeys are active; press the keys instead"),
                }
                continue;
            }
            Command::Action(name) => MuxEvent::AppAction(name),
            Command::Focus => MuxEvent::WindowFocus(true),
            Command::Blur => MuxEvent::WindowFocus(false),
            Command::Resize(size) => MuxEvent::Resize(size),
            Command::Help => {
                print_help();
                continue;
            }
            Command::Quit => MuxEvent::Quit,
            Command::Type(text) => MuxEvent::TypeLine(text),
        };
        if !client.send(event) {
            return;
        }
    }

    tracing::info!("stdin closed");
    client.send(MuxEvent::Quit);
}
