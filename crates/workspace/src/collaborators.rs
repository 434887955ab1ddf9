//! Interfaces to the parts of the front end the multiplexer drives but does
//! not own.

use std::fmt;

/// Text shown on a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabLabel {
    Empty,
    /// A spawn request is in flight.
    Loading,
    /// Bound, no process reported yet.
    Port(u16),
    /// The last spawn attempt failed.
    Error,
    /// The primary session before it reports a process.
    MainShell,
    /// The primary session running a process.
    Main(String),
    /// Slot `n - 1` running a process.
    Numbered(usize, String),
}

impl fmt::Display for TabLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabLabel::Empty => write!(f, "EMPTY"),
            TabLabel::Loading => write!(f, "LOADING..."),
            TabLabel::Port(port) => write!(f, "::{}", port),
            TabLabel::Error => write!(f, "ERROR"),
            TabLabel::MainShell => write!(f, "MAIN SHELL"),
            TabLabel::Main(process) => write!(f, "MAIN - {}", process),
            TabLabel::Numbered(n, process) => write!(f, "#{} - {}", n, process),
        }
    }
}

/// The visible surface: tabs, terminal views and overlay UI.
pub trait Frontend {
    fn set_tab_label(&mut self, slot: usize, label: &TabLabel);

    /// Make `slot`'s terminal view the visible one.
    fn show_slot(&mut self, slot: usize);

    fn hide_slot(&mut self, slot: usize);

    /// Output from the session bound to `slot`. Delivered for every bound
    /// slot, visible or not.
    fn session_output(&mut self, slot: usize, bytes: &[u8]);

    /// Copy the current selection of `slot`'s terminal view.
    fn copy_selection(&mut self, slot: usize);

    /// Clipboard text to paste, if any.
    fn clipboard_text(&mut self) -> Option<String>;

    fn open_settings(&mut self);

    /// Show the shortcut reference as `(trigger, description)` rows.
    fn show_shortcuts_help(&mut self, rows: &[(String, String)]);

    fn open_fuzzy_finder(&mut self);

    fn toggle_password_mode(&mut self);

    fn toggle_devtools(&mut self);

    /// Reload the front end. Sessions keep running.
    fn reload(&mut self);
}

/// File browser that follows the focused session's working directory.
#[cfg_attr(test, mockall::automock)]
pub trait FileBrowser {
    /// The focused session changed, or reported a new cwd. `cwd` is the last
    /// directory `slot` reported, if any.
    fn follow_session(&mut self, slot: usize, cwd: Option<String>);

    fn toggle_list_view(&mut self);

    fn toggle_hidden_dotfiles(&mut self);
}
