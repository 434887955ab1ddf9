//! App-level shortcut actions for tabterm.
//!
//! Every action a shortcut entry of type `app` can name is a variant of
//! [`AppAction`]. Names follow the persisted shortcut format (`NEXT_TAB`,
//! `TAB_3`, ...). `TAB_X` is not an action: it is a registration-time
//! template expanded into `TAB_1`..`TAB_5`.

use std::fmt;
use std::str::FromStr;

/// Number of terminal slots a `TAB_n` action can address.
pub const TAB_COUNT: usize = 5;

/// Action name that expands into one `TAB_n` binding per slot.
pub const TAB_TEMPLATE: &str = "TAB_X";

/// Placeholder substituted with `1..=TAB_COUNT` in a `TAB_X` trigger.
pub const TAB_PLACEHOLDER: char = 'X';

/// A built-in multiplexer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppAction {
    /// Copy the focused session's selection.
    Copy,
    /// Paste clipboard text into the focused session.
    Paste,
    NextTab,
    PreviousTab,
    /// Focus (or open) the slot with this zero-based index.
    Tab(usize),
    Settings,
    Shortcuts,
    FuzzySearch,
    FsListView,
    FsDotfiles,
    KbPassmode,
    DevDebug,
    DevReload,
}

/// Returned when a shortcut names an action this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown app shortcut action \"{0}\"")]
pub struct UnknownAction(pub String);

impl AppAction {
    /// Every action with a fixed name, in the order the shortcuts help lists them.
    pub fn all() -> impl Iterator<Item = AppAction> {
        [
            Self::Copy,
            Self::Paste,
            Self::NextTab,
            Self::PreviousTab,
        ]
        .into_iter()
        .chain((0..TAB_COUNT).map(Self::Tab))
        .chain([
            Self::Settings,
            Self::Shortcuts,
            Self::FuzzySearch,
            Self::FsListView,
            Self::FsDotfiles,
            Self::KbPassmode,
            Self::DevDebug,
            Self::DevReload,
        ])
    }

    /// One-line description shown in the shortcuts help.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Copy => "Copy selected buffer from the terminal.",
            Self::Paste => "Paste system clipboard to the terminal.",
            Self::NextTab => "Switch to the next opened terminal tab (left to right order).",
            Self::PreviousTab => "Switch to the previous opened terminal tab (right to left order).",
            Self::Tab(_) => "Switch to terminal tab X, or create it if it hasn't been opened yet.",
            Self::Settings => "Open the settings editor.",
            Self::Shortcuts => "List and edit available keyboard shortcuts.",
            Self::FuzzySearch => "Search for entries in the current working directory.",
            Self::FsListView => "Toggle between list and grid view in the file browser.",
            Self::FsDotfiles => "Toggle hidden files and directories in the file browser.",
            Self::KbPassmode => "Toggle the on-screen keyboard's \"Password Mode\".",
            Self::DevDebug => "Open developer tools.",
            Self::DevReload => "Trigger front-end hot reload.",
        }
    }
}

impl fmt::Display for AppAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "COPY"),
            Self::Paste => write!(f, "PASTE"),
            Self::NextTab => write!(f, "NEXT_TAB"),
            Self::PreviousTab => write!(f, "PREVIOUS_TAB"),
            Self::Tab(index) => write!(f, "TAB_{}", index + 1),
            Self::Settings => write!(f, "SETTINGS"),
            Self::Shortcuts => write!(f, "SHORTCUTS"),
            Self::FuzzySearch => write!(f, "FUZZY_SEARCH"),
            Self::FsListView => write!(f, "FS_LIST_VIEW"),
            Self::FsDotfiles => write!(f, "FS_DOTFILES"),
            Self::KbPassmode => write!(f, "KB_PASSMODE"),
            Self::DevDebug => write!(f, "DEV_DEBUG"),
            Self::DevReload => write!(f, "DEV_RELOAD"),
        }
    }
}

impl FromStr for AppAction {
    type Err = UnknownAction;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let action = match name {
            "COPY" => Self::Copy,
            "PASTE" => Self::Paste,
            "NEXT_TAB" => Self::NextTab,
            "PREVIOUS_TAB" => Self::PreviousTab,
            "SETTINGS" => Self::Settings,
            "SHORTCUTS" => Self::Shortcuts,
            "FUZZY_SEARCH" => Self::FuzzySearch,
            "FS_LIST_VIEW" => Self::FsListView,
            "FS_DOTFILES" => Self::FsDotfiles,
            "KB_PASSMODE" => Self::KbPassmode,
            "DEV_DEBUG" => Self::DevDebug,
            "DEV_RELOAD" => Self::DevReload,
            other => {
                return other
                    .strip_prefix("TAB_")
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| (1..=TAB_COUNT).contains(n))
                    .map(|n| Self::Tab(n - 1))
                    .ok_or_else(|| UnknownAction(other.to_string()));
            }
        };
        Ok(action)
    }
}

/// Expand a `TAB_X` trigger template into `(trigger, action)` pairs.
///
/// Only the first placeholder is substituted, so `Ctrl+Shift+X` yields
/// `Ctrl+Shift+1` .. `Ctrl+Shift+5`.
pub fn expand_tab_template(trigger: &str) -> Vec<(String, AppAction)> {
    (1..=TAB_COUNT)
        .map(|n| {
            let expanded = trigger.replacen(TAB_PLACEHOLDER, &n.to_string(), 1);
            (expanded, AppAction::Tab(n - 1))
        })
        .collect()
}
