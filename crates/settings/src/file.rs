//! TOML config file support with live reload.
//!
//! Config location: `~/.config/tabterm/config.toml`

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Class of a shortcut entry, decoded from its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutClass {
    /// `action` names a built-in multiplexer operation.
    App,
    /// `action` is literal text typed into the focused session.
    Shell,
}

/// One persisted keyboard shortcut.
///
/// `kind` stays a plain string so that a single entry with an unknown type
/// can be skipped without rejecting the whole table.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ShortcutEntry {
    /// Key chord, e.g. "Ctrl+Shift+C". May contain the `X` placeholder for `TAB_X`.
    pub trigger: String,
    /// "app" or "shell".
    #[serde(rename = "type")]
    pub kind: String,
    /// App action name, or the shell text to inject.
    pub action: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shell entries only: append a line terminator after the text.
    #[serde(default)]
    pub linebreak: bool,
}

fn default_true() -> bool {
    true
}

impl ShortcutEntry {
    pub fn app(trigger: &str, action: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            kind: "app".to_string(),
            action: action.to_string(),
            enabled: true,
            linebreak: false,
        }
    }

    pub fn shell(trigger: &str, text: &str, linebreak: bool) -> Self {
        Self {
            trigger: trigger.to_string(),
            kind: "shell".to_string(),
            action: text.to_string(),
            enabled: true,
            linebreak,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Decode the `type` field. `None` for anything other than exactly
    /// "app" or "shell".
    pub fn class(&self) -> Option<ShortcutClass> {
        match self.kind.as_str() {
            "app" => Some(ShortcutClass::App),
            "shell" => Some(ShortcutClass::Shell),
            _ => None,
        }
    }
}

/// Shortcut table used when the config file has no `shortcuts` key.
pub fn default_shortcuts() -> Vec<ShortcutEntry> {
    vec![
        ShortcutEntry::app("Ctrl+Shift+C", "COPY"),
        ShortcutEntry::app("Ctrl+Shift+V", "PASTE"),
        ShortcutEntry::app("Ctrl+Tab", "NEXT_TAB"),
        ShortcutEntry::app("Ctrl+Shift+Tab", "PREVIOUS_TAB"),
        ShortcutEntry::app("Ctrl+X", "TAB_X"),
        ShortcutEntry::app("Ctrl+Shift+S", "SETTINGS"),
        ShortcutEntry::app("Ctrl+Shift+K", "SHORTCUTS"),
        ShortcutEntry::app("Ctrl+Shift+F", "FUZZY_SEARCH"),
        ShortcutEntry::app("Ctrl+Shift+L", "FS_LIST_VIEW"),
        ShortcutEntry::app("Ctrl+Shift+H", "FS_DOTFILES"),
        ShortcutEntry::app("Ctrl+Shift+P", "KB_PASSMODE"),
        ShortcutEntry::app("Ctrl+Shift+I", "DEV_DEBUG"),
        ShortcutEntry::app("Ctrl+Shift+F5", "DEV_RELOAD"),
        ShortcutEntry::shell("Ctrl+Shift+Alt+Space", "neofetch", true).disabled(),
    ]
}

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Port of the primary session backend.
    pub port: u16,
    /// Shell started by session backends (defaults to `$SHELL`).
    pub shell: Option<String>,
    /// Working directory for new sessions.
    pub cwd: Option<String>,
    /// Initial viewport width in columns.
    pub cols: u16,
    /// Initial viewport height in rows.
    pub rows: u16,
    /// Ordered shortcut table. Entries that fail to decode are dropped
    /// one by one; the rest of the file still applies.
    #[serde(deserialize_with = "lenient_shortcuts")]
    pub shortcuts: Vec<ShortcutEntry>,
}

fn lenient_shortcuts<'de, D>(deserializer: D) -> Result<Vec<ShortcutEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let toml::Value::Array(raw) = toml::Value::deserialize(deserializer)? else {
        tracing::warn!("`shortcuts` is not an array of tables, using the default shortcuts");
        return Ok(default_shortcuts());
    };

    let entries = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match value.try_into::<ShortcutEntry>() {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(index, "Skipping shortcut entry: {}", e);
                None
            }
        })
        .collect();
    Ok(entries)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: crate::constants::session::DEFAULT_PORT,
            shell: None,
            cwd: None,
            cols: crate::constants::session::DEFAULT_COLS,
            rows: crate::constants::session::DEFAULT_ROWS,
            shortcuts: default_shortcuts(),
        }
    }
}

/// Default config file content with comments (generated on first launch).
const DEFAULT_CONFIG: &str = r#"# tabterm configuration
# Shortcut changes are applied live when this file is saved.

# Port of the primary (tab 1) session backend
port = 3000

# Shell started in every session (defaults to $SHELL)
# shell = "/bin/zsh"

# Working directory for new sessions
# cwd = "~/projects"

# Initial viewport size
cols = 80
rows = 24

# Keyboard shortcuts.
# type = "app": action is one of COPY, PASTE, NEXT_TAB, PREVIOUS_TAB, TAB_X,
#   SETTINGS, SHORTCUTS, FUZZY_SEARCH, FS_LIST_VIEW, FS_DOTFILES, KB_PASSMODE,
#   DEV_DEBUG, DEV_RELOAD. TAB_X registers one trigger per tab, replacing the
#   X in the trigger with 1..5.
# type = "shell": action is typed into the focused tab; linebreak = true
#   runs it as a command.

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+C"
action = "COPY"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+V"
action = "PASTE"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Tab"
action = "NEXT_TAB"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+Tab"
action = "PREVIOUS_TAB"

[[shortcuts]]
type = "app"
trigger = "Ctrl+X"
action = "TAB_X"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+S"
action = "SETTINGS"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+K"
action = "SHORTCUTS"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+F"
action = "FUZZY_SEARCH"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+L"
action = "FS_LIST_VIEW"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+H"
action = "FS_DOTFILES"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+P"
action = "KB_PASSMODE"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+I"
action = "DEV_DEBUG"

[[shortcuts]]
type = "app"
trigger = "Ctrl+Shift+F5"
action = "DEV_RELOAD"

[[shortcuts]]
type = "shell"
trigger = "Ctrl+Shift+Alt+Space"
action = "neofetch"
linebreak = true
enabled = false
"#;

/// Return the config file path.
pub fn config_path() -> Option<PathBuf> {
    Some(tabterm_paths::config_file())
}

/// Ensure the config file exists, creating a default if missing.
/// Returns the path to the config file.
pub fn ensure_config_file() -> Option<PathBuf> {
    let path = config_path()?;
    if !path.exists() {
        let parent = path.parent()?;
        std::fs::create_dir_all(parent).ok()?;
        std::fs::write(&path, DEFAULT_CONFIG).ok()?;
        tracing::info!("Created default config at {:?}", path);
    }
    Some(path)
}

/// Load and parse the config file. Returns default on any error.
pub fn load_config() -> Config {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => Config::default(),
    }
}

/// Load and parse a config file at an explicit path. Returns default on any error.
pub fn load_config_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config: {}", e);
            }
            return Config::default();
        }
    };

    // Size guard
    if content.len() > crate::constants::settings::MAX_FILE_SIZE as usize {
        tracing::warn!(
            "Config file too large ({} bytes), using defaults",
            content.len()
        );
        return Config::default();
    }

    match toml::from_str(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Failed to parse config.toml: {}", e);
            Config::default()
        }
    }
}

/// Start watching the config file for changes.
///
/// Returns a guard that stops watching on drop. `on_change` runs on the
/// watcher thread with the freshly parsed config, only when it differs from
/// the previous one.
pub fn watch_config(
    path: PathBuf,
    on_change: impl Fn(Config) + Send + 'static,
) -> Option<notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>> {
    use notify_debouncer_mini::new_debouncer;

    let watch_dir = path.parent()?.to_path_buf();
    let current = parking_lot::Mutex::new(load_config_from(&path));
    let path_clone = path.clone();

    let mut debouncer = new_debouncer(
        crate::constants::settings::WATCH_DEBOUNCE,
        move |res: Result<Vec<notify_debouncer_mini::DebouncedEvent>, _>| {
            let Ok(events) = res else {
                return;
            };
            if !events.iter().any(|event| event.path == path_clone) {
                return;
            }

            let new_config = load_config_from(&path_clone);
            let mut prev = current.lock();
            if new_config != *prev {
                tracing::info!("Config file changed, reloading...");
                *prev = new_config.clone();
                on_change(new_config);
            }
        },
    )
    .ok()?;

    debouncer
        .watcher()
        .watch(&watch_dir, notify::RecursiveMode::NonRecursive)
        .ok()?;

    tracing::info!("Watching config file: {:?}", path);
    Some(debouncer)
}
