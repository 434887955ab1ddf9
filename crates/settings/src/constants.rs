//! Centralized configuration constants for tabterm.
//!
//! Organized by component for maintainability.

/// Terminal slot configuration.
pub mod slots {
    /// Number of terminal slots (tabs) the multiplexer manages.
    pub const COUNT: usize = 5;
    /// Index of the primary session. Always bound, never respawned.
    pub const PRIMARY: usize = 0;
}

/// Session backend and transport configuration.
pub mod session {
    use std::time::Duration;

    /// Default port of the primary session backend.
    pub const DEFAULT_PORT: u16 = 3000;
    /// Loopback host every session backend listens on.
    pub const HOST: &str = "127.0.0.1";
    /// Default grid size before the first resize.
    pub const DEFAULT_COLS: u16 = 80;
    pub const DEFAULT_ROWS: u16 = 24;
    /// How long the transport may take to connect to a freshly spawned backend.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// How often a backend samples the foreground process and cwd.
    pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(500);
    /// Fallback shell when `$SHELL` is not set.
    #[cfg(not(target_os = "windows"))]
    pub const FALLBACK_SHELL: &str = "/bin/sh";
    #[cfg(target_os = "windows")]
    pub const FALLBACK_SHELL: &str = "cmd.exe";
    /// A spawned backend exits after running this long with no client attached.
    pub const DETACHED_GRACE: Duration = Duration::from_secs(30);
    /// Bytes appended by `linebreak` shell shortcuts and typed lines.
    pub const LINE_TERMINATOR: &str = "\r";
}

/// Spawn broker configuration.
pub mod spawn {
    use std::time::Duration;

    /// How long a spawned backend may take to announce its port.
    pub const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(10);
    /// Line prefix a backend prints on stdout once it is listening.
    pub const ANNOUNCE_PREFIX: &str = "LISTENING ";
}

/// Wire protocol limits.
pub mod protocol {
    /// Largest frame payload accepted from a peer.
    pub const MAX_FRAME_LEN: u32 = 1024 * 1024;
    /// Read buffer size for PTY output.
    pub const READ_CHUNK: usize = 4096;
    /// Output kept by a backend while no client is attached.
    pub const BACKLOG_LIMIT: usize = 64 * 1024;
}

/// Settings file configuration.
pub mod settings {
    use std::time::Duration;

    /// Maximum settings file size in bytes (1MB).
    pub const MAX_FILE_SIZE: u64 = 1024 * 1024;
    /// Debounce window for config file change events.
    pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(100);
}
