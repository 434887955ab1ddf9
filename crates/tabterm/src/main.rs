//! tabterm - a five-tab terminal session multiplexer
//!
//! Main entry point. Without a subcommand it runs the multiplexer with a
//! console front end; `tabterm serve` runs one session backend.

mod broker;
mod console;

use anyhow::{Context, Result};
use broker::ProcessBroker;
use clap::{Parser, Subcommand};
use console::{ConsoleFiles, ConsoleFrontend};
use once_cell::sync::Lazy;
use platform::{HotkeyRegistry, InMemoryHotkeys, NativeHotkeys};
use settings::constants::{session::DETACHED_GRACE, spawn::ANNOUNCE_PREFIX};
use settings::Config;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tabterm_workspace::{Collaborators, MuxEvent, Multiplexer};
use terminal::{SessionOptions, SessionServer, TermSize};
use tracing::{debug, info, warn};
use util::ResultExt;

/// How long exit waits for blocking work such as the stdin reader.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

/// Application startup time for performance monitoring
static STARTUP_TIME: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Parser)]
#[command(name = "tabterm")]
#[command(about = "Five terminal sessions, one window, global shortcuts")]
#[command(version)]
struct Cli {
    /// Port of the primary session (defaults to the config file's `port`)
    #[arg(short, long)]
    port: Option<u16>,

    /// Register shortcuts with the OS instead of driving them with `:fire`
    #[arg(long)]
    native_hotkeys: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session backend: one shell served over a loopback port
    Serve {
        /// Port to listen on; 0 picks a free one
        #[arg(long, default_value_t = 0)]
        port: u16,

        /// Shell to run (defaults to the config file, then $SHELL)
        #[arg(long)]
        shell: Option<String>,

        /// Working directory of the shell
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Exit after this many seconds without an attached client (0 never exits)
        #[arg(long, default_value_t = DETACHED_GRACE.as_secs())]
        detached_grace: u64,
    },
}

/// Initialize required directories (cross-platform).
fn init_paths() -> Result<()> {
    let config_dir = tabterm_paths::config_dir();
    let data_dir = tabterm_paths::data_dir();
    let logs_dir = tabterm_paths::logs_dir();

    for dir in [config_dir, data_dir, logs_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }

    debug!(
        "Initialized paths - config: {:?}, data: {:?}, logs: {:?}",
        config_dir, data_dir, logs_dir
    );
    Ok(())
}

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("TABTERM_DEBUG").is_ok()
}

/// Initialize the logging system.
///
/// Logs go to stderr; stdout carries session output (or the port
/// announcement in `serve` mode).
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // In debug mode, enable trace logging for our crates
    let default_filter = if is_debug_mode() {
        "tabterm=trace,tabterm_workspace=trace,terminal=debug,info"
    } else {
        "tabterm=info,tabterm_workspace=info,terminal=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();

    if is_debug_mode() {
        info!(
            "tabterm v{} starting up (DEBUG MODE ENABLED)",
            env!("CARGO_PKG_VERSION")
        );
        info!("Set RUST_LOG for custom log levels, e.g. RUST_LOG=tabterm=trace");
    } else {
        debug!("tabterm v{} starting up", env!("CARGO_PKG_VERSION"));
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

fn session_options(config: &Config, shell: Option<String>, cwd: Option<PathBuf>) -> SessionOptions {
    SessionOptions {
        shell: shell.or_else(|| config.shell.clone()),
        cwd: cwd.or_else(|| config.cwd.as_deref().map(expand_home)),
        size: TermSize::new(config.cols, config.rows),
        detached_grace: None,
    }
}

/// `tabterm serve`: announce the port on stdout, then serve until the shell exits.
async fn serve(
    port: u16,
    shell: Option<String>,
    cwd: Option<PathBuf>,
    detached_grace: u64,
) -> Result<()> {
    let config = settings::load_config();
    let mut options = session_options(&config, shell, cwd);
    options.detached_grace = (detached_grace > 0).then(|| Duration::from_secs(detached_grace));
    let server = SessionServer::bind(port, options).await?;
    let port = server.local_port()?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}{}", ANNOUNCE_PREFIX, port).context("Failed to announce port")?;
    stdout.flush().context("Failed to announce port")?;
    drop(stdout);

    server.run().await
}

/// Run the multiplexer until the primary session closes or the user quits.
async fn run(cli: Cli) -> Result<()> {
    settings::ensure_config_file();
    let config = settings::load_config();
    let port = cli.port.unwrap_or(config.port);

    // Host the primary session in-process unless one is already listening.
    let primary = match SessionServer::bind(port, session_options(&config, None, None)).await {
        Ok(server) => Some(tokio::spawn(async move {
            server.run().await.log_err_with("Primary session");
        })),
        Err(e) => {
            warn!("{:#}; attaching to the session already on port {}", e, port);
            None
        }
    };

    let (hotkeys, fire): (Box<dyn HotkeyRegistry>, Option<InMemoryHotkeys>) =
        if cli.native_hotkeys {
            match NativeHotkeys::new() {
                Ok(native) => (Box::new(native), None),
                Err(e) => {
                    warn!("{:#}; falling back to console hotkeys", e);
                    let hotkeys = InMemoryHotkeys::new();
                    (Box::new(hotkeys.clone()), Some(hotkeys))
                }
            }
        } else {
            let hotkeys = InMemoryHotkeys::new();
            (Box::new(hotkeys.clone()), Some(hotkeys))
        };

    let broker = ProcessBroker::new()?;
    let backends = broker.backends();

    let mux = Multiplexer::new(
        port,
        TermSize::new(config.cols, config.rows),
        config.shortcuts.clone(),
        Collaborators {
            broker: Box::new(broker),
            frontend: Box::new(ConsoleFrontend::new()),
            files: Box::new(ConsoleFiles::default()),
            hotkeys,
        },
    );
    let client = mux.client();

    // Settings-save call site: the watcher pushes the new table to the mux.
    let _watcher = settings::config_path().and_then(|path| {
        let client = client.clone();
        settings::watch_config(path, move |config| {
            client.send(MuxEvent::ShortcutsChanged(config.shortcuts));
        })
    });

    tokio::spawn(console::read_commands(client, fire));

    info!(
        "Ready in {}ms. Type :help for commands",
        STARTUP_TIME.elapsed().as_millis()
    );
    mux.run().await;

    backends.shutdown().await;
    if let Some(primary) = primary {
        primary.abort();
    }
    Ok(())
}

fn main() -> Result<()> {
    Lazy::force(&STARTUP_TIME);

    init_logging();
    let cli = Cli::parse();
    init_paths()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = match cli.command {
        Some(Commands::Serve {
            port,
            shell,
            cwd,
            detached_grace,
        }) => runtime.block_on(serve(port, shell, cwd, detached_grace)),
        None => runtime.block_on(run(cli)),
    };

    // The stdin reader may still be parked in a blocking read
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    result
}
