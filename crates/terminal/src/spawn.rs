//! Starting session backends as child processes, and the spawn reply format.

use anyhow::{anyhow, bail, Context, Result};
use settings::constants::spawn::{ANNOUNCE_PREFIX, ANNOUNCE_TIMEOUT};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Outcome of one spawn request, as carried over the spawn protocol.
///
/// On the wire a success is `SUCCESS:<port>` and a failure is `ERROR`
/// followed by free-form details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnReply {
    Success { port: u16 },
    Failure { details: String },
}

impl SpawnReply {
    /// Classify a raw reply. Anything that is not a well-formed success is
    /// a failure.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("SUCCESS") {
            let port = rest.trim_start_matches(':').trim();
            return match port.parse::<u16>() {
                Ok(port) if port != 0 => SpawnReply::Success { port },
                _ => SpawnReply::Failure {
                    details: format!("invalid port in reply '{}'", raw),
                },
            };
        }
        if let Some(rest) = raw.strip_prefix("ERROR") {
            return SpawnReply::Failure {
                details: rest.trim_start_matches(':').trim().to_string(),
            };
        }
        SpawnReply::Failure {
            details: format!("unrecognized reply '{}'", raw),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SpawnReply::Success { .. })
    }
}

impl fmt::Display for SpawnReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnReply::Success { port } => write!(f, "SUCCESS:{}", port),
            SpawnReply::Failure { details } if details.is_empty() => write!(f, "ERROR"),
            SpawnReply::Failure { details } => write!(f, "ERROR: {}", details),
        }
    }
}

/// Command line that starts one session backend.
#[derive(Debug, Clone)]
pub struct BackendCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// File the backend's stderr is appended to. Discarded when unset.
    pub stderr_log: Option<PathBuf>,
}

impl BackendCommand {
    /// `tabterm serve --port 0` using the running executable.
    pub fn current_exe(stderr_log: Option<PathBuf>) -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self {
            program,
            args: vec!["serve".into(), "--port".into(), "0".into()],
            stderr_log,
        })
    }
}

/// Start a backend and wait for it to announce its port.
///
/// Returns the port and the child, which the caller must reap. Dropping the
/// child kills the backend.
pub async fn launch_backend(command: &BackendCommand) -> Result<(u16, Child)> {
    let stderr = match &command.stderr_log {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open backend log {:?}", path))?;
            Stdio::from(file)
        }
        None => Stdio::null(),
    };

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {:?}", command.program))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Backend stdout was not captured"))?;

    let announce = async {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(port) = line.trim().strip_prefix(ANNOUNCE_PREFIX.trim_end()) {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("Backend announced a bad port: '{}'", line))?;
                return Ok(port);
            }
            tracing::debug!(line = %line, "Backend stdout");
        }
        bail!("Backend exited before announcing a port")
    };

    match tokio::time::timeout(ANNOUNCE_TIMEOUT, announce).await {
        Ok(Ok(port)) => Ok((port, child)),
        Ok(Err(e)) => {
            child.start_kill().ok();
            Err(e)
        }
        Err(_) => {
            child.start_kill().ok();
            bail!("Backend did not announce a port within {:?}", ANNOUNCE_TIMEOUT)
        }
    }
}
