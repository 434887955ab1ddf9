//! PTY process management.

use crate::types::TermSize;
use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use settings::constants::{protocol::READ_CHUNK, session::FALLBACK_SHELL};
use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use tokio::sync::mpsc;

/// Owns the pseudo-terminal of one session backend.
///
/// PTY output is read on a dedicated thread and pushed into the channel
/// returned by [`PtyHandler::spawn`]. The channel closes when the shell
/// exits. Dropping the handler kills and reaps the child.
pub struct PtyHandler {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    _reader_thread: thread::JoinHandle<()>,
}

impl PtyHandler {
    /// Spawn `shell` (or `$SHELL`, or the platform fallback) in a new PTY.
    pub fn spawn(
        shell: Option<&str>,
        cwd: Option<&Path>,
        size: TermSize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Vec<u8>>)> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let shell = shell
            .map(str::to_string)
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| FALLBACK_SHELL.to_string());

        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", "xterm-256color");
        if let Some(cwd) = cwd {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn shell '{}'", shell))?;
        // The reader only sees EOF once no slave fd is left open in this process
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let mut reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let reader_thread = thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    match reader.read(&mut buf) {
                        // EOF: the shell exited
                        Ok(0) => break,
                        Ok(n) => {
                            if output_tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!("PTY read ended: {}", e);
                            break;
                        }
                    }
                }
            })
            .context("Failed to start PTY reader thread")?;

        tracing::info!(shell = %shell, pid = ?child.process_id(), "Spawned shell");

        Ok((
            Self {
                master: pair.master,
                writer,
                child,
                _reader_thread: reader_thread,
            },
            output_rx,
        ))
    }

    /// Write input bytes to the PTY.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, size: TermSize) -> Result<()> {
        self.master
            .resize(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")?;
        Ok(())
    }

    /// PID of the shell, if the platform exposes one.
    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

impl Drop for PtyHandler {
    fn drop(&mut self) {
        // ESRCH is expected if the shell already exited
        if let Err(e) = self.child.kill() {
            tracing::debug!("Kill child process: {}", e);
        }

        // Reap to avoid a zombie
        if let Err(e) = self.child.wait() {
            tracing::debug!("Wait for child process: {}", e);
        }

        tracing::debug!("PTY handler dropped, child process cleaned up");
    }
}
