//! Session backend: one PTY served over a loopback TCP port.

use crate::process_info::{ProcessProbe, ProcessSnapshot};
use crate::protocol::{read_frame, write_frame, Frame, ProtocolError};
use crate::pty_handler::PtyHandler;
use crate::types::TermSize;
use anyhow::{Context, Result};
use settings::constants::{
    protocol::BACKLOG_LIMIT,
    session::{HOST, PROCESS_POLL_INTERVAL},
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use util::ResultExt;

/// How the backend starts its shell.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Shell program. `$SHELL` when unset.
    pub shell: Option<String>,
    pub cwd: Option<PathBuf>,
    pub size: TermSize,
    /// Exit once no client has been attached for this long. `None` serves
    /// until the shell exits.
    pub detached_grace: Option<Duration>,
}

/// A bound but not yet running session backend.
pub struct SessionServer {
    listener: TcpListener,
    options: SessionOptions,
}

struct Client {
    id: u64,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl SessionServer {
    /// Bind the listener. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16, options: SessionOptions) -> Result<Self> {
        let listener = TcpListener::bind((HOST, port))
            .await
            .with_context(|| format!("Failed to bind session backend on {}:{}", HOST, port))?;
        Ok(Self { listener, options })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self
            .listener
            .local_addr()
            .context("Listener has no local address")?
            .port())
    }

    /// Serve until the shell exits, or until no client has been attached
    /// for the configured grace period.
    ///
    /// One client is attached at a time. A new connection replaces the
    /// current one (front end reload) while the shell keeps running. Output
    /// produced while no client is attached is kept up to a bounded backlog.
    pub async fn run(self) -> Result<()> {
        let port = self.local_port()?;
        let (mut pty, mut output) = PtyHandler::spawn(
            self.options.shell.as_deref(),
            self.options.cwd.as_deref(),
            self.options.size,
        )?;

        let mut probe = pty.process_id().map(ProcessProbe::new);
        let mut last = ProcessSnapshot::default();
        let mut poll = tokio::time::interval(PROCESS_POLL_INTERVAL);

        let (incoming_tx, mut incoming) = mpsc::unbounded_channel::<(u64, Option<Frame>)>();
        let mut client: Option<Client> = None;
        let mut next_client_id = 0u64;
        let mut backlog: Vec<u8> = Vec::new();
        let mut detached_since = Some(Instant::now());

        tracing::info!(port, "Session backend running");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    if client.is_some() {
                        tracing::info!(%peer, "New client replaces the attached one");
                    } else {
                        tracing::info!(%peer, "Client attached");
                    }

                    next_client_id += 1;
                    let id = next_client_id;
                    let (mut read_half, writer) = stream.into_split();
                    let tx = incoming_tx.clone();
                    let reader = tokio::spawn(async move {
                        loop {
                            match read_frame(&mut read_half).await {
                                Ok(Some(frame)) => {
                                    if tx.send((id, Some(frame))).is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    tracing::warn!("Dropping client after protocol error: {}", e);
                                    break;
                                }
                            }
                        }
                        let _ = tx.send((id, None));
                    });

                    let mut attached = Client { id, writer, reader };
                    client = match greet(&mut attached.writer, &mut backlog, &last).await {
                        Ok(()) => Some(attached),
                        Err(e) => {
                            tracing::warn!("Failed to greet client: {}", e);
                            None
                        }
                    };
                }

                Some((id, frame)) = incoming.recv() => {
                    if client.as_ref().map(|c| c.id) != Some(id) {
                        continue;
                    }
                    match frame {
                        Some(Frame::Data(bytes)) => {
                            pty.write(&bytes).log_err_with("PTY write");
                        }
                        Some(Frame::Resize { cols, rows }) => {
                            let size = TermSize::new(cols, rows);
                            tracing::debug!(%size, "Resize");
                            pty.resize(size).log_err();
                        }
                        Some(Frame::RequestCwd) => {
                            if let Some(probe) = probe.as_mut() {
                                last.cwd = probe.sample().cwd.or(last.cwd.take());
                            }
                            if let Some(cwd) = last.cwd.clone() {
                                send(&mut client, Frame::Cwd(cwd)).await;
                            }
                        }
                        Some(other) => {
                            tracing::debug!(?other, "Ignoring frame not meant for a backend");
                        }
                        None => {
                            tracing::info!("Client detached");
                            client = None;
                        }
                    }
                }

                chunk = output.recv() => {
                    let Some(bytes) = chunk else {
                        tracing::info!(port, "Shell exited, shutting down backend");
                        break;
                    };
                    if client.is_some() {
                        send(&mut client, Frame::Data(bytes)).await;
                    } else {
                        backlog.extend_from_slice(&bytes);
                        if backlog.len() > BACKLOG_LIMIT {
                            let excess = backlog.len() - BACKLOG_LIMIT;
                            backlog.drain(..excess);
                        }
                    }
                }

                _ = poll.tick() => {
                    if client.is_some() {
                        detached_since = None;
                    } else if let Some(grace) = self.options.detached_grace {
                        let since = *detached_since.get_or_insert_with(Instant::now);
                        if since.elapsed() >= grace {
                            tracing::info!(port, ?grace, "No client attached, shutting down backend");
                            break;
                        }
                    }

                    let Some(probe) = probe.as_mut() else { continue };
                    let snapshot = probe.sample();
                    // A failed sample keeps the last known values
                    if let Some(name) = snapshot.name {
                        if last.name.as_ref() != Some(&name) {
                            send(&mut client, Frame::ProcessName(name.clone())).await;
                            last.name = Some(name);
                        }
                    }
                    if let Some(cwd) = snapshot.cwd {
                        if last.cwd.as_ref() != Some(&cwd) {
                            send(&mut client, Frame::Cwd(cwd.clone())).await;
                            last.cwd = Some(cwd);
                        }
                    }
                }
            }
        }

        drop(client);
        drop(pty);
        Ok(())
    }
}

/// Replay the backlog and the last known process info to a new client.
///
/// The backlog is only cleared once the whole greeting was written, so a
/// client that fails mid-greeting leaves it for the next one.
async fn greet<W>(
    writer: &mut W,
    backlog: &mut Vec<u8>,
    last: &ProcessSnapshot,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if !backlog.is_empty() {
        write_frame(writer, &Frame::Data(backlog.clone())).await?;
    }
    if let Some(name) = &last.name {
        write_frame(writer, &Frame::ProcessName(name.clone())).await?;
    }
    if let Some(cwd) = &last.cwd {
        write_frame(writer, &Frame::Cwd(cwd.clone())).await?;
    }
    backlog.clear();
    Ok(())
}

/// Send to the attached client, detaching it on write failure.
async fn send(client: &mut Option<Client>, frame: Frame) {
    let Some(attached) = client.as_mut() else {
        return;
    };
    if let Err(e) = write_frame(&mut attached.writer, &frame).await {
        tracing::info!("Client write failed, detaching: {}", e);
        *client = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot() -> ProcessSnapshot {
        ProcessSnapshot {
            name: Some("vim".into()),
            cwd: Some("/srv".into()),
        }
    }

    #[tokio::test]
    async fn greeting_replays_backlog_then_process_info() {
        let (mut ours, mut theirs) = tokio::io::duplex(64 * 1024);
        let mut backlog = b"while you were away".to_vec();

        greet(&mut ours, &mut backlog, &snapshot()).await.unwrap();

        assert!(backlog.is_empty());
        assert_eq!(
            read_frame(&mut theirs).await.unwrap(),
            Some(Frame::Data(b"while you were away".to_vec()))
        );
        assert_eq!(
            read_frame(&mut theirs).await.unwrap(),
            Some(Frame::ProcessName("vim".into()))
        );
        assert_eq!(
            read_frame(&mut theirs).await.unwrap(),
            Some(Frame::Cwd("/srv".into()))
        );
    }

    #[tokio::test]
    async fn failed_greeting_keeps_backlog() {
        let (mut ours, theirs) = tokio::io::duplex(64);
        drop(theirs);
        let mut backlog = b"unseen output".to_vec();

        assert!(greet(&mut ours, &mut backlog, &snapshot()).await.is_err());
        assert_eq!(backlog, b"unseen output".to_vec());
    }

    #[tokio::test]
    async fn empty_greeting_sends_nothing() {
        let (mut ours, theirs) = tokio::io::duplex(64);
        drop(theirs);
        let mut backlog = Vec::new();

        // Nothing to write, so the closed peer is never touched
        greet(&mut ours, &mut backlog, &ProcessSnapshot::default())
            .await
            .unwrap();
    }
}
