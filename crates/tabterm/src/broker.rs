//! Spawn broker that runs each session backend as a child process.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tabterm_workspace::{SpawnBroker, SpawnTicket};
use terminal::{launch_backend, BackendCommand};
use tokio::process::Child;

pub struct ProcessBroker {
    command: BackendCommand,
    backends: Backends,
}

impl ProcessBroker {
    /// Broker launching `<this executable> serve --port 0`, with backend
    /// stderr appended to the log directory.
    pub fn new() -> Result<Self> {
        let log = tabterm_paths::logs_dir().join("backend.log");
        Ok(Self {
            command: BackendCommand::current_exe(Some(log))?,
            backends: Backends::default(),
        })
    }

    /// The backends this broker has launched, for shutdown.
    pub fn backends(&self) -> Backends {
        self.backends.clone()
    }
}

impl SpawnBroker for ProcessBroker {
    fn request_spawn(&mut self, ticket: SpawnTicket) {
        let command = self.command.clone();
        let backends = self.backends.clone();
        tokio::spawn(async move {
            match launch_backend(&command).await {
                Ok((port, child)) => {
                    tracing::info!(request = %ticket.id(), port, "Backend announced");
                    backends.adopt(child);
                    ticket.succeed(port);
                }
                Err(e) => {
                    tracing::warn!(request = %ticket.id(), "Backend spawn failed: {:#}", e);
                    ticket.fail(format!("{:#}", e));
                }
            }
        });
    }
}

/// Backend processes that outlive their spawn request.
///
/// Exited children are reaped whenever a new one is adopted; the rest are
/// killed by [`Backends::shutdown`].
#[derive(Clone, Default)]
pub struct Backends {
    children: Arc<Mutex<Vec<Child>>>,
}

impl Backends {
    pub fn adopt(&self, child: Child) {
        let mut children = self.children.lock();
        children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = ?child.id(), %status, "Backend exited");
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(pid = ?child.id(), "Failed to poll backend: {}", e);
                false
            }
        });
        children.push(child);
    }

    /// Kill every backend still running and wait for it to exit.
    pub async fn shutdown(&self) {
        let children = std::mem::take(&mut *self.children.lock());
        if children.is_empty() {
            return;
        }
        tracing::info!(count = children.len(), "Stopping session backends");
        for mut child in children {
            let pid = child.id();
            if let Err(e) = child.kill().await {
                tracing::debug!(?pid, "Kill backend: {}", e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::process::Command;

    fn sleeper(secs: &str) -> Child {
        Command::new("sleep")
            .arg(secs)
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn shutdown_kills_running_backends() {
        let backends = Backends::default();
        backends.adopt(sleeper("30"));
        backends.adopt(sleeper("30"));
        assert_eq!(backends.children.lock().len(), 2);

        let pids: Vec<u32> = backends
            .children
            .lock()
            .iter()
            .filter_map(Child::id)
            .collect();
        assert_eq!(pids.len(), 2);

        backends.shutdown().await;
        assert_eq!(backends.children.lock().len(), 0);

        // kill() waits for the exit, so the processes are gone and reaped
        #[cfg(target_os = "linux")]
        for pid in pids {
            let proc_dir = format!("/proc/{}", pid);
            assert!(!std::path::Path::new(&proc_dir).exists(), "backend {} survived", pid);
        }
    }

    #[tokio::test]
    async fn adopting_reaps_exited_backends() {
        let backends = Backends::default();
        let mut quick = Command::new("true").spawn().unwrap();
        quick.wait().await.unwrap();
        backends.adopt(quick);
        backends.adopt(sleeper("30"));
        assert_eq!(backends.children.lock().len(), 1);

        backends.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_with_nothing_adopted_is_a_no_op() {
        Backends::default().shutdown().await;
    }
}
