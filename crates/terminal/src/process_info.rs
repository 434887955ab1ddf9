//! Foreground process and working directory sampling for a shell.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// What a backend reports about its shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// Most recently started direct child of the shell, or the shell itself.
    pub name: Option<String>,
    pub cwd: Option<String>,
}

/// Samples the process table for one shell PID.
pub struct ProcessProbe {
    system: System,
    shell: Pid,
}

impl ProcessProbe {
    pub fn new(shell_pid: u32) -> Self {
        Self {
            system: System::new(),
            shell: Pid::from_u32(shell_pid),
        }
    }

    pub fn sample(&mut self) -> ProcessSnapshot {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_cwd(UpdateKind::Always),
        );

        let Some(shell) = self.system.process(self.shell) else {
            return ProcessSnapshot::default();
        };

        let foreground = self
            .system
            .processes()
            .values()
            .filter(|process| process.parent() == Some(self.shell))
            .max_by_key(|process| process.start_time())
            .unwrap_or(shell);

        ProcessSnapshot {
            name: Some(foreground.name().to_string_lossy().into_owned()),
            cwd: shell.cwd().map(|cwd| cwd.to_string_lossy().into_owned()),
        }
    }
}
