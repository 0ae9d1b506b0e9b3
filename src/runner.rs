//! Script process execution and tree termination.
//!
//! `ScriptRunner` owns the single child process a runbar instance may have
//! at a time: it spawns the package manager through the platform shell,
//! bridges stdout/stderr to the event channel, and detects exits by polling
//! from the tick loop. Tree termination walks the OS process table, because
//! dev scripts routinely fork watchers and servers that would otherwise be
//! orphaned by killing only the root.

use std::path::Path;
use std::process::Stdio;

use sysinfo::System;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::detect::PackageManager;
use crate::events::Event;
use crate::output::StreamKind;

/// Spawns and tracks at most one script process.
pub struct ScriptRunner {
    event_tx: mpsc::Sender<Event>,
    child: Option<Child>,
}

impl ScriptRunner {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            event_tx,
            child: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.child.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Spawns `<manager> run <script>` in `project_dir` through the shell,
    /// inheriting the environment.
    ///
    /// Spawn failure is reported as a `RunFailed` event rather than an
    /// error, so callers can reset state without crashing the host flow.
    pub async fn start(&mut self, project_dir: &Path, manager: PackageManager, script: &str) {
        let command_line =
            shell_words::join([manager.command(), "run", script].iter().copied());
        let mut command = shell_command(&command_line);
        command.current_dir(project_dir);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        // Own process group, so tree termination can signal the whole group.
        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let _ = self
                    .event_tx
                    .send(Event::RunFailed {
                        error: format!("failed to spawn {}: {}", command_line, err),
                    })
                    .await;
                return;
            }
        };

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_stream(StreamKind::Stdout, stdout, self.event_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_stream(StreamKind::Stderr, stderr, self.event_tx.clone()));
        }

        let pid = child.id().unwrap_or(0);
        self.child = Some(child);
        let _ = self.event_tx.send(Event::RunStarted { pid }).await;
    }

    /// Checks for an exit without blocking; called on every tick.
    pub async fn poll_exit(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                let _ = self
                    .event_tx
                    .send(Event::RunExited {
                        code: status.code(),
                    })
                    .await;
            }
            Ok(None) => {}
            Err(err) => {
                self.child = None;
                let _ = self
                    .event_tx
                    .send(Event::RunFailed {
                        error: err.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Terminates the owned process and its descendants, then reaps it.
    ///
    /// Always succeeds from the caller's perspective; individual kill
    /// failures are swallowed.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Some(pid) = child.id() {
            kill_process_tree(pid);
        }
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

fn shell_command(command_line: &str) -> Command {
    #[cfg(unix)]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        command
    }
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(command_line);
        command
    }
}

async fn read_stream<R>(stream: StreamKind, reader: R, tx: mpsc::Sender<Event>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = tx.send(Event::RunOutput { text: line, stream }).await;
    }
}

/// Terminates every descendant of `root_pid` (deepest first), then the root
/// itself, and signals the root's process group on Unix.
///
/// Returns the number of termination attempts issued. Fire-and-forget: each
/// attempt may hit a process that already exited alongside its parent, and
/// that is the expected case, not a failure.
pub fn kill_process_tree(root_pid: u32) -> usize {
    let mut system = System::new();
    system.refresh_processes_specifics(
        sysinfo::ProcessesToUpdate::All,
        true,
        sysinfo::ProcessRefreshKind::default(),
    );

    let mut descendants = Vec::new();
    collect_descendants(&system, root_pid, &mut descendants);

    for pid in &descendants {
        terminate_pid(&system, *pid);
    }
    terminate_pid(&system, root_pid);
    signal_process_group(root_pid);

    descendants.len() + 1
}

/// Walks the process table depth-first so the deepest descendants come
/// before their parents.
fn collect_descendants(system: &System, parent: u32, out: &mut Vec<u32>) {
    for (pid, process) in system.processes() {
        if let Some(ppid) = process.parent() {
            if ppid.as_u32() == parent {
                let child = pid.as_u32();
                collect_descendants(system, child, out);
                out.push(child);
            }
        }
    }
}

#[cfg(unix)]
fn terminate_pid(_system: &System, pid: u32) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    // ESRCH (already gone) and friends are deliberately ignored.
    unsafe {
        let _ = libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate_pid(system: &System, pid: u32) {
    if let Some(process) = system.process(sysinfo::Pid::from_u32(pid)) {
        let _ = process.kill();
    }
}

#[cfg(unix)]
fn signal_process_group(root_pid: u32) {
    let Ok(pid) = i32::try_from(root_pid) else {
        return;
    };
    unsafe {
        let _ = libc::kill(-pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn signal_process_group(_root_pid: u32) {}

/// Probes whether a recorded pid still refers to a live process. Used for
/// stale-state correction after a restart.
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        // Signal 0 probes existence without touching the process.
        unsafe { libc::kill(pid, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let mut system = System::new();
        system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[sysinfo::Pid::from_u32(pid)]),
            true,
            sysinfo::ProcessRefreshKind::default(),
        );
        system.process(sysinfo::Pid::from_u32(pid)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn zero_pid_is_never_alive() {
        assert!(!pid_alive(0));
    }

    #[test]
    fn killing_a_missing_tree_is_harmless() {
        // A pid above any plausible pid_max; the walk finds nothing and the
        // per-pid attempts are swallowed.
        let attempts = kill_process_tree(i32::MAX as u32);
        assert!(attempts >= 1);
    }
}
