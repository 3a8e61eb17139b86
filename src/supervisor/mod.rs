// SPDX-License-Identifier: PMPL-1.0-or-later

//! Background process supervision for long-running stress tools.
//!
//! [`ProcessBuilder`] produces commands that, by default, die with their parent
//! (`PR_SET_PDEATHSIG`). Stress attacks must outlive the agent, so the
//! [`launcher::StressLauncher`] adapter clears that before starting anything.

pub mod launcher;

use anyhow::Context;
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

pub use launcher::StressLauncher;

/// A started background process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub command: String,
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

/// Command ready to hand to a [`ProcessSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub parent_death_signal: Option<Signal>,
    pub own_process_group: bool,
    pub log_file: Option<PathBuf>,
}

impl SupervisedCommand {
    /// Invocation summary in shell-like form.
    pub fn summary(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> io::Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());

        match &self.log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let out = OpenOptions::new().create(true).append(true).open(path)?;
                let err = out.try_clone()?;
                cmd.stdout(out).stderr(err);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        if self.own_process_group {
            cmd.process_group(0);
        }

        #[cfg(target_os = "linux")]
        if let Some(signal) = self.parent_death_signal {
            // SAFETY: prctl is async-signal-safe and touches no parent state.
            unsafe {
                cmd.pre_exec(move || {
                    nix::sys::prctl::set_pdeathsig(signal).map_err(io::Error::from)
                });
            }
        }

        Ok(cmd)
    }
}

/// Builder with the defaults of a plain background process.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    command: SupervisedCommand,
}

impl ProcessBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            command: SupervisedCommand {
                program: program.into(),
                args: Vec::new(),
                parent_death_signal: Some(Signal::SIGTERM),
                own_process_group: false,
                log_file: None,
            },
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn log_file(mut self, path: Option<PathBuf>) -> Self {
        self.command.log_file = path;
        self
    }

    /// Detach from the agent: no parent-death signal, separate process group.
    pub fn without_parent_death_signal(mut self) -> Self {
        self.command.parent_death_signal = None;
        self.command.own_process_group = true;
        self
    }

    pub fn build(self) -> SupervisedCommand {
        self.command
    }
}

/// Starts processes and keeps track of them while they run.
pub trait ProcessSupervisor {
    fn start_process(&self, command: SupervisedCommand) -> io::Result<ProcessHandle>;
}

/// Supervisor that reaps each child on a waiter thread.
#[derive(Debug, Default, Clone)]
pub struct BackgroundProcessManager {
    running: Arc<Mutex<HashMap<u32, String>>>,
}

impl BackgroundProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pids of children started here that have not exited yet.
    pub fn tracked(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = match self.running.lock() {
            Ok(running) => running.keys().copied().collect(),
            Err(poisoned) => poisoned.into_inner().keys().copied().collect(),
        };
        pids.sort_unstable();
        pids
    }

    /// Command line of a child that is still running.
    pub fn command(&self, pid: u32) -> Option<String> {
        match self.running.lock() {
            Ok(running) => running.get(&pid).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&pid).cloned(),
        }
    }

    fn watch(&self, mut child: Child, summary: String) -> anyhow::Result<()> {
        let pid = child.id();
        self.track(pid, summary);
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || {
                let result = child.wait();
                let command = match running.lock() {
                    Ok(mut running) => running.remove(&pid),
                    Err(poisoned) => poisoned.into_inner().remove(&pid),
                }
                .unwrap_or_default();
                match result {
                    Ok(status) => {
                        tracing::debug!(pid, %status, command = %command, "background process exited")
                    }
                    Err(err) => tracing::warn!(
                        pid,
                        command = %command,
                        error = %err,
                        "waiting on background process failed"
                    ),
                }
            })
            .context("spawning reaper thread")?;
        Ok(())
    }

    fn track(&self, pid: u32, summary: String) {
        match self.running.lock() {
            Ok(mut running) => {
                running.insert(pid, summary);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(pid, summary);
            }
        }
    }
}

impl ProcessSupervisor for BackgroundProcessManager {
    fn start_process(&self, command: SupervisedCommand) -> io::Result<ProcessHandle> {
        let summary = command.summary();
        let child = command.to_command()?.spawn()?;
        let pid = child.id();
        // Without a reaper the child still runs; it is reparented once we exit.
        if let Err(err) = self.watch(child, summary.clone()) {
            tracing::warn!(pid, error = %err, "background process is not being reaped");
        }
        Ok(ProcessHandle {
            pid,
            command: summary,
        })
    }
}
