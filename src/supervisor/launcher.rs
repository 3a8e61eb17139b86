// SPDX-License-Identifier: PMPL-1.0-or-later

//! Adapter that starts stress tools detached from the agent

use super::{ProcessBuilder, ProcessHandle, ProcessSupervisor};
use std::io;
use std::path::PathBuf;

pub struct StressLauncher<S> {
    supervisor: S,
    output_dir: Option<PathBuf>,
}

impl<S: ProcessSupervisor> StressLauncher<S> {
    pub fn new(supervisor: S) -> Self {
        Self {
            supervisor,
            output_dir: None,
        }
    }

    /// Write tool output to `<dir>/<tag>.log` instead of discarding it.
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    /// Start `tool` with `args`. Start failures are returned as-is, never retried.
    pub fn launch(&self, tool: &str, args: &[String], tag: &str) -> io::Result<ProcessHandle> {
        let log_file = self
            .output_dir
            .as_ref()
            .map(|dir| dir.join(format!("{tag}.log")));
        let command = ProcessBuilder::new(tool)
            .args(args.iter().cloned())
            .log_file(log_file)
            .without_parent_death_signal()
            .build();
        self.supervisor.start_process(command)
    }
}
