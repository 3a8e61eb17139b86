// SPDX-License-Identifier: PMPL-1.0-or-later

//! OS process lookup and termination

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("process {pid}: {errno}")]
    Os { pid: u32, errno: Errno },
}

impl InspectError {
    fn from_errno(pid: u32, errno: Errno) -> Self {
        match errno {
            Errno::ESRCH => InspectError::NotFound(pid),
            errno => InspectError::Os { pid, errno },
        }
    }
}

/// A live process found by pid.
pub trait ProcessInfo {
    fn pid(&self) -> u32;
    fn name(&self) -> Result<String, InspectError>;
    fn terminate(&self) -> Result<(), InspectError>;
}

pub trait ProcessInspector {
    type Process: ProcessInfo;

    /// Fails with [`InspectError::NotFound`] when nothing runs under `pid`.
    fn find_process(&self, pid: u32) -> Result<Self::Process, InspectError>;
}

/// Inspector backed by the host process table.
#[derive(Debug, Clone, Copy)]
pub struct SystemInspector {
    signal: Signal,
}

impl SystemInspector {
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new(Signal::SIGKILL)
    }
}

#[derive(Debug, Clone)]
pub struct SystemProcess {
    pid: u32,
    name: String,
    signal: Signal,
}

impl ProcessInfo for SystemProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> Result<String, InspectError> {
        Ok(self.name.clone())
    }

    fn terminate(&self) -> Result<(), InspectError> {
        let raw = i32::try_from(self.pid).map_err(|_| InspectError::NotFound(self.pid))?;
        kill(nix::unistd::Pid::from_raw(raw), self.signal)
            .map_err(|errno| InspectError::from_errno(self.pid, errno))
    }
}

impl ProcessInspector for SystemInspector {
    type Process = SystemProcess;

    fn find_process(&self, pid: u32) -> Result<SystemProcess, InspectError> {
        if pid == 0 {
            return Err(InspectError::NotFound(pid));
        }
        let target = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        let process = system.process(target).ok_or(InspectError::NotFound(pid))?;
        // A zombie has already exited; only its table entry is left.
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return Err(InspectError::NotFound(pid));
        }

        Ok(SystemProcess {
            pid,
            name: process.name().to_string_lossy().into_owned(),
            signal: self.signal,
        })
    }
}
