// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack lifecycle engine: inject and recover.
//!
//! The engine does no logging. Every decision it makes is visible in the value
//! it returns, and the caller decides what to report.

use crate::attack::stressors::{Stressors, ToolFlags};
use crate::error::{AttackError, ValidationError};
use crate::inspect::{InspectError, ProcessInfo, ProcessInspector};
use crate::supervisor::{ProcessHandle, ProcessSupervisor, StressLauncher};
use crate::types::AttackSpecification;

/// Tool settings the engine needs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tool: String,
    pub identity: String,
    pub flags: ToolFlags,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tool: "gpu_burn".to_string(),
            identity: "gpu_burn".to_string(),
            flags: ToolFlags::default(),
        }
    }
}

/// A successful injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub handle: ProcessHandle,
    pub arguments: String,
}

/// How a recovery concluded. All variants are successes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverOutcome {
    Terminated { pid: u32 },
    AlreadyGone { pid: u32 },
    /// The pid now belongs to something else; nothing was signalled.
    NotStressTool { pid: u32, name: String },
}

pub struct AttackEngine<S, I> {
    launcher: StressLauncher<S>,
    inspector: I,
    settings: EngineSettings,
}

impl<S, I> AttackEngine<S, I>
where
    S: ProcessSupervisor,
    I: ProcessInspector,
{
    pub fn new(launcher: StressLauncher<S>, inspector: I, settings: EngineSettings) -> Self {
        Self {
            launcher,
            inspector,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Launch the stress tool and record its pid into `spec`.
    ///
    /// `spec.pid` is only written after the supervisor confirms the start.
    pub fn inject(&self, spec: &mut AttackSpecification) -> Result<Injection, AttackError> {
        let uid = spec.uid().to_string();
        let invalid = |source| AttackError::Validation {
            uid: uid.clone(),
            source,
        };

        if let Some(pid) = spec.pid {
            return Err(invalid(ValidationError::AlreadyInjected { pid }));
        }
        spec.complete_defaults();
        spec.validate().map_err(invalid)?;
        let Some(action) = spec.action else {
            return Err(invalid(ValidationError::MissingField("action")));
        };

        let args = Stressors::from_spec(spec)
            .normalize(&self.settings.flags)
            .map_err(|source| AttackError::Normalization {
                uid: uid.clone(),
                action: spec.action,
                source,
            })?
            .select(action);
        let arguments = args.to_string();

        let tag = if uid.is_empty() {
            format!("{}-{}", self.settings.tool, action)
        } else {
            uid.clone()
        };
        let handle = self
            .launcher
            .launch(&self.settings.tool, args.as_slice(), &tag)
            .map_err(|source| AttackError::Launch {
                uid: uid.clone(),
                tool: self.settings.tool.clone(),
                source,
            })?;

        spec.pid = Some(handle.pid);
        Ok(Injection { handle, arguments })
    }

    /// Terminate the process recorded in `spec`, if it is still ours.
    ///
    /// Safe to repeat: a vanished process counts as recovered.
    pub fn recover(&self, spec: &AttackSpecification) -> Result<RecoverOutcome, AttackError> {
        let uid = spec.uid();
        let pid = spec.pid.ok_or_else(|| AttackError::MissingHandle {
            uid: uid.to_string(),
        })?;
        let failed = |source| AttackError::RecoverFailed {
            uid: uid.to_string(),
            pid,
            source,
        };

        let process = match self.inspector.find_process(pid) {
            Ok(process) => process,
            Err(InspectError::NotFound(_)) => return Ok(RecoverOutcome::AlreadyGone { pid }),
            Err(err) => return Err(failed(err)),
        };

        let name = match process.name() {
            Ok(name) => name,
            Err(InspectError::NotFound(_)) => return Ok(RecoverOutcome::AlreadyGone { pid }),
            Err(err) => return Err(failed(err)),
        };
        if !name.contains(&self.settings.identity) {
            return Ok(RecoverOutcome::NotStressTool { pid, name });
        }

        match process.terminate() {
            Ok(()) => Ok(RecoverOutcome::Terminated { pid }),
            Err(InspectError::NotFound(_)) => Ok(RecoverOutcome::AlreadyGone { pid }),
            Err(err) => Err(failed(err)),
        }
    }
}
