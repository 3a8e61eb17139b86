// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core type definitions for gpu-attack
//!
//! An [`AttackSpecification`] is the single source of truth for one attack. It is
//! serialised as a flat JSON object and handed to the experiment store, which is
//! how recovery later finds the recorded process handle again.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind string shared by every GPU stress attack.
pub const NV_GPU_ATTACK: &str = "nv-gpu-stress";

/// Default burn time in seconds for percentage stress.
pub const DEFAULT_BURN_SECS: u32 = 300;

/// Stressor mode of an attack. Exactly one is active per specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StressAction {
    #[serde(rename = "perc")]
    Percentage,
    #[serde(rename = "mem")]
    Memory,
}

impl StressAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StressAction::Percentage => "perc",
            StressAction::Memory => "mem",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "perc" | "percentage" => Some(StressAction::Percentage),
            "mem" | "memory" => Some(StressAction::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for StressAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields every attack kind carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonAttackConfig {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub uid: String,
}

impl CommonAttackConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.kind.trim().is_empty() {
            return Err(ValidationError::MissingField("kind"));
        }
        if !self.uid.is_empty() {
            check_uid(&self.uid)?;
        }
        Ok(())
    }
}

/// Uids name files in the state directory, so they must be a single plain path component.
pub fn check_uid(uid: &str) -> Result<(), ValidationError> {
    let bad = uid.is_empty()
        || uid == "."
        || uid.contains("..")
        || uid.contains(['/', '\\', '\0']);
    if bad {
        return Err(ValidationError::InvalidUid(uid.to_string()));
    }
    Ok(())
}

/// Declarative description of one GPU stress attack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSpecification {
    #[serde(flatten)]
    pub common: CommonAttackConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<StressAction>,

    /// Stress workers to request; zero disables the stressor.
    #[serde(default)]
    pub workers: u32,

    /// Target GPU index; `None` lets the tool pick.
    #[serde(default, rename = "gpu-id", skip_serializing_if = "Option::is_none")]
    pub gpu_id: Option<u32>,

    /// Burn time in seconds (percentage stress).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,

    /// Memory to consume (memory stress), e.g. `512` or `80%`. Never parsed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Pass-through arguments appended to the tool invocation, split on whitespace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    /// Pid of the launched stress process, written once after a successful launch.
    #[serde(default, rename = "gpu-burn-pid", skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl AttackSpecification {
    pub fn new(action: StressAction) -> Self {
        Self {
            common: CommonAttackConfig {
                kind: NV_GPU_ATTACK.to_string(),
                uid: String::new(),
            },
            action: Some(action),
            ..Self::default()
        }
    }

    pub fn uid(&self) -> &str {
        &self.common.uid
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.common.validate()?;
        if self.action.is_none() {
            return Err(ValidationError::MissingField("action"));
        }
        Ok(())
    }

    /// Fill unset numeric fields with mode-appropriate defaults. Idempotent.
    pub fn complete_defaults(&mut self) {
        if self.workers == 0 {
            self.workers = 1;
        }
        if self.action == Some(StressAction::Percentage) && self.time.is_none() {
            self.time = Some(DEFAULT_BURN_SECS);
        }
    }

    /// Flat JSON form handed to the experiment store.
    pub fn recover_data(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_recover_data(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

/// Lifecycle status of a persisted experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentStatus {
    Pending,
    Running,
    Failed,
    Recovered,
    RecoverFailed,
}

impl ExperimentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperimentStatus::Pending => "pending",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Failed => "failed",
            ExperimentStatus::Recovered => "recovered",
            ExperimentStatus::RecoverFailed => "recover-failed",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted experiment: status bookkeeping around one specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub uid: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<StressAction>,
    pub status: ExperimentStatus,
    pub recover_data: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ExperimentRecord {
    pub fn new(spec: &AttackSpecification) -> serde_json::Result<Self> {
        let now = chrono::Utc::now().to_rfc3339();
        Ok(Self {
            uid: spec.common.uid.clone(),
            kind: spec.common.kind.clone(),
            action: spec.action,
            status: ExperimentStatus::Pending,
            recover_data: spec.recover_data()?,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn specification(&self) -> serde_json::Result<AttackSpecification> {
        AttackSpecification::from_recover_data(&self.recover_data)
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
