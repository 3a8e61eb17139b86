// SPDX-License-Identifier: PMPL-1.0-or-later

//! Stressor payloads and argument normalisation for gpu_burn

use crate::error::NormalizationError;
use crate::types::{AttackSpecification, StressAction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flag spellings of the external stress tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolFlags {
    /// `None` omits the worker count (stock gpu_burn has no such flag).
    pub workers: Option<String>,
    /// `None` passes the burn time positionally.
    pub time: Option<String>,
    pub size: String,
    pub device: String,
}

impl Default for ToolFlags {
    fn default() -> Self {
        Self {
            workers: Some("-w".to_string()),
            time: None,
            size: "-m".to_string(),
            device: "-i".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentageStressor {
    pub workers: u32,
    pub time: Option<u32>,
    pub gpu_id: Option<u32>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStressor {
    pub workers: u32,
    pub size: Option<String>,
    pub gpu_id: Option<u32>,
    pub options: Vec<String>,
}

/// Envelope holding at most one populated payload per mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stressors {
    pub percentage: Option<PercentageStressor>,
    pub memory: Option<MemoryStressor>,
}

impl Stressors {
    /// Populate the payload selected by the specification's action.
    pub fn from_spec(spec: &AttackSpecification) -> Self {
        match spec.action {
            Some(StressAction::Percentage) => Self {
                percentage: Some(PercentageStressor {
                    workers: spec.workers,
                    time: spec.time,
                    gpu_id: spec.gpu_id,
                    options: spec.options.clone(),
                }),
                memory: None,
            },
            Some(StressAction::Memory) => Self {
                percentage: None,
                memory: Some(MemoryStressor {
                    workers: spec.workers,
                    size: spec.size.clone(),
                    gpu_id: spec.gpu_id,
                    options: spec.options.clone(),
                }),
            },
            None => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<(), NormalizationError> {
        if self.percentage.is_none() && self.memory.is_none() {
            return Err(NormalizationError::MissingStressor);
        }
        Ok(())
    }

    /// Build both argument fragments. A stressor with zero workers yields an
    /// empty fragment.
    pub fn normalize(&self, flags: &ToolFlags) -> Result<NormalizedStressors, NormalizationError> {
        self.validate()?;

        let mut percentage = StressorArgs::default();
        if let Some(stressor) = self.percentage.as_ref().filter(|s| s.workers != 0) {
            percentage.push_workers(flags, stressor.workers);
            if let Some(time) = stressor.time {
                if let Some(flag) = &flags.time {
                    percentage.push(flag);
                }
                percentage.push(time.to_string());
            }
            percentage.push_device(flags, stressor.gpu_id);
            percentage.extend(&stressor.options);
        }

        let mut memory = StressorArgs::default();
        if let Some(stressor) = self.memory.as_ref().filter(|s| s.workers != 0) {
            memory.push_workers(flags, stressor.workers);
            if let Some(size) = stressor.size.as_deref().filter(|s| !s.is_empty()) {
                memory.push(&flags.size);
                memory.push(size);
            }
            memory.push_device(flags, stressor.gpu_id);
            memory.extend(&stressor.options);
        }

        Ok(NormalizedStressors { percentage, memory })
    }
}

/// Both fragments produced by [`Stressors::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedStressors {
    pub percentage: StressorArgs,
    pub memory: StressorArgs,
}

impl NormalizedStressors {
    pub fn select(self, action: StressAction) -> StressorArgs {
        match action {
            StressAction::Percentage => self.percentage,
            StressAction::Memory => self.memory,
        }
    }
}

/// Argument vector for one stressor; displays as the space-joined string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StressorArgs(Vec<String>);

impl StressorArgs {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, arg: impl Into<String>) {
        self.0.push(arg.into());
    }

    /// Options are split on whitespace, so `-c compare.ptx` becomes two arguments.
    fn extend(&mut self, options: &[String]) {
        self.0
            .extend(options.iter().flat_map(|o| o.split_whitespace()).map(String::from));
    }

    fn push_workers(&mut self, flags: &ToolFlags, workers: u32) {
        if let Some(flag) = &flags.workers {
            self.push(flag);
            self.push(workers.to_string());
        }
    }

    fn push_device(&mut self, flags: &ToolFlags, gpu_id: Option<u32>) {
        if let Some(id) = gpu_id {
            self.push(&flags.device);
            self.push(id.to_string());
        }
    }
}

impl fmt::Display for StressorArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percentage_spec() -> AttackSpecification {
        let mut spec = AttackSpecification::new(StressAction::Percentage);
        spec.workers = 4;
        spec.gpu_id = Some(0);
        spec.time = Some(60);
        spec.options = vec!["--foo".to_string()];
        spec
    }

    #[test]
    fn percentage_fragment_follows_field_order() {
        let args = Stressors::from_spec(&percentage_spec())
            .normalize(&ToolFlags::default())
            .expect("normalize")
            .select(StressAction::Percentage);
        assert_eq!(args.to_string(), "-w 4 60 -i 0 --foo");
        for token in ["4", "0", "60", "--foo"] {
            assert_eq!(
                args.as_slice().iter().filter(|a| a.as_str() == token).count(),
                1,
                "{token} should appear exactly once"
            );
        }
    }

    #[test]
    fn memory_size_passes_through_verbatim() {
        let mut spec = AttackSpecification::new(StressAction::Memory);
        spec.workers = 1;
        spec.size = Some("80%".to_string());
        spec.gpu_id = Some(2);
        let args = Stressors::from_spec(&spec)
            .normalize(&ToolFlags::default())
            .expect("normalize")
            .select(StressAction::Memory);
        assert_eq!(args.as_slice(), ["-w", "1", "-m", "80%", "-i", "2"]);
    }

    #[test]
    fn unselected_fragment_is_empty() {
        let normalized = Stressors::from_spec(&percentage_spec())
            .normalize(&ToolFlags::default())
            .expect("normalize");
        assert!(normalized.memory.is_empty());
    }

    #[test]
    fn zero_workers_disables_stressor() {
        let mut spec = percentage_spec();
        spec.workers = 0;
        let args = Stressors::from_spec(&spec)
            .normalize(&ToolFlags::default())
            .expect("normalize")
            .select(StressAction::Percentage);
        assert!(args.is_empty());
    }

    #[test]
    fn missing_payloads_fail_for_either_action() {
        let err = Stressors::default().normalize(&ToolFlags::default());
        assert_eq!(err, Err(NormalizationError::MissingStressor));

        let mut spec = percentage_spec();
        spec.action = None;
        assert_eq!(
            Stressors::from_spec(&spec).normalize(&ToolFlags::default()),
            Err(NormalizationError::MissingStressor)
        );
    }

    #[test]
    fn stock_gpu_burn_flags_omit_workers() {
        let flags = ToolFlags {
            workers: None,
            ..ToolFlags::default()
        };
        let args = Stressors::from_spec(&percentage_spec())
            .normalize(&flags)
            .expect("normalize")
            .select(StressAction::Percentage);
        assert_eq!(args.to_string(), "60 -i 0 --foo");
    }

    #[test]
    fn options_are_split_into_separate_arguments() {
        let mut spec = percentage_spec();
        spec.options = vec!["-c compare.ptx".to_string(), "  -d ".to_string()];
        let args = Stressors::from_spec(&spec)
            .normalize(&ToolFlags::default())
            .expect("normalize")
            .select(StressAction::Percentage);
        assert_eq!(
            args.as_slice(),
            ["-w", "4", "60", "-i", "0", "-c", "compare.ptx", "-d"]
        );
    }
}
