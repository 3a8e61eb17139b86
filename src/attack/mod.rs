// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack orchestration module

pub mod engine;
pub mod stressors;

use crate::config::AgentConfig;
use crate::inspect::SystemInspector;
use crate::supervisor::{BackgroundProcessManager, StressLauncher};
use anyhow::Result;

pub use engine::{AttackEngine, EngineSettings, Injection, RecoverOutcome};
pub use stressors::{NormalizedStressors, StressorArgs, Stressors, ToolFlags};

/// Engine wired to the host: background supervisor plus process table.
pub type SystemEngine = AttackEngine<BackgroundProcessManager, SystemInspector>;

/// Build a host engine from agent configuration
pub fn system_engine(config: &AgentConfig) -> Result<SystemEngine> {
    let launcher = StressLauncher::new(BackgroundProcessManager::new())
        .with_output_dir(config.tool.output_dir.clone());
    let inspector = SystemInspector::new(config.tool.signal()?);
    let settings = EngineSettings {
        tool: config.tool.binary.clone(),
        identity: config.tool.identity.clone(),
        flags: config.tool.flags.clone(),
    };
    Ok(AttackEngine::new(launcher, inspector, settings))
}
