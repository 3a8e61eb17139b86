// SPDX-License-Identifier: PMPL-1.0-or-later

//! Agent configuration loading.

use crate::attack::stressors::ToolFlags;
use anyhow::{anyhow, Context, Result};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_ENV: &str = "GPU_ATTACK_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Binary to execute.
    pub binary: String,
    /// Substring a process name must contain to be treated as ours at recovery.
    pub identity: String,
    pub flags: ToolFlags,
    /// Signal sent on recovery, e.g. `SIGKILL` or `SIGTERM`.
    pub recover_signal: String,
    /// Directory for per-attack tool output; output is discarded when unset.
    pub output_dir: Option<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: "gpu_burn".to_string(),
            identity: "gpu_burn".to_string(),
            flags: ToolFlags::default(),
            recover_signal: "SIGKILL".to_string(),
            output_dir: None,
        }
    }
}

impl ToolConfig {
    pub fn signal(&self) -> Result<Signal> {
        Signal::from_str(self.recover_signal.trim())
            .map_err(|_| anyhow!("unknown recover signal {:?}", self.recover_signal))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub state_dir: PathBuf,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub tool: ToolConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/gpu-attack"),
            log_filter: "info".to_string(),
            tool: ToolConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading agent config {}", path.display()))?;
        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("parsing json agent config {}", path.display()))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("parsing yaml agent config {}", path.display()))?,
            _ => {
                return Err(anyhow!(
                    "unsupported agent config extension for {}",
                    path.display()
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Explicit path first, then `GPU_ATTACK_CONFIG`, then defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tool.binary.trim().is_empty() {
            return Err(anyhow!("tool.binary must not be empty"));
        }
        if self.tool.identity.trim().is_empty() {
            return Err(anyhow!("tool.identity must not be empty"));
        }
        self.tool.signal()?;
        Ok(())
    }
}
