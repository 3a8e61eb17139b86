// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error taxonomy for the attack lifecycle

use crate::inspect::InspectError;
use crate::storage::StoreError;
use crate::types::StressAction;

/// Process exit code for bad arguments.
pub const EXIT_BAD_ARGS: u8 = 2;
/// Process exit code for execution failures.
pub const EXIT_ERROR: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid uid {0:?}: must be a single path component")]
    InvalidUid(String),

    #[error("attack already injected (pid {pid})")]
    AlreadyInjected { pid: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    #[error("missing stressors: neither percentage nor memory stressor is populated")]
    MissingStressor,
}

#[derive(Debug, thiserror::Error)]
pub enum AttackError {
    #[error("invalid attack {uid:?}: {source}")]
    Validation {
        uid: String,
        #[source]
        source: ValidationError,
    },

    #[error("cannot normalize {action:?} attack {uid:?}: {source}")]
    Normalization {
        uid: String,
        action: Option<StressAction>,
        #[source]
        source: NormalizationError,
    },

    #[error("failed to launch {tool} for attack {uid:?}: {source}")]
    Launch {
        uid: String,
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to recover attack {uid:?} (pid {pid}): {source}")]
    RecoverFailed {
        uid: String,
        pid: u32,
        #[source]
        source: InspectError,
    },

    #[error("attack {uid:?} has no recorded process handle")]
    MissingHandle { uid: String },
}

impl AttackError {
    pub fn is_bad_args(&self) -> bool {
        matches!(
            self,
            AttackError::Validation { .. } | AttackError::MissingHandle { .. }
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_bad_args() {
            EXIT_BAD_ARGS
        } else {
            EXIT_ERROR
        }
    }
}

/// Errors surfaced by the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Attack(#[from] AttackError),

    #[error("experiment store: {0}")]
    Store(#[from] StoreError),
}

impl ServerError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ServerError::Attack(err) => err.exit_code(),
            ServerError::Store(
                StoreError::NotFound(_) | StoreError::AlreadyExists(_) | StoreError::InvalidUid(_),
            ) => EXIT_BAD_ARGS,
            ServerError::Store(_) => EXIT_ERROR,
        }
    }
}
