// SPDX-License-Identifier: PMPL-1.0-or-later

//! gpu-attack: single-host GPU fault injection.
//!
//! Launches `gpu_burn` as a detached background process from a declarative
//! [`types::AttackSpecification`], remembers its pid, and later recovers the
//! attack by terminating that process and only that process.
//!
//! LAYERS:
//! 1. **Stressors**: turn a specification into tool arguments.
//! 2. **Supervisor**: start the tool detached from the agent's own lifetime.
//! 3. **Engine**: inject, and identity-checked, idempotent recover.
//! 4. **Server**: persist experiment records around the engine and log results.

pub mod attack;
pub mod config;
pub mod error;
pub mod inspect;
pub mod report;
pub mod server;
pub mod storage;
pub mod supervisor;
pub mod types;
