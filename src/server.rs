// SPDX-License-Identifier: PMPL-1.0-or-later

//! Experiment-level orchestration: persist, inject, recover, and report.

use crate::attack::{AttackEngine, RecoverOutcome};
use crate::error::{AttackError, ServerError};
use crate::inspect::ProcessInspector;
use crate::storage::{ExperimentStore, StoreError};
use crate::supervisor::ProcessSupervisor;
use crate::types::{AttackSpecification, ExperimentRecord, ExperimentStatus};
use tracing::{error, info, warn};

pub struct AttackServer<S, I, St> {
    engine: AttackEngine<S, I>,
    store: St,
}

impl<S, I, St> AttackServer<S, I, St>
where
    S: ProcessSupervisor,
    I: ProcessInspector,
    St: ExperimentStore,
{
    pub fn new(engine: AttackEngine<S, I>, store: St) -> Self {
        Self { engine, store }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Persist and launch `spec`; returns the experiment uid.
    pub fn execute_attack(&self, mut spec: AttackSpecification) -> Result<String, ServerError> {
        if spec.common.uid.trim().is_empty() {
            spec.common.uid = uuid::Uuid::new_v4().to_string();
        }
        spec.complete_defaults();
        let uid = spec.common.uid.clone();
        spec.common
            .validate()
            .map_err(|source| AttackError::Validation {
                uid: uid.clone(),
                source,
            })?;

        let record = ExperimentRecord::new(&spec).map_err(StoreError::from)?;
        self.store.insert_new(&record)?;

        match self.engine.inject(&mut spec) {
            Ok(injection) => {
                info!(
                    uid = %uid,
                    action = ?spec.action,
                    arguments = %injection.arguments,
                    command = %injection.handle,
                    pid = injection.handle.pid,
                    "started {} process",
                    self.engine.settings().tool
                );
                if let Err(err) = self.store.record_process_handle(&uid, injection.handle.pid) {
                    error!(
                        uid = %uid,
                        pid = injection.handle.pid,
                        error = %err,
                        "cannot persist process handle, stopping the stress process"
                    );
                    self.abandon(&uid, &spec);
                    return Err(err.into());
                }
                Ok(uid)
            }
            Err(err) => {
                error!(uid = %uid, action = ?spec.action, error = %err, "attack failed");
                self.store.set_status(&uid, ExperimentStatus::Failed)?;
                Err(err.into())
            }
        }
    }

    /// Stop a process whose handle never reached the store and mark the attack failed.
    fn abandon(&self, uid: &str, spec: &AttackSpecification) {
        match self.engine.recover(spec) {
            Ok(outcome) => warn!(uid = %uid, outcome = ?outcome, "untracked stress process recovered"),
            Err(err) => error!(uid = %uid, pid = ?spec.pid, error = %err, "stress process left running"),
        }
        if let Err(err) = self.store.set_status(uid, ExperimentStatus::Failed) {
            warn!(uid = %uid, error = %err, "cannot mark attack failed");
        }
    }

    /// Recover the experiment `uid` from its persisted process handle.
    pub fn recover_attack(&self, uid: &str) -> Result<RecoverOutcome, ServerError> {
        let spec = self.store.get_attack_specification(uid)?;
        info!(uid = %uid, pid = ?spec.pid, "recovering attack");

        match self.engine.recover(&spec) {
            Ok(outcome) => {
                match &outcome {
                    RecoverOutcome::Terminated { pid } => {
                        info!(uid = %uid, pid, "stress process terminated")
                    }
                    RecoverOutcome::AlreadyGone { pid } => {
                        warn!(uid = %uid, pid, "stress process already exited")
                    }
                    RecoverOutcome::NotStressTool { pid, name } => warn!(
                        uid = %uid,
                        pid,
                        name = %name,
                        "process is not {}, maybe it was killed manually",
                        self.engine.settings().identity
                    ),
                }
                self.store.set_status(uid, ExperimentStatus::Recovered)?;
                Ok(outcome)
            }
            Err(err) => {
                error!(uid = %uid, error = %err, "recover failed");
                if err.is_bad_args() {
                    return Err(err.into());
                }
                self.store.set_status(uid, ExperimentStatus::RecoverFailed)?;
                Err(err.into())
            }
        }
    }

    pub fn list_attacks(&self) -> Result<Vec<ExperimentRecord>, ServerError> {
        Ok(self.store.list()?)
    }
}
