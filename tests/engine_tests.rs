// SPDX-License-Identifier: PMPL-1.0-or-later

//! Inject/recover behaviour of the attack engine against stubbed OS collaborators

use gpu_attack::attack::{AttackEngine, EngineSettings, RecoverOutcome};
use gpu_attack::error::{AttackError, ValidationError};
use gpu_attack::inspect::{InspectError, ProcessInfo, ProcessInspector};
use gpu_attack::supervisor::{ProcessHandle, ProcessSupervisor, StressLauncher, SupervisedCommand};
use gpu_attack::types::{AttackSpecification, StressAction};
use nix::errno::Errno;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

/// Supervisor that hands out pids without starting anything.
#[derive(Default, Clone)]
struct FakeSupervisor {
    started: Arc<Mutex<Vec<SupervisedCommand>>>,
    fail_with: Option<io::ErrorKind>,
}

impl ProcessSupervisor for FakeSupervisor {
    fn start_process(&self, command: SupervisedCommand) -> io::Result<ProcessHandle> {
        if let Some(kind) = self.fail_with {
            return Err(io::Error::from(kind));
        }
        let mut started = self.started.lock().unwrap();
        let summary = command.summary();
        started.push(command);
        Ok(ProcessHandle {
            pid: 1000 + started.len() as u32,
            command: summary,
        })
    }
}

#[derive(Clone)]
enum Entry {
    Running(String),
    Protected(String),
}

/// Process table keyed by pid; terminate removes the entry.
#[derive(Default, Clone)]
struct FakeTable {
    entries: Arc<Mutex<HashMap<u32, Entry>>>,
    lookups: Arc<Mutex<usize>>,
    kills: Arc<Mutex<Vec<u32>>>,
    lookup_error: Option<InspectError>,
}

impl FakeTable {
    fn with(pid: u32, entry: Entry) -> Self {
        let table = Self::default();
        table.entries.lock().unwrap().insert(pid, entry);
        table
    }

    fn kills(&self) -> Vec<u32> {
        self.kills.lock().unwrap().clone()
    }

    fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

struct FakeProcess {
    pid: u32,
    table: FakeTable,
}

impl ProcessInfo for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> Result<String, InspectError> {
        match self.table.entries.lock().unwrap().get(&self.pid) {
            Some(Entry::Running(name)) | Some(Entry::Protected(name)) => Ok(name.clone()),
            None => Err(InspectError::NotFound(self.pid)),
        }
    }

    fn terminate(&self) -> Result<(), InspectError> {
        self.table.kills.lock().unwrap().push(self.pid);
        let mut entries = self.table.entries.lock().unwrap();
        match entries.get(&self.pid) {
            Some(Entry::Protected(_)) => Err(InspectError::Os {
                pid: self.pid,
                errno: Errno::EPERM,
            }),
            Some(Entry::Running(_)) => {
                entries.remove(&self.pid);
                Ok(())
            }
            None => Err(InspectError::NotFound(self.pid)),
        }
    }
}

impl ProcessInspector for FakeTable {
    type Process = FakeProcess;

    fn find_process(&self, pid: u32) -> Result<FakeProcess, InspectError> {
        *self.lookups.lock().unwrap() += 1;
        if let Some(err) = &self.lookup_error {
            return Err(err.clone());
        }
        if self.entries.lock().unwrap().contains_key(&pid) {
            Ok(FakeProcess {
                pid,
                table: self.clone(),
            })
        } else {
            Err(InspectError::NotFound(pid))
        }
    }
}

fn engine(
    supervisor: FakeSupervisor,
    table: FakeTable,
) -> AttackEngine<FakeSupervisor, FakeTable> {
    AttackEngine::new(
        StressLauncher::new(supervisor),
        table,
        EngineSettings::default(),
    )
}

fn percentage_spec() -> AttackSpecification {
    let mut spec = AttackSpecification::new(StressAction::Percentage);
    spec.common.uid = "perc-1".to_string();
    spec.workers = 4;
    spec.gpu_id = Some(0);
    spec.time = Some(60);
    spec.options = vec!["--foo".to_string()];
    spec
}

fn injected(pid: u32) -> AttackSpecification {
    let mut spec = percentage_spec();
    spec.pid = Some(pid);
    spec
}

#[test]
fn inject_records_pid_and_arguments() {
    let supervisor = FakeSupervisor::default();
    let engine = engine(supervisor.clone(), FakeTable::default());
    let mut spec = percentage_spec();

    let injection = engine.inject(&mut spec).expect("inject should succeed");

    assert_eq!(spec.pid, Some(injection.handle.pid));
    assert_eq!(injection.arguments, "-w 4 60 -i 0 --foo");
    assert_eq!(injection.handle.to_string(), "gpu_burn -w 4 60 -i 0 --foo");

    let started = supervisor.started.lock().unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].program, "gpu_burn");
    assert_eq!(started[0].parent_death_signal, None);
}

#[test]
fn inject_memory_attack_uses_size_flag() {
    let engine = engine(FakeSupervisor::default(), FakeTable::default());
    let mut spec = AttackSpecification::new(StressAction::Memory);
    spec.size = Some("75%".to_string());
    spec.gpu_id = Some(3);

    let injection = engine.inject(&mut spec).expect("inject should succeed");
    assert_eq!(injection.arguments, "-w 1 -m 75% -i 3");
    assert_eq!(spec.workers, 1);
}

#[test]
fn inject_without_action_is_validation_error() {
    let supervisor = FakeSupervisor::default();
    let engine = engine(supervisor.clone(), FakeTable::default());
    let mut spec = percentage_spec();
    spec.action = None;

    let err = engine.inject(&mut spec).expect_err("missing action must fail");
    assert!(matches!(
        err,
        AttackError::Validation {
            source: ValidationError::MissingField("action"),
            ..
        }
    ));
    assert!(supervisor.started.lock().unwrap().is_empty());
    assert_eq!(spec.pid, None);
}

#[test]
fn inject_twice_is_rejected() {
    let engine = engine(FakeSupervisor::default(), FakeTable::default());
    let mut spec = percentage_spec();
    engine.inject(&mut spec).expect("first inject");
    let pid = spec.pid;

    let err = engine.inject(&mut spec).expect_err("second inject must fail");
    assert!(matches!(
        err,
        AttackError::Validation {
            source: ValidationError::AlreadyInjected { .. },
            ..
        }
    ));
    assert_eq!(spec.pid, pid);
}

#[test]
fn launch_failure_leaves_handle_unset() {
    let supervisor = FakeSupervisor {
        fail_with: Some(io::ErrorKind::PermissionDenied),
        ..FakeSupervisor::default()
    };
    let engine = engine(supervisor, FakeTable::default());
    let mut spec = percentage_spec();

    let err = engine.inject(&mut spec).expect_err("launch must fail");
    match err {
        AttackError::Launch { tool, source, .. } => {
            assert_eq!(tool, "gpu_burn");
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("expected launch error, got {other:?}"),
    }
    assert_eq!(spec.pid, None);
}

#[test]
fn recover_terminates_matching_process() {
    let table = FakeTable::with(1234, Entry::Running("gpu_burn".to_string()));
    let engine = engine(FakeSupervisor::default(), table.clone());

    let outcome = engine.recover(&injected(1234)).expect("recover");
    assert_eq!(outcome, RecoverOutcome::Terminated { pid: 1234 });
    assert_eq!(table.kills(), vec![1234]);
}

#[test]
fn recover_twice_is_idempotent() {
    let table = FakeTable::with(1234, Entry::Running("gpu_burn".to_string()));
    let engine = engine(FakeSupervisor::default(), table.clone());
    let spec = injected(1234);

    assert_eq!(
        engine.recover(&spec).expect("first recover"),
        RecoverOutcome::Terminated { pid: 1234 }
    );
    assert_eq!(
        engine.recover(&spec).expect("second recover"),
        RecoverOutcome::AlreadyGone { pid: 1234 }
    );
    assert_eq!(table.kills(), vec![1234]);
}

#[test]
fn recover_leaves_recycled_pid_alone() {
    let table = FakeTable::with(1234, Entry::Running("postgres".to_string()));
    let engine = engine(FakeSupervisor::default(), table.clone());

    let outcome = engine.recover(&injected(1234)).expect("recover");
    assert_eq!(
        outcome,
        RecoverOutcome::NotStressTool {
            pid: 1234,
            name: "postgres".to_string()
        }
    );
    assert!(table.kills().is_empty());
}

#[test]
fn recover_without_handle_skips_lookup() {
    let table = FakeTable::default();
    let engine = engine(FakeSupervisor::default(), table.clone());

    let err = engine
        .recover(&percentage_spec())
        .expect_err("no handle must fail");
    assert!(matches!(err, AttackError::MissingHandle { ref uid } if uid == "perc-1"));
    assert_eq!(table.lookups(), 0);
}

#[test]
fn recover_surfaces_kill_rejection() {
    let table = FakeTable::with(1234, Entry::Protected("gpu_burn".to_string()));
    let engine = engine(FakeSupervisor::default(), table.clone());

    let err = engine.recover(&injected(1234)).expect_err("EPERM must fail");
    match err {
        AttackError::RecoverFailed { pid, source, .. } => {
            assert_eq!(pid, 1234);
            assert_eq!(
                source,
                InspectError::Os {
                    pid: 1234,
                    errno: Errno::EPERM
                }
            );
        }
        other => panic!("expected recover failure, got {other:?}"),
    }
    // Exactly one attempt; no automatic retry.
    assert_eq!(table.kills(), vec![1234]);
}

#[test]
fn recover_surfaces_other_lookup_errors() {
    let table = FakeTable {
        lookup_error: Some(InspectError::Os {
            pid: 1234,
            errno: Errno::EACCES,
        }),
        ..FakeTable::default()
    };
    let engine = engine(FakeSupervisor::default(), table);

    let err = engine.recover(&injected(1234)).expect_err("lookup must fail");
    assert!(matches!(err, AttackError::RecoverFailed { pid: 1234, .. }));
}

#[test]
fn inject_then_recover_round_trip() {
    let supervisor = FakeSupervisor::default();
    let table = FakeTable::default();
    let engine = engine(supervisor, table.clone());
    let mut spec = percentage_spec();

    let injection = engine.inject(&mut spec).expect("inject");
    table.entries.lock().unwrap().insert(
        injection.handle.pid,
        Entry::Running("gpu_burn".to_string()),
    );

    let reloaded =
        AttackSpecification::from_recover_data(&spec.recover_data().expect("serialize"))
            .expect("deserialize");
    assert_eq!(reloaded, spec);
    assert_eq!(
        engine.recover(&reloaded).expect("recover"),
        RecoverOutcome::Terminated {
            pid: injection.handle.pid
        }
    );
}
