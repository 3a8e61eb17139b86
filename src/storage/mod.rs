// SPDX-License-Identifier: PMPL-1.0-or-later

//! Persistent storage for experiment records

use crate::types::{check_uid, AttackSpecification, ExperimentRecord, ExperimentStatus};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("experiment {0:?} not found")]
    NotFound(String),

    #[error("experiment {0:?} already exists")]
    AlreadyExists(String),

    #[error("invalid experiment uid {0:?}")]
    InvalidUid(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed experiment record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Where attack records live between injection and recovery.
pub trait ExperimentStore {
    /// Create or overwrite the record for `record.uid`.
    fn insert(&self, record: &ExperimentRecord) -> Result<(), StoreError>;
    fn get(&self, uid: &str) -> Result<ExperimentRecord, StoreError>;
    fn list(&self) -> Result<Vec<ExperimentRecord>, StoreError>;

    /// Create the record, failing with [`StoreError::AlreadyExists`] if the uid is taken.
    fn insert_new(&self, record: &ExperimentRecord) -> Result<(), StoreError> {
        match self.get(&record.uid) {
            Ok(_) => Err(StoreError::AlreadyExists(record.uid.clone())),
            Err(StoreError::NotFound(_)) => self.insert(record),
            Err(err) => Err(err),
        }
    }
    fn get_attack_specification(&self, uid: &str) -> Result<AttackSpecification, StoreError> {
        Ok(self.get(uid)?.specification()?)
    }

    /// Store the launched pid and mark the experiment running, in one write.
    fn record_process_handle(&self, uid: &str, pid: u32) -> Result<(), StoreError> {
        let mut record = self.get(uid)?;
        let mut spec = record.specification()?;
        spec.pid = Some(pid);
        record.recover_data = spec.recover_data()?;
        record.status = ExperimentStatus::Running;
        record.touch();
        self.insert(&record)
    }

    fn set_status(&self, uid: &str, status: ExperimentStatus) -> Result<(), StoreError> {
        let mut record = self.get(uid)?;
        record.status = status;
        record.touch();
        self.insert(&record)
    }
}

/// One pretty-printed JSON file per experiment.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, uid: &str) -> Result<PathBuf, StoreError> {
        check_uid(uid).map_err(|_| StoreError::InvalidUid(uid.to_string()))?;
        Ok(self.dir.join(format!("{uid}.json")))
    }

    /// Serialise `record` next to its final path; returns both paths.
    fn write_tmp(&self, record: &ExperimentRecord) -> Result<(PathBuf, PathBuf), StoreError> {
        let path = self.path_for(&record.uid)?;
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, payload).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        Ok((tmp, path))
    }
}

impl ExperimentStore for FileStore {
    fn insert(&self, record: &ExperimentRecord) -> Result<(), StoreError> {
        let (tmp, path) = self.write_tmp(record)?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn insert_new(&self, record: &ExperimentRecord) -> Result<(), StoreError> {
        let (tmp, path) = self.write_tmp(record)?;
        // link(2) refuses to replace an existing file.
        let linked = fs::hard_link(&tmp, &path);
        if let Err(err) = fs::remove_file(&tmp) {
            tracing::warn!(path = %tmp.display(), error = %err, "leftover temporary record");
        }
        match linked {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(record.uid.clone()))
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn get(&self, uid: &str) -> Result<ExperimentRecord, StoreError> {
        let path = self.path_for(uid)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(uid.to_string()))
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn list(&self) -> Result<Vec<ExperimentRecord>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for path in entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !is_json {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            records.push(serde_json::from_str::<ExperimentRecord>(&content)?);
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

/// In-process store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ExperimentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExperimentRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ExperimentStore for MemoryStore {
    fn insert(&self, record: &ExperimentRecord) -> Result<(), StoreError> {
        self.lock().insert(record.uid.clone(), record.clone());
        Ok(())
    }

    fn insert_new(&self, record: &ExperimentRecord) -> Result<(), StoreError> {
        match self.lock().entry(record.uid.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(record.uid.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    fn get(&self, uid: &str) -> Result<ExperimentRecord, StoreError> {
        self.lock()
            .get(uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))
    }

    fn list(&self) -> Result<Vec<ExperimentRecord>, StoreError> {
        let mut records: Vec<_> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}
