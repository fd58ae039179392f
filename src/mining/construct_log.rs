//! Raw run log kept next to the dataset.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use super::instance::{Instance, TestType};
use super::store::write_json_atomic;
use crate::errors::{Error, Result};
use crate::execution::RawRun;

/// Both raw runs behind one accepted instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructRecord {
    pub log_id: usize,
    pub instance_id: String,
    pub commit: String,
    pub unit_name: String,
    pub unit_file: PathBuf,
    pub test_file: PathBuf,
    pub test_type: TestType,
    pub gold_run: RawRun,
    pub original_run: RawRun,
    /// RFC 3339, UTC
    pub recorded_at: String,
}

#[derive(Debug)]
pub struct ConstructLog {
    path: PathBuf,
    records: Vec<ConstructRecord>,
}

impl ConstructLog {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io_at(&path, e)),
        };
        Ok(Self { path, records })
    }

    pub fn records(&self) -> &[ConstructRecord] {
        &self.records
    }

    /// Append a record for `instance` and rewrite the log.
    pub fn record(&mut self, instance: &Instance, gold_run: &RawRun, original_run: &RawRun) -> Result<()> {
        self.records.push(ConstructRecord {
            log_id: self.records.len(),
            instance_id: instance.instance_id.clone(),
            commit: instance.commit.id.clone(),
            unit_name: instance.unit.name.clone(),
            unit_file: instance.unit.file_path.clone(),
            test_file: instance.test_file.clone(),
            test_type: instance.test_type,
            gold_run: gold_run.clone(),
            original_run: original_run.clone(),
            recorded_at: Utc::now().to_rfc3339(),
        });
        write_json_atomic(&self.path, &self.records)
    }
}
