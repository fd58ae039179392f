//! Checkpointed dataset of accepted instances.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::instance::{DedupKey, Instance};
use crate::errors::{Error, Result};

/// Accepted instances backed by a JSON array on disk.
///
/// The file is rewritten in full on every checkpoint, through a temporary
/// sibling that is renamed over the target.
#[derive(Debug)]
pub struct InstanceStore {
    path: PathBuf,
    instances: Vec<Instance>,
    ids: HashSet<String>,
}

impl InstanceStore {
    /// Open the dataset at `path`; a missing file is an empty dataset.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let instances: Vec<Instance> = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::InvalidRecord(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io_at(&path, e)),
        };

        let mut store = Self {
            path,
            instances: Vec::with_capacity(instances.len()),
            ids: HashSet::new(),
        };
        for instance in instances {
            if !store.push(instance) {
                log::warn!("Dropping duplicate record in {}", store.path.display());
            }
        }
        if !store.is_empty() {
            log::info!(
                "Resuming with {} instance(s) from {}",
                store.len(),
                store.path.display()
            );
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.ids.contains(instance_id)
    }

    /// Append unless an instance with the same id is already stored.
    pub fn push(&mut self, instance: Instance) -> bool {
        if !self.ids.insert(instance.instance_id.clone()) {
            return false;
        }
        self.instances.push(instance);
        true
    }

    /// Pairs already represented in the dataset.
    pub fn dedup_keys(&self) -> impl Iterator<Item = DedupKey> + '_ {
        self.instances.iter().map(Instance::dedup_key)
    }

    /// Persist the whole dataset.
    pub fn checkpoint(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.instances)?;
        log::debug!(
            "Checkpointed {} instance(s) to {}",
            self.instances.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Serialize `value` into `path` via a temporary file and a rename.
pub(crate) fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset");
    let temp = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));

    let json = serde_json::to_string_pretty(value)?;
    fs::write(&temp, json).map_err(|e| Error::io_at(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        Error::io_at(path, e)
    })
}
