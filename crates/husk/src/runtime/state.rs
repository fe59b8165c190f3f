//! Container record persistence.

use husk_common::store::{read_json, write_json_atomic};
use husk_common::{ContainerRecord, HuskError, HuskPaths, HuskResult};

/// Stores one [`ContainerRecord`] per container name.
#[derive(Debug, Clone)]
pub struct RecordStore {
    paths: HuskPaths,
}

impl RecordStore {
    /// Create a new record store.
    #[must_use]
    pub const fn new(paths: HuskPaths) -> Self {
        Self { paths }
    }

    /// Save a record, replacing any previous one with the same name.
    pub fn save(&self, record: &ContainerRecord) -> HuskResult<()> {
        let path = self.paths.container_config(&record.name);
        write_json_atomic(&path, record)?;

        tracing::debug!(
            container = %record.name,
            status = %record.status,
            path = %path.display(),
            "Saved container record"
        );
        Ok(())
    }

    /// Load the record of container `name`.
    pub fn load(&self, name: &str) -> HuskResult<ContainerRecord> {
        let path = self.paths.container_config(name);
        if !path.exists() {
            return Err(HuskError::ContainerNotFound {
                name: name.to_string(),
            });
        }
        read_json(&path)
    }

    /// Delete the metadata directory of container `name`.
    pub fn delete(&self, name: &str) -> HuskResult<()> {
        let dir = self.paths.container(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            tracing::debug!(container = name, path = %dir.display(), "Deleted container record");
        }
        Ok(())
    }

    /// Names of all containers with a record, sorted.
    pub fn names(&self) -> HuskResult<Vec<String>> {
        let dir = self.paths.containers();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.path().join(husk_common::paths::CONFIG_NAME).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Every readable record. Broken ones are skipped with a warning.
    pub fn list(&self) -> HuskResult<Vec<ContainerRecord>> {
        let mut records = Vec::new();
        for name in self.names()? {
            match self.load(&name) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(container = %name, error = %e, "Skipping unreadable record"),
            }
        }
        Ok(records)
    }

    /// Check if a record exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.paths.container_config(name).exists()
    }
}
