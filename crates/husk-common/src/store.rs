//! JSON file persistence.
//!
//! Records are written through a temporary file in the same directory and
//! renamed into place, so a reader never sees a half-written file. Shared
//! tables that are read, modified and written back go through
//! [`LockedStore`], which holds an exclusive `flock` for the whole cycle.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rustix::fs::{FlockOperation, flock};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{HuskError, HuskResult};

/// Read and decode a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> HuskResult<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Read a JSON file, or `None` if it does not exist.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> HuskResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Encode `value` and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> HuskResult<()> {
    let dir = path.parent().ok_or_else(|| HuskError::Internal {
        message: format!("{} has no parent directory", path.display()),
    })?;
    fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| HuskError::Io(e.error))?;

    tracing::trace!(path = %path.display(), "Wrote JSON file");
    Ok(())
}

/// A JSON file guarded by an advisory lock on a sibling `.lock` file.
#[derive(Debug, Clone)]
pub struct LockedStore {
    path: PathBuf,
}

impl LockedStore {
    /// Wrap the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn lock(&self) -> HuskResult<File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        flock(&file, FlockOperation::LockExclusive).map_err(|e| HuskError::Io(e.into()))?;
        Ok(file)
    }

    /// Load the current value, starting from `T::default()` when the file is
    /// missing.
    pub fn load<T: DeserializeOwned + Default>(&self) -> HuskResult<T> {
        let _guard = self.lock()?;
        Ok(read_json_opt(&self.path)?.unwrap_or_default())
    }

    /// Run a load, modify, save cycle under the lock.
    ///
    /// The value is only written back when `f` succeeds.
    pub fn update<T, R, F>(&self, f: F) -> HuskResult<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> HuskResult<R>,
    {
        let _guard = self.lock()?;
        let mut value: T = read_json_opt(&self.path)?.unwrap_or_default();
        let result = f(&mut value)?;
        write_json_atomic(&self.path, &value)?;
        Ok(result)
    }

    /// Delete the guarded file under the lock. Returns whether it existed.
    pub fn remove(&self) -> HuskResult<bool> {
        let _guard = self.lock()?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn atomic_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);

        write_json_atomic(&path, &vec![4]).unwrap();
        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![4]);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Vec<i32>> = read_json_opt(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn update_persists_on_success_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = LockedStore::new(dir.path().join("table.json"));

        store
            .update(|table: &mut BTreeMap<String, String>| {
                table.insert("a".into(), "1".into());
                Ok(())
            })
            .unwrap();

        let failed = store.update(|table: &mut BTreeMap<String, String>| {
            table.insert("b".into(), "2".into());
            Err::<(), _>(HuskError::config("abort"))
        });
        assert!(failed.is_err());

        let table: BTreeMap<String, String> = store.load().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table["a"], "1");
        assert!(dir.path().join("table.json.lock").exists());

        assert!(store.remove().unwrap());
        assert!(!store.remove().unwrap());
        let table: BTreeMap<String, String> = store.load().unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");

        std::thread::scope(|s| {
            for _ in 0..8 {
                let store = LockedStore::new(&path);
                s.spawn(move || {
                    for _ in 0..10 {
                        store
                            .update(|n: &mut u32| {
                                *n += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                });
            }
        });

        let total: u32 = LockedStore::new(&path).load().unwrap();
        assert_eq!(total, 80);
    }
}
