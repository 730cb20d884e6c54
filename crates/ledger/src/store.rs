//! On-disk ledger state.
//!
//! The whole [`LedgerState`] is rewritten on every mutation through a
//! temp file in the same directory followed by an atomic rename, so a
//! crash never leaves a half-written document behind.  An `fs2`
//! exclusive lock on a sibling `.lock` file keeps a second process from
//! driving the same ledger.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use lg_domain::error::{Error, Result};

use crate::state::LedgerState;

pub struct StateStore {
    path: PathBuf,
    _lock: File,
}

impl StateStore {
    /// Acquire the state file and load whatever it currently holds.
    ///
    /// A missing file yields an empty state.  A file that exists but
    /// cannot be parsed is an error: silently starting from zero would
    /// reset every quota.
    pub fn open(path: &Path) -> Result<(Self, LedgerState)> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_path = lock_path_for(path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(&lock_path)?;
        lock.try_lock_exclusive().map_err(|_| {
            Error::Persistence(format!(
                "ledger state {} is owned by another process",
                path.display()
            ))
        })?;

        let state = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<LedgerState>(&raw).map_err(|e| {
                Error::Persistence(format!("corrupt ledger state {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerState::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            path = %path.display(),
            global_buckets = state.global_buckets.len(),
            tenants = state.user_buckets.len(),
            "loaded ledger state"
        );

        Ok((
            Self {
                path: path.to_path_buf(),
                _lock: lock,
            },
            state,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full state: temp file, fsync, rename over the target.
    pub fn write(&self, state: &LedgerState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Persistence(format!("rename into {}: {}", self.path.display(), e.error)))?;
        Ok(())
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".lock");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::Usage;

    #[test]
    fn missing_file_loads_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, state) = StateStore::open(&dir.path().join("ledger.json")).unwrap();
        assert!(state.global_buckets.is_empty());
        assert!(!state.unlimited_mode);
    }

    #[test]
    fn write_then_reopen_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        {
            let (store, mut state) = StateStore::open(&path).unwrap();
            state.unlimited_mode = true;
            state.unlimited_users.insert("tenant-a".into());
            state
                .global_hourly
                .entry("stable:openai".into())
                .or_default()
                .insert("2026-01-01T00".into(), Usage::tokens(3, 4));
            store.write(&state).unwrap();
        }
        let (_store, state) = StateStore::open(&path).unwrap();
        assert!(state.unlimited_mode);
        assert!(state.unlimited_users.contains("tenant-a"));
        assert_eq!(
            state.global_hourly["stable:openai"]["2026-01-01T00"],
            Usage::tokens(3, 4)
        );
    }

    #[test]
    fn persisted_document_has_expected_top_level_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let (store, state) = StateStore::open(&path).unwrap();
        store.write(&state).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        for key in [
            "globalBuckets",
            "globalHistory",
            "userBuckets",
            "userHistory",
            "globalHourly",
            "userHourly",
            "unlimitedMode",
            "unlimitedUsers",
        ] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
        assert!(raw["unlimitedUsers"].is_array());
    }

    #[test]
    fn second_open_is_refused_while_first_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let first = StateStore::open(&path).unwrap();
        let err = StateStore::open(&path).err().unwrap();
        assert!(matches!(err, Error::Persistence(_)));
        drop(first);
        assert!(StateStore::open(&path).is_ok());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{ not json").unwrap();
        let err = StateStore::open(&path).err().unwrap();
        assert!(err.to_string().contains("corrupt ledger state"));
    }
}
