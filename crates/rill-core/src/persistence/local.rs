use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::schema::decode_collection;
use super::{Backend, Change, Mode};
use crate::error::PersistError;
use crate::task::Task;

/// Key-value storage in a directory: the entry for a key is `<key>.json`,
/// holding the whole collection as one JSON array.
#[derive(Debug)]
pub struct LocalBackend {
    pub data_dir: PathBuf,
    pub entry_path: PathBuf,
}

impl LocalBackend {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, key: &str) -> Result<Self, PersistError> {
        validate_key(key)?;
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)?;
        let entry_path = data_dir.join(format!("{key}.json"));

        info!(
            data_dir = %data_dir.display(),
            entry = %entry_path.display(),
            "opened local storage"
        );

        Ok(Self {
            data_dir,
            entry_path,
        })
    }

    fn read_entry(&self) -> Option<String> {
        match fs::read_to_string(&self.entry_path) {
            Ok(raw) => Some(raw),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(
                    file = %self.entry_path.display(),
                    error = %err,
                    "failed reading stored collection; starting empty"
                );
                None
            }
        }
    }

    fn remove_entry(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.entry_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Backend for LocalBackend {
    fn mode(&self) -> Mode {
        Mode::Local
    }

    #[tracing::instrument(skip(self, now))]
    fn load(&mut self, now: DateTime<Utc>) -> Result<Vec<Task>, PersistError> {
        let Some(raw) = self.read_entry() else {
            debug!(file = %self.entry_path.display(), "no stored collection");
            return Ok(vec![]);
        };
        Ok(decode_collection(&raw, now))
    }

    #[tracing::instrument(skip(self, change, snapshot), fields(change = change.kind(), count = snapshot.len()))]
    fn apply(&mut self, change: &Change, snapshot: &[Task]) -> Result<(), PersistError> {
        if matches!(change, Change::Clear) {
            debug!(file = %self.entry_path.display(), "removing stored collection");
            return self.remove_entry();
        }
        save_json_atomic(&self.entry_path, snapshot)
    }
}

fn validate_key(key: &str) -> Result<(), PersistError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !key.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(PersistError::Storage(format!(
            "invalid storage key {key:?}: use letters, digits, '-', '_' or '.'"
        )))
    }
}

#[tracing::instrument(skip(path, tasks))]
fn save_json_atomic(path: &Path, tasks: &[Task]) -> Result<(), PersistError> {
    debug!(file = %path.display(), count = tasks.len(), "saving collection atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut temp, tasks)?;
    temp.flush()?;

    temp.persist(path).map_err(|err| {
        PersistError::Storage(format!("failed to persist {}: {}", path.display(), err))
    })?;

    Ok(())
}
