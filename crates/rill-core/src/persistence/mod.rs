//! Persistence backends for the item store.
//!
//! The store talks to exactly one [`Backend`], chosen once at startup by
//! [`open_backend`] from the session probe.

mod local;
mod remote;
mod rest;
pub mod schema;
pub mod session;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PersistError;
use crate::task::Task;

pub use local::LocalBackend;
pub use remote::{RemoteBackend, RowStore, TaskRow};
pub use rest::{RestRowStore, RestSettings};
pub use session::Session;

pub const DEFAULT_STORAGE_KEY: &str = "todos";
pub const DEFAULT_REMOTE_TABLE: &str = "todos";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Remote,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => f.write_str("local"),
            Mode::Remote => f.write_str("remote"),
        }
    }
}

/// One committed mutation of the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Insert(Task),
    Update(Task),
    Delete(u64),
    Clear,
}

impl Change {
    pub fn kind(&self) -> &'static str {
        match self {
            Change::Insert(_) => "insert",
            Change::Update(_) => "update",
            Change::Delete(_) => "delete",
            Change::Clear => "clear",
        }
    }
}

pub trait Backend {
    fn mode(&self) -> Mode;

    /// Loads the full collection. Local backends recover from corrupt
    /// data by returning an empty collection.
    fn load(&mut self, now: DateTime<Utc>) -> Result<Vec<Task>, PersistError>;

    /// Persists `change`; `snapshot` is the collection after the change.
    fn apply(&mut self, change: &Change, snapshot: &[Task]) -> Result<(), PersistError>;
}

/// Picks the backend for this run: remote when a session exists and a
/// remote URL is configured, local otherwise.
#[tracing::instrument(skip(cfg, data_dir))]
pub fn open_backend(cfg: &Config, data_dir: &Path) -> anyhow::Result<Box<dyn Backend>> {
    let session = Session::probe(data_dir)?;

    match (session, cfg.get("remote.url")) {
        (Some(session), Some(url)) => {
            let settings = RestSettings {
                base_url: url,
                api_key: cfg.get("remote.anon_key").unwrap_or_default(),
                table: cfg
                    .get("remote.table")
                    .unwrap_or_else(|| DEFAULT_REMOTE_TABLE.to_string()),
                timeout: Duration::from_secs(
                    cfg.get_u64("remote.timeout")
                        .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
                ),
            };
            info!(
                user = %session.user_id,
                table = %settings.table,
                "session present; using remote storage"
            );
            let rows = RestRowStore::new(settings, &session.access_token)
                .context("failed to build remote storage client")?;
            Ok(Box::new(RemoteBackend::new(rows, session.user_id)))
        }
        (Some(session), None) => {
            warn!(
                user = %session.user_id,
                "session present but remote.url is not configured; using local storage"
            );
            open_local(cfg, data_dir)
        }
        (None, _) => open_local(cfg, data_dir),
    }
}

fn open_local(cfg: &Config, data_dir: &Path) -> anyhow::Result<Box<dyn Backend>> {
    let key = cfg
        .get("storage.key")
        .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string());
    let backend = LocalBackend::open(data_dir, &key)
        .with_context(|| format!("failed to open local storage in {}", data_dir.display()))?;
    Ok(Box::new(backend))
}
