use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SESSION_FILE: &str = "session.toml";

/// Credentials of the signed-in user. Obtaining them is out of scope; the
/// user pastes them in with `rill login`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

pub fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE)
}

impl Session {
    pub fn new(user_id: Uuid, access_token: impl Into<String>) -> anyhow::Result<Self> {
        let access_token = access_token.into().trim().to_string();
        if access_token.is_empty() {
            return Err(anyhow!("access token cannot be empty"));
        }
        Ok(Self {
            user_id,
            access_token,
        })
    }

    /// Returns the stored session, if any. An unreadable session file is
    /// logged and treated as signed out.
    #[tracing::instrument(skip(data_dir))]
    pub fn probe(data_dir: &Path) -> anyhow::Result<Option<Self>> {
        let path = session_path(data_dir);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "no session file");
                return Ok(None);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading {}", path.display()));
            }
        };

        match toml::from_str::<Session>(&raw) {
            Ok(session) if !session.access_token.trim().is_empty() => Ok(Some(session)),
            Ok(_) => {
                warn!(file = %path.display(), "session has an empty access token; ignoring");
                Ok(None)
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed parsing session file; ignoring");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self, data_dir), fields(user = %self.user_id))]
    pub fn save(&self, data_dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = session_path(data_dir);
        let payload = toml::to_string(self).context("failed to serialize session")?;

        // NamedTempFile is created owner-only (0600); persist keeps that mode.
        let mut temp = NamedTempFile::new_in(data_dir)
            .with_context(|| format!("failed to create temp file in {}", data_dir.display()))?;
        temp.write_all(payload.as_bytes())
            .with_context(|| format!("failed writing {}", path.display()))?;
        temp.flush()?;
        temp.persist(&path)
            .with_context(|| format!("failed to persist {}", path.display()))?;
        info!(file = %path.display(), "saved session");
        Ok(())
    }

    /// Removes the session file; returns whether one existed.
    #[tracing::instrument(skip(data_dir))]
    pub fn clear(data_dir: &Path) -> anyhow::Result<bool> {
        let path = session_path(data_dir);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(file = %path.display(), "removed session");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }
}
