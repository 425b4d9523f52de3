//! Stored record schema and the load-time upgrade to [`Task`].
//!
//! Two record shapes exist on disk:
//!
//! - v1: `{ id, text, completed }`, written by the first plain version;
//! - v2: the full camelCase [`Task`].
//!
//! Partially upgraded records (any subset of the v2 fields) are read
//! through the v1 path, which backfills every missing field.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::task::{Category, Priority, Task, due_date_serde};

pub const CURRENT_VERSION: u32 = 2;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    V2(Task),
    V1(LegacyRecord),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    id: u64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn version(&self) -> u32 {
        match self {
            StoredRecord::V2(_) => CURRENT_VERSION,
            StoredRecord::V1(_) => 1,
        }
    }

    fn upgrade(self, now: DateTime<Utc>) -> Task {
        match self {
            StoredRecord::V2(task) => task,
            StoredRecord::V1(legacy) => upgrade_v1(legacy, now),
        }
    }
}

fn upgrade_v1(legacy: LegacyRecord, now: DateTime<Utc>) -> Task {
    let priority = legacy
        .priority
        .as_deref()
        .and_then(|raw| raw.parse::<Priority>().ok())
        .unwrap_or_default();
    let category = legacy
        .category
        .as_deref()
        .and_then(|raw| raw.parse::<Category>().ok())
        .unwrap_or_default();
    let due_date = legacy
        .due_date
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| match due_date_serde::parse(raw) {
            Ok(date) => Some(date),
            Err(err) => {
                warn!(id = legacy.id, error = %err, "dropping unreadable due date");
                None
            }
        });
    let created_at = legacy.created_at.unwrap_or(now);
    let updated_at = legacy.updated_at.unwrap_or(created_at);

    Task {
        id: legacy.id,
        text: legacy.text,
        completed: legacy.completed,
        priority,
        category,
        due_date,
        created_at,
        updated_at,
    }
}

/// Decodes a stored JSON array into a validated collection.
///
/// Never fails: an unreadable payload is an empty collection and
/// unreadable or invalid records are skipped.
#[tracing::instrument(skip(raw, now), fields(bytes = raw.len()))]
pub fn decode_collection(raw: &str, now: DateTime<Utc>) -> Vec<Task> {
    if raw.trim().is_empty() {
        return vec![];
    }

    let values: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(values) => values,
        Err(err) => {
            warn!(error = %err, "stored collection is not a JSON array; starting empty");
            return vec![];
        }
    };

    let mut seen = HashSet::with_capacity(values.len());
    let mut out = Vec::with_capacity(values.len());
    let mut upgraded = 0_usize;

    for (idx, value) in values.into_iter().enumerate() {
        let record: StoredRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(err) => {
                warn!(index = idx, error = %err, "skipping unreadable record");
                continue;
            }
        };
        if record.version() < CURRENT_VERSION {
            upgraded += 1;
        }

        let Some(task) = normalize(record.upgrade(now)) else {
            warn!(index = idx, "skipping record with empty text");
            continue;
        };
        if !seen.insert(task.id) {
            warn!(index = idx, id = task.id, "skipping record with duplicate id");
            continue;
        }
        out.push(task);
    }

    debug!(count = out.len(), upgraded, "decoded stored collection");
    out
}

fn normalize(mut task: Task) -> Option<Task> {
    let trimmed = task.text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() != task.text.len() {
        task.text = trimmed.to_string();
    }
    if task.updated_at < task.created_at {
        task.updated_at = task.created_at;
    }
    Some(task)
}
