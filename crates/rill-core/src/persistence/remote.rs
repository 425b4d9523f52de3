use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Backend, Change, Mode};
use crate::error::PersistError;
use crate::task::{Category, Priority, Task, due_date_serde};

/// Row-level operations against a remote table, always scoped to one owner.
pub trait RowStore {
    fn select_by_owner(&mut self, owner: Uuid) -> Result<Vec<TaskRow>, PersistError>;

    fn insert(&mut self, row: &TaskRow) -> Result<(), PersistError>;

    fn update_by_id(&mut self, owner: Uuid, row: &TaskRow) -> Result<(), PersistError>;

    fn delete_by_id(&mut self, owner: Uuid, id: u64) -> Result<(), PersistError>;

    fn delete_by_owner(&mut self, owner: Uuid) -> Result<(), PersistError>;
}

/// Wire shape of a task row (snake_case columns plus the owner).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRow {
    pub id: u64,
    pub user_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default, with = "due_date_serde")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    pub fn from_task(task: &Task, owner: Uuid) -> Self {
        Self {
            id: task.id,
            user_id: owner,
            text: task.text.clone(),
            completed: task.completed,
            priority: Some(task.priority),
            category: Some(task.category),
            due_date: task.due_date,
            created_at: Some(task.created_at),
            updated_at: Some(task.updated_at),
        }
    }

    /// Converts a row into a task, backfilling columns left null by older
    /// clients.
    pub fn into_task(self, now: DateTime<Utc>) -> Option<Task> {
        let text = self.text.trim().to_string();
        if text.is_empty() {
            return None;
        }
        let created_at = self.created_at.unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(created_at).max(created_at);
        Some(Task {
            id: self.id,
            text,
            completed: self.completed,
            priority: self.priority.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            due_date: self.due_date,
            created_at,
            updated_at,
        })
    }
}

pub struct RemoteBackend<S: RowStore> {
    rows: S,
    owner: Uuid,
}

impl<S: RowStore> RemoteBackend<S> {
    pub fn new(rows: S, owner: Uuid) -> Self {
        Self { rows, owner }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn rows(&self) -> &S {
        &self.rows
    }
}

impl<S: RowStore> Backend for RemoteBackend<S> {
    fn mode(&self) -> Mode {
        Mode::Remote
    }

    #[tracing::instrument(skip(self, now), fields(owner = %self.owner))]
    fn load(&mut self, now: DateTime<Utc>) -> Result<Vec<Task>, PersistError> {
        let rows = self.rows.select_by_owner(self.owner)?;
        let fetched = rows.len();

        let mut tasks: Vec<Task> = rows
            .into_iter()
            .filter(|row| {
                if row.user_id != self.owner {
                    warn!(id = row.id, "ignoring row owned by another user");
                    return false;
                }
                true
            })
            .filter_map(|row| {
                let id = row.id;
                let task = row.into_task(now);
                if task.is_none() {
                    warn!(id, "ignoring row with empty text");
                }
                task
            })
            .collect();
        tasks.sort_by_key(|task| task.id);
        tasks.dedup_by_key(|task| task.id);

        debug!(fetched, kept = tasks.len(), "loaded remote rows");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, change, _snapshot), fields(change = change.kind(), owner = %self.owner))]
    fn apply(&mut self, change: &Change, _snapshot: &[Task]) -> Result<(), PersistError> {
        match change {
            Change::Insert(task) => self.rows.insert(&TaskRow::from_task(task, self.owner)),
            Change::Update(task) => self
                .rows
                .update_by_id(self.owner, &TaskRow::from_task(task, self.owner)),
            Change::Delete(id) => self.rows.delete_by_id(self.owner, *id),
            Change::Clear => self.rows.delete_by_owner(self.owner),
        }
    }
}
