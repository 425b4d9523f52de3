//! The item store: sole owner of the task collection.
//!
//! Mutations are applied to memory, then synced through the backend. When
//! the sync fails the in-memory change is rolled back, so memory and
//! storage never diverge.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{Backend, Change, Mode};
use crate::task::{NewTask, Task, TaskPatch};

pub struct ItemStore {
    tasks: Vec<Task>,
    backend: Box<dyn Backend>,
}

impl ItemStore {
    /// Loads the collection once through `backend`.
    #[tracing::instrument(skip(backend, now))]
    pub fn open(mut backend: Box<dyn Backend>, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let tasks = backend.load(now)?;
        info!(mode = %backend.mode(), count = tasks.len(), "loaded item store");
        Ok(Self { tasks, backend })
    }

    pub fn mode(&self) -> Mode {
        self.backend.mode()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Timestamp-derived id, strictly above every id in the collection.
    pub fn next_id(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let above = match self.tasks.iter().map(|task| task.id).max() {
            Some(max) => max.checked_add(1).ok_or(StoreError::IdSpaceExhausted)?,
            None => 1,
        };
        Ok(stamp.max(above))
    }

    #[tracing::instrument(skip(self, new, now))]
    pub fn add(&mut self, new: NewTask, now: DateTime<Utc>) -> Result<Task, StoreError> {
        let text = new.text.trim();
        if text.is_empty() {
            warn!("rejected empty task text");
            return Err(StoreError::EmptyText);
        }

        let id = self.next_id(now)?;
        let mut task = Task::new(id, text.to_string(), now);
        task.priority = new.priority.unwrap_or_default();
        task.category = new.category.unwrap_or_default();
        task.due_date = new.due_date;

        self.tasks.push(task.clone());
        self.commit(Change::Insert(task.clone()), |tasks| {
            tasks.pop();
        })?;

        debug!(id = task.id, count = self.tasks.len(), "task added");
        Ok(task)
    }

    /// Merges `patch` into the task. `Ok(false)` when the id is unknown or
    /// the patch is empty.
    #[tracing::instrument(skip(self, patch, now))]
    pub fn update(&mut self, id: u64, patch: &TaskPatch, now: DateTime<Utc>) -> Result<bool, StoreError> {
        if let Some(text) = &patch.text
            && text.trim().is_empty()
        {
            warn!(id, "rejected empty task text");
            return Err(StoreError::EmptyText);
        }
        if patch.is_empty() {
            return Ok(false);
        }

        self.mutate(id, now, |task| patch.apply_to(task))
    }

    /// Idempotent; `Ok(false)` when the id is unknown or already in the
    /// requested state.
    #[tracing::instrument(skip(self, now))]
    pub fn set_completed(&mut self, id: u64, value: bool, now: DateTime<Utc>) -> Result<bool, StoreError> {
        match self.get(id) {
            Some(task) if task.completed == value => {
                debug!(id, value, "completion unchanged");
                Ok(false)
            }
            Some(_) => self.mutate(id, now, |task| task.completed = value),
            None => Ok(false),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, id: u64) -> Result<bool, StoreError> {
        let Some(idx) = self.tasks.iter().position(|task| task.id == id) else {
            debug!(id, "remove: no such task");
            return Ok(false);
        };

        let removed = self.tasks.remove(idx);
        self.commit(Change::Delete(id), move |tasks| {
            tasks.insert(idx, removed);
        })?;
        Ok(true)
    }

    /// Empties the collection unconditionally and returns how many tasks
    /// were removed.
    #[tracing::instrument(skip(self))]
    pub fn clear_all(&mut self) -> Result<usize, StoreError> {
        let before = std::mem::take(&mut self.tasks);
        let count = before.len();
        self.commit(Change::Clear, move |tasks| {
            *tasks = before;
        })?;
        info!(count, "cleared all tasks");
        Ok(count)
    }

    fn mutate<F>(&mut self, id: u64, now: DateTime<Utc>, edit: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let Some(idx) = self.tasks.iter().position(|task| task.id == id) else {
            debug!(id, "no such task");
            return Ok(false);
        };

        let previous = self.tasks[idx].clone();
        let task = &mut self.tasks[idx];
        edit(task);
        task.touch(now);
        let updated = task.clone();

        self.commit(Change::Update(updated), move |tasks| {
            tasks[idx] = previous;
        })?;
        Ok(true)
    }

    /// Syncs `change`; on failure runs `rollback` on the collection and
    /// returns the error.
    fn commit<R>(&mut self, change: Change, rollback: R) -> Result<(), StoreError>
    where
        R: FnOnce(&mut Vec<Task>),
    {
        match self.backend.apply(&change, &self.tasks) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(change = change.kind(), error = %err, "sync failed; rolling back");
                rollback(&mut self.tasks);
                Err(err.into())
            }
        }
    }
}
