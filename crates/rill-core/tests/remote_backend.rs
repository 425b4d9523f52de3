use std::cell::RefCell;
use std::rc::Rc;

use chrono::{TimeZone, Utc};
use rill_core::error::PersistError;
use rill_core::persistence::{Mode, RemoteBackend, RowStore, TaskRow};
use rill_core::store::ItemStore;
use rill_core::task::{NewTask, Priority, Task};
use uuid::Uuid;

/// In-memory table shared with the test body.
#[derive(Clone, Default)]
struct MemoryTable {
    rows: Rc<RefCell<Vec<TaskRow>>>,
}

impl MemoryTable {
    fn owned_by(&self, owner: Uuid) -> Vec<TaskRow> {
        self.rows
            .borrow()
            .iter()
            .filter(|row| row.user_id == owner)
            .cloned()
            .collect()
    }
}

impl RowStore for MemoryTable {
    fn select_by_owner(&mut self, owner: Uuid) -> Result<Vec<TaskRow>, PersistError> {
        Ok(self.owned_by(owner))
    }

    fn insert(&mut self, row: &TaskRow) -> Result<(), PersistError> {
        self.rows.borrow_mut().push(row.clone());
        Ok(())
    }

    fn update_by_id(&mut self, owner: Uuid, row: &TaskRow) -> Result<(), PersistError> {
        for existing in self.rows.borrow_mut().iter_mut() {
            if existing.user_id == owner && existing.id == row.id {
                *existing = row.clone();
            }
        }
        Ok(())
    }

    fn delete_by_id(&mut self, owner: Uuid, id: u64) -> Result<(), PersistError> {
        self.rows
            .borrow_mut()
            .retain(|row| !(row.user_id == owner && row.id == id));
        Ok(())
    }

    fn delete_by_owner(&mut self, owner: Uuid) -> Result<(), PersistError> {
        self.rows.borrow_mut().retain(|row| row.user_id != owner);
        Ok(())
    }
}

fn row(id: u64, owner: Uuid, text: &str) -> TaskRow {
    let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).single().expect("valid now");
    TaskRow::from_task(&Task::new(id, text.to_string(), now), owner)
}

#[test]
fn loads_only_rows_of_the_signed_in_user() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let table = MemoryTable::default();
    table.rows.borrow_mut().extend([
        row(2, me, "mine b"),
        row(1, me, "mine a"),
        row(3, other, "theirs"),
        row(4, me, "   "),
    ]);

    let backend = RemoteBackend::new(table.clone(), me);
    let store = ItemStore::open(Box::new(backend), Utc::now()).expect("open store");

    assert_eq!(store.mode(), Mode::Remote);
    let ids: Vec<u64> = store.tasks().iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn mutations_are_mirrored_row_by_row() {
    let me = Uuid::new_v4();
    let table = MemoryTable::default();
    let now = Utc::now();

    let backend = RemoteBackend::new(table.clone(), me);
    let mut store = ItemStore::open(Box::new(backend), now).expect("open store");

    let mut new = NewTask::new("Call plumber");
    new.priority = Some(Priority::High);
    let id = store.add(new, now).expect("add").id;
    assert_eq!(table.owned_by(me).len(), 1);
    assert_eq!(table.owned_by(me)[0].priority, Some(Priority::High));

    assert!(store.set_completed(id, true, now).expect("complete"));
    assert!(table.owned_by(me)[0].completed);

    assert!(store.remove(id).expect("remove"));
    assert!(table.owned_by(me).is_empty());
}

#[test]
fn clear_deletes_only_own_rows() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let table = MemoryTable::default();
    table
        .rows
        .borrow_mut()
        .extend([row(1, me, "a"), row(2, me, "b"), row(3, other, "c")]);

    let backend = RemoteBackend::new(table.clone(), me);
    let mut store = ItemStore::open(Box::new(backend), Utc::now()).expect("open store");

    assert_eq!(store.clear_all().expect("clear"), 2);
    assert!(table.owned_by(me).is_empty());
    assert_eq!(table.owned_by(other).len(), 1);
}

#[test]
fn rows_with_null_columns_get_defaults() {
    let me = Uuid::new_v4();
    let now = Utc::now();
    let raw = serde_json::json!({
        "id": 7,
        "user_id": me,
        "text": "old client row",
        "completed": false,
        "priority": null,
        "category": null,
        "due_date": null
    });
    let row: TaskRow = serde_json::from_value(raw).expect("decode row");
    let task = row.into_task(now).expect("task");

    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.created_at, now);
    assert_eq!(task.updated_at, now);
    assert_eq!(task.due_date, None);
}
