use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use deunicode::deunicode;
use tracing::trace;

use crate::datetime::is_overdue;
use crate::task::{
  Category,
  Priority,
  Task
};

/// Predicates combined with AND.
/// `None` for priority or category
/// means "all".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
  pub search_query:   String,
  pub priority:       Option<Priority>,
  pub category:       Option<Category>,
  pub show_completed: bool,
  pub show_overdue:   bool
}

impl Default for FilterOptions {
  fn default() -> Self {
    Self {
      search_query:   String::new(),
      priority:       None,
      category:       None,
      show_completed: true,
      show_overdue:   false
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortKey {
  #[default]
  CreatedAt,
  Priority,
  DueDate,
  Text
}

impl SortKey {
  pub fn as_str(
    self
  ) -> &'static str {
    match self {
      | Self::CreatedAt => "createdAt",
      | Self::Priority => "priority",
      | Self::DueDate => "dueDate",
      | Self::Text => "text"
    }
  }
}

impl fmt::Display for SortKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SortKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "createdat" | "created"
      | "entry" => Ok(Self::CreatedAt),
      | "priority" | "pri" => {
        Ok(Self::Priority)
      }
      | "duedate" | "due" => {
        Ok(Self::DueDate)
      }
      | "text" | "description" => {
        Ok(Self::Text)
      }
      | other => {
        Err(anyhow!(
          "unknown sort key: {other} \
           (expected createdAt, \
           priority, dueDate or text)"
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortDirection {
  Asc,
  #[default]
  Desc
}

impl SortDirection {
  #[must_use]
  pub fn toggled(self) -> Self {
    match self {
      | Self::Asc => Self::Desc,
      | Self::Desc => Self::Asc
    }
  }

  fn apply(
    self,
    ordering: Ordering
  ) -> Ordering {
    match self {
      | Self::Asc => ordering,
      | Self::Desc => ordering.reverse()
    }
  }
}

impl FromStr for SortDirection {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "asc" | "ascending" | "up" => {
        Ok(Self::Asc)
      }
      | "desc" | "descending"
      | "down" => Ok(Self::Desc),
      | other => {
        Err(anyhow!(
          "unknown sort direction: \
           {other} (expected asc or \
           desc)"
        ))
      }
    }
  }
}

#[must_use]
pub fn matches(
  task: &Task,
  filter: &FilterOptions,
  now: DateTime<Utc>,
  tz: Tz
) -> bool {
  let query =
    filter.search_query.trim();
  if !query.is_empty()
    && !task
      .text
      .to_lowercase()
      .contains(&query.to_lowercase())
  {
    return false;
  }

  if let Some(priority) =
    filter.priority
    && task.priority != priority
  {
    return false;
  }

  if let Some(category) =
    filter.category
    && task.category != category
  {
    return false;
  }

  if !filter.show_completed
    && task.completed
  {
    return false;
  }

  if filter.show_overdue {
    let overdue = !task.completed
      && task.due_date.is_some_and(
        |due| is_overdue(due, now, tz)
      );
    if !overdue {
      return false;
    }
  }

  true
}

/// Filters then stably sorts a
/// snapshot; `tasks` is never touched.
#[tracing::instrument(skip(
  tasks, filter, now, tz
))]
pub fn filter_and_sort(
  tasks: &[Task],
  filter: &FilterOptions,
  key: SortKey,
  direction: SortDirection,
  now: DateTime<Utc>,
  tz: Tz
) -> Vec<Task> {
  let mut out: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      matches(task, filter, now, tz)
    })
    .cloned()
    .collect();

  // slice::sort_by is stable
  out.sort_by(|a, b| {
    compare_tasks(a, b, key, direction)
  });

  trace!(
    input = tasks.len(),
    output = out.len(),
    "computed view"
  );
  out
}

fn compare_tasks(
  a: &Task,
  b: &Task,
  key: SortKey,
  direction: SortDirection
) -> Ordering {
  match key {
    | SortKey::CreatedAt => {
      direction.apply(
        a.created_at.cmp(&b.created_at)
      )
    }
    | SortKey::Priority => {
      direction.apply(
        a.priority
          .rank()
          .cmp(&b.priority.rank())
      )
    }
    | SortKey::DueDate => {
      // undated tasks trail in both
      // directions
      match (a.due_date, b.due_date) {
        | (Some(x), Some(y)) => {
          direction.apply(x.cmp(&y))
        }
        | (Some(_), None) => {
          Ordering::Less
        }
        | (None, Some(_)) => {
          Ordering::Greater
        }
        | (None, None) => {
          Ordering::Equal
        }
      }
    }
    | SortKey::Text => {
      direction.apply(compare_text(
        &a.text, &b.text
      ))
    }
  }
}

/// Accent-folded, case-insensitive
/// order, raw text as tie-breaker.
fn compare_text(
  a: &str,
  b: &str
) -> Ordering {
  collation_key(a)
    .cmp(&collation_key(b))
    .then_with(|| a.cmp(b))
}

fn collation_key(s: &str) -> String {
  deunicode(s).to_lowercase()
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct Stats {
  pub total:         usize,
  pub completed:     usize,
  pub incomplete:    usize,
  pub overdue:       usize,
  pub high_priority: usize
}

#[must_use]
pub fn stats(
  tasks: &[Task],
  now: DateTime<Utc>,
  tz: Tz
) -> Stats {
  let total = tasks.len();
  let completed = tasks
    .iter()
    .filter(|t| t.completed)
    .count();
  let overdue = tasks
    .iter()
    .filter(|t| {
      !t.completed
        && t.due_date.is_some_and(
          |due| is_overdue(due, now, tz)
        )
    })
    .count();
  let high_priority = tasks
    .iter()
    .filter(|t| {
      !t.completed
        && t.priority == Priority::High
    })
    .count();

  Stats {
    total,
    completed,
    incomplete: total - completed,
    overdue,
    high_priority
  }
}

/// Splits a view into (incomplete,
/// completed), keeping order.
#[must_use]
pub fn partition(
  view: Vec<Task>
) -> (Vec<Task>, Vec<Task>) {
  let (completed, incomplete): (
    Vec<Task>,
    Vec<Task>
  ) = view
    .into_iter()
    .partition(|t| t.completed);
  (incomplete, completed)
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    FilterOptions,
    SortDirection,
    SortKey,
    filter_and_sort,
    partition,
    stats
  };
  use crate::task::{
    Category,
    Priority,
    Task
  };

  fn task(
    id: u64,
    text: &str,
    priority: Priority
  ) -> Task {
    let base = Utc
      .with_ymd_and_hms(
        2026, 2, 1, 8, 0, 0
      )
      .single()
      .expect("valid base");
    let mut t = Task::new(
      id,
      text.to_string(),
      base + Duration::minutes(id as i64)
    );
    t.priority = priority;
    t
  }

  fn ids(view: &[Task]) -> Vec<u64> {
    view.iter().map(|t| t.id).collect()
  }

  fn now() -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn priority_desc_is_stable() {
    let tasks = vec![
      task(1, "a", Priority::Low),
      task(2, "b", Priority::High),
      task(3, "c", Priority::Medium),
      task(4, "d", Priority::High),
    ];

    let view = filter_and_sort(
      &tasks,
      &FilterOptions::default(),
      SortKey::Priority,
      SortDirection::Desc,
      now(),
      chrono_tz::UTC
    );
    assert_eq!(ids(&view), vec![
      2, 4, 3, 1
    ]);

    let again = filter_and_sort(
      &tasks,
      &FilterOptions::default(),
      SortKey::Priority,
      SortDirection::Desc,
      now(),
      chrono_tz::UTC
    );
    assert_eq!(view, again);
  }

  #[test]
  fn undated_tasks_trail_both_ways() {
    let mut tasks = vec![
      task(1, "a", Priority::Medium),
      task(2, "b", Priority::Medium),
      task(3, "c", Priority::Medium),
      task(4, "d", Priority::Medium),
    ];
    tasks[1].due_date =
      NaiveDate::from_ymd_opt(2026, 3, 1);
    tasks[3].due_date =
      NaiveDate::from_ymd_opt(2026, 2, 1);

    for direction in [
      SortDirection::Asc,
      SortDirection::Desc
    ] {
      let view = filter_and_sort(
        &tasks,
        &FilterOptions::default(),
        SortKey::DueDate,
        direction,
        now(),
        chrono_tz::UTC
      );
      let order = ids(&view);
      assert_eq!(&order[2..], &[1, 3]);
      match direction {
        | SortDirection::Asc => {
          assert_eq!(&order[..2], &[4, 2])
        }
        | SortDirection::Desc => {
          assert_eq!(&order[..2], &[2, 4])
        }
      }
    }
  }

  #[test]
  fn text_sort_folds_case_and_accents() {
    let tasks = vec![
      task(1, "banana", Priority::Low),
      task(2, "Éclair", Priority::Low),
      task(3, "apple", Priority::Low),
      task(4, "Cherry", Priority::Low),
    ];

    let view = filter_and_sort(
      &tasks,
      &FilterOptions::default(),
      SortKey::Text,
      SortDirection::Asc,
      now(),
      chrono_tz::UTC
    );
    assert_eq!(ids(&view), vec![
      3, 1, 4, 2
    ]);
  }

  #[test]
  fn created_at_defaults_newest_first()
  {
    let tasks = vec![
      task(1, "old", Priority::Low),
      task(2, "new", Priority::Low),
    ];

    let view = filter_and_sort(
      &tasks,
      &FilterOptions::default(),
      SortKey::default(),
      SortDirection::default(),
      now(),
      chrono_tz::UTC
    );
    assert_eq!(ids(&view), vec![2, 1]);
  }

  #[test]
  fn filters_combine_with_and() {
    let mut tasks = vec![
      task(1, "Write report", Priority::High),
      task(2, "write tests", Priority::High),
      task(3, "Buy milk", Priority::High),
      task(4, "write docs", Priority::Low),
    ];
    tasks[0].category = Category::Work;
    tasks[1].category = Category::Work;
    tasks[1].completed = true;

    let filter = FilterOptions {
      search_query: "WRITE".to_string(),
      priority: Some(Priority::High),
      category: Some(Category::Work),
      ..FilterOptions::default()
    };
    let view = filter_and_sort(
      &tasks,
      &filter,
      SortKey::CreatedAt,
      SortDirection::Asc,
      now(),
      chrono_tz::UTC
    );
    assert_eq!(ids(&view), vec![1, 2]);

    let hide_done = FilterOptions {
      show_completed: false,
      ..filter
    };
    let view = filter_and_sort(
      &tasks,
      &hide_done,
      SortKey::CreatedAt,
      SortDirection::Asc,
      now(),
      chrono_tz::UTC
    );
    assert_eq!(ids(&view), vec![1]);
  }

  #[test]
  fn overdue_filter_skips_completed_and_undated()
   {
    let mut tasks = vec![
      task(1, "late", Priority::Low),
      task(2, "late but done", Priority::Low),
      task(3, "future", Priority::Low),
      task(4, "undated", Priority::Low),
    ];
    let past =
      NaiveDate::from_ymd_opt(2026, 2, 10);
    tasks[0].due_date = past;
    tasks[1].due_date = past;
    tasks[1].completed = true;
    tasks[2].due_date =
      NaiveDate::from_ymd_opt(2026, 3, 10);

    let filter = FilterOptions {
      show_overdue: true,
      ..FilterOptions::default()
    };
    let view = filter_and_sort(
      &tasks,
      &filter,
      SortKey::CreatedAt,
      SortDirection::Asc,
      now(),
      chrono_tz::UTC
    );
    assert_eq!(ids(&view), vec![1]);

    let summary =
      stats(&tasks, now(), chrono_tz::UTC);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.incomplete, 3);
    assert_eq!(summary.overdue, 1);
  }

  #[test]
  fn partition_keeps_view_order() {
    let mut tasks = vec![
      task(1, "a", Priority::Low),
      task(2, "b", Priority::Low),
      task(3, "c", Priority::Low),
    ];
    tasks[1].completed = true;

    let (open, done) = partition(tasks);
    assert_eq!(ids(&open), vec![1, 3]);
    assert_eq!(ids(&done), vec![2]);
  }

  #[test]
  fn direction_toggles() {
    assert_eq!(
      SortDirection::Asc.toggled(),
      SortDirection::Desc
    );
    assert_eq!(
      "due"
        .parse::<SortKey>()
        .expect("sort key"),
      SortKey::DueDate
    );
    assert!(
      "sideways"
        .parse::<SortDirection>()
        .is_err()
    );
  }
}
