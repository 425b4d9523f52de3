use std::io::Cursor;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rill_core::cli::Invocation;
use rill_core::commands::{RunContext, dispatch, dispatch_store};
use rill_core::config::Config;
use rill_core::persistence::LocalBackend;
use rill_core::render::Renderer;
use rill_core::store::ItemStore;
use rill_core::task::{Category, Priority};
use tempfile::tempdir;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
        .single()
        .expect("valid now")
}

fn invocation(command: &str, args: &[&str]) -> Invocation {
    Invocation {
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
    }
}

struct Harness {
    _temp: tempfile::TempDir,
    ctx: RunContext,
    store: ItemStore,
    renderer: Renderer,
}

impl Harness {
    fn new() -> Self {
        let temp = tempdir().expect("tempdir");
        let ctx = RunContext {
            cfg: Config::default(),
            data_dir: temp.path().to_path_buf(),
            tz: chrono_tz::UTC,
        };
        let backend = LocalBackend::open(temp.path(), "todos").expect("open backend");
        let store = ItemStore::open(Box::new(backend), fixed_now()).expect("open store");
        Self {
            _temp: temp,
            ctx,
            store,
            renderer: Renderer::plain(chrono_tz::UTC),
        }
    }

    fn run(&mut self, command: &str, args: &[&str], input: &str) -> anyhow::Result<String> {
        let mut out = Vec::new();
        let mut input = Cursor::new(input.as_bytes().to_vec());
        dispatch_store(
            &mut self.store,
            &self.ctx,
            &self.renderer,
            invocation(command, args),
            fixed_now(),
            &mut out,
            &mut input,
        )?;
        Ok(String::from_utf8(out).expect("utf8"))
    }
}

#[test]
fn add_with_modifiers_then_list() {
    let mut h = Harness::new();

    let out = h
        .run("add", &["Buy", "milk", "pri:high", "cat:shopping", "due:2026-02-20"], "")
        .expect("add");
    assert!(out.starts_with("Created task "));

    let task = &h.store.tasks()[0];
    assert_eq!(task.text, "Buy milk");
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.category, Category::Shopping);
    assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 2, 20));

    let listing = h.run("list", &[], "").expect("list");
    assert!(listing.contains("Incomplete (1)"));
    assert!(listing.contains("Buy milk"));
    assert!(listing.contains("No completed tasks."));
}

#[test]
fn add_without_text_reports_validation_error() {
    let mut h = Harness::new();
    let err = h.run("add", &["pri:low"], "").expect_err("empty text");
    assert_eq!(err.to_string(), "Please enter a task.");
    assert!(h.store.is_empty());
}

#[test]
fn done_restore_and_delete_by_id() {
    let mut h = Harness::new();
    h.run("add", &["Walk", "dog"], "").expect("add");
    let id = h.store.tasks()[0].id.to_string();

    assert_eq!(h.run("done", &[id.as_str()], "").expect("done"), format!("Completed task {id}.\n"));
    assert_eq!(
        h.run("done", &[id.as_str()], "").expect("done again"),
        format!("Task {id} is already completed.\n")
    );
    let listing = h.run("list", &[], "").expect("list");
    assert!(listing.contains("Completed (1)"));

    assert_eq!(h.run("restore", &[id.as_str()], "").expect("restore"), format!("Restored task {id}.\n"));
    assert_eq!(h.run("delete", &["1"], "").expect("delete unknown"), "No task with id 1.\n");
    assert_eq!(h.run("delete", &[id.as_str()], "").expect("delete"), format!("Deleted task {id}.\n"));
    assert!(h.store.is_empty());
}

#[test]
fn edit_changes_fields_and_clears_due() {
    let mut h = Harness::new();
    h.run("add", &["Draft", "due:2026-03-01"], "").expect("add");
    let id = h.store.tasks()[0].id.to_string();

    h.run("edit", &[id.as_str(), "Final", "draft", "cat:work", "due:none"], "")
        .expect("edit");
    let task = &h.store.tasks()[0];
    assert_eq!(task.text, "Final draft");
    assert_eq!(task.category, Category::Work);
    assert_eq!(task.due_date, None);

    assert!(h.run("edit", &[id.as_str()], "").is_err());
}

#[test]
fn clear_asks_for_confirmation() {
    let mut h = Harness::new();
    h.run("add", &["one"], "").expect("add");
    h.run("add", &["two"], "").expect("add");

    let out = h.run("clear", &[], "n\n").expect("clear declined");
    assert!(out.ends_with("Cancelled.\n"));
    assert_eq!(h.store.len(), 2);

    let out = h.run("clear", &[], "y\n").expect("clear accepted");
    assert!(out.ends_with("Deleted 2 task(s).\n"));
    assert!(h.store.is_empty());

    assert_eq!(h.run("clear", &["--yes"], "").expect("clear empty"), "Nothing to clear.\n");
}

#[test]
fn stats_count_the_collection() {
    let mut h = Harness::new();
    h.run("add", &["late", "pri:high", "due:2026-02-01"], "").expect("add");
    h.run("add", &["fine"], "").expect("add");
    let id = h.store.tasks()[1].id.to_string();
    h.run("done", &[id.as_str()], "").expect("done");

    let out = h.run("stats", &[], "").expect("stats");
    assert!(out.contains("total          2"));
    assert!(out.contains("completed      1"));
    assert!(out.contains("overdue        1"));
    assert!(out.contains("high priority  1"));
}

#[test]
fn login_status_and_logout_manage_the_session() {
    let temp = tempdir().expect("tempdir");
    let ctx = RunContext {
        cfg: Config::default(),
        data_dir: temp.path().to_path_buf(),
        tz: chrono_tz::UTC,
    };
    let renderer = Renderer::plain(chrono_tz::UTC);
    let user = uuid::Uuid::new_v4().to_string();

    let run = |command: &str, args: &[&str]| -> String {
        let mut out = Vec::new();
        dispatch(&ctx, &renderer, invocation(command, args), &mut out, &mut Cursor::new(Vec::new()))
            .expect("dispatch");
        String::from_utf8(out).expect("utf8")
    };

    let out = run("login", &[user.as_str(), "token-abc"]);
    assert!(out.contains(&format!("Signed in as {user}.")));
    assert!(temp.path().join("session.toml").exists());

    let out = run("status", &[]);
    assert!(out.contains("storage   local"));
    assert!(out.contains(&user));

    assert_eq!(run("logout", &[]), "Signed out.\n");
    assert_eq!(run("logout", &[]), "No active session.\n");
}
