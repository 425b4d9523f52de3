use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::parse_due_expr;
use crate::persistence::{self, Session};
use crate::render::Renderer;
use crate::store::ItemStore;
use crate::task::{Category, NewTask, Priority, TaskPatch};
use crate::view::{self, FilterOptions, SortDirection, SortKey};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "info", "edit", "done", "restore", "delete", "clear", "stats", "login",
        "logout", "status", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Everything a command needs besides the store.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub cfg: Config,
    pub data_dir: PathBuf,
    pub tz: Tz,
}

/// Runs commands that do not touch the task collection, and otherwise
/// opens the store and hands over to [`dispatch_store`].
#[instrument(skip(ctx, renderer, inv, out, input))]
pub fn dispatch<W: Write, R: BufRead>(
    ctx: &RunContext,
    renderer: &Renderer,
    inv: Invocation,
    out: &mut W,
    input: &mut R,
) -> anyhow::Result<()> {
    debug!(command = %inv.command, args = ?inv.args, "dispatching command");

    match inv.command.as_str() {
        "login" => cmd_login(ctx, &inv.args, out),
        "logout" => cmd_logout(ctx, out),
        "status" => cmd_status(ctx, out),
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        _ => {
            let now = Utc::now();
            let backend = persistence::open_backend(&ctx.cfg, &ctx.data_dir)?;
            let mut store = ItemStore::open(backend, now).context("failed to load tasks")?;
            dispatch_store(&mut store, ctx, renderer, inv, now, out, input)
        }
    }
}

#[instrument(skip(store, ctx, renderer, inv, now, out, input))]
pub fn dispatch_store<W: Write, R: BufRead>(
    store: &mut ItemStore,
    ctx: &RunContext,
    renderer: &Renderer,
    inv: Invocation,
    now: DateTime<Utc>,
    out: &mut W,
    input: &mut R,
) -> anyhow::Result<()> {
    let args = inv.args.as_slice();
    match inv.command.as_str() {
        "add" => cmd_add(store, ctx, args, now, out),
        "list" => cmd_list(store, ctx, renderer, args, now, out),
        "info" => cmd_info(store, renderer, args, out),
        "edit" => cmd_edit(store, ctx, args, now, out),
        "done" => cmd_set_completed(store, args, true, now, out),
        "restore" => cmd_set_completed(store, args, false, now, out),
        "delete" => cmd_delete(store, args, out),
        "clear" => cmd_clear(store, ctx, args, out, input),
        "stats" => cmd_stats(store, ctx, renderer, now, out),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, ctx, args, now, out))]
fn cmd_add<W: Write>(
    store: &mut ItemStore,
    ctx: &RunContext,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    let (words, mods) = split_words_and_mods(args, now, ctx.tz)?;
    let mut new = NewTask::new(words.join(" "));
    for one_mod in mods {
        match one_mod {
            Mod::Priority(priority) => new.priority = Some(priority),
            Mod::Category(category) => new.category = Some(category),
            Mod::Due(due) => new.due_date = due,
        }
    }

    let task = store.add(new, now)?;
    writeln!(out, "Created task {}.", task.id)?;
    Ok(())
}

#[instrument(skip(store, ctx, renderer, args, now, out))]
fn cmd_list<W: Write>(
    store: &mut ItemStore,
    ctx: &RunContext,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");

    let query = parse_list_query(&ctx.cfg, args)?;
    let view = view::filter_and_sort(
        store.tasks(),
        &query.filter,
        query.key,
        query.direction,
        now,
        ctx.tz,
    );
    let (incomplete, completed) = view::partition(view);
    renderer.write_sections(out, &incomplete, &completed, now)
}

#[instrument(skip(store, renderer, args, out))]
fn cmd_info<W: Write>(
    store: &mut ItemStore,
    renderer: &Renderer,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let id = parse_id(args, "info")?;
    match store.get(id) {
        Some(task) => renderer.write_task_info(out, task),
        None => {
            writeln!(out, "No task with id {id}.")?;
            Ok(())
        }
    }
}

#[instrument(skip(store, ctx, args, now, out))]
fn cmd_edit<W: Write>(
    store: &mut ItemStore,
    ctx: &RunContext,
    args: &[String],
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command edit");

    let id = parse_id(args, "edit")?;
    let (words, mods) = split_words_and_mods(&args[1..], now, ctx.tz)?;

    let mut patch = TaskPatch::default();
    if !words.is_empty() {
        patch.text = Some(words.join(" "));
    }
    for one_mod in mods {
        match one_mod {
            Mod::Priority(priority) => patch.priority = Some(priority),
            Mod::Category(category) => patch.category = Some(category),
            Mod::Due(due) => patch.due_date = Some(due),
        }
    }
    if patch.is_empty() {
        return Err(anyhow!(
            "edit: nothing to change (give new text, priority:, category: or due:)"
        ));
    }

    if store.update(id, &patch, now)? {
        writeln!(out, "Modified task {id}.")?;
    } else {
        writeln!(out, "No task with id {id}.")?;
    }
    Ok(())
}

#[instrument(skip(store, args, now, out))]
fn cmd_set_completed<W: Write>(
    store: &mut ItemStore,
    args: &[String],
    value: bool,
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    let verb = if value { "done" } else { "restore" };
    info!(command = verb, "command set completed");

    let id = parse_id(args, verb)?;
    let current = store.get(id).map(|task| task.completed);
    match current {
        None => writeln!(out, "No task with id {id}.")?,
        Some(state) if state == value => {
            let label = if value { "completed" } else { "incomplete" };
            writeln!(out, "Task {id} is already {label}.")?;
        }
        Some(_) => {
            store.set_completed(id, value, now)?;
            let label = if value { "Completed" } else { "Restored" };
            writeln!(out, "{label} task {id}.")?;
        }
    }
    Ok(())
}

#[instrument(skip(store, args, out))]
fn cmd_delete<W: Write>(store: &mut ItemStore, args: &[String], out: &mut W) -> anyhow::Result<()> {
    info!("command delete");

    let id = parse_id(args, "delete")?;
    if store.remove(id)? {
        writeln!(out, "Deleted task {id}.")?;
    } else {
        writeln!(out, "No task with id {id}.")?;
    }
    Ok(())
}

#[instrument(skip(store, ctx, args, out, input))]
fn cmd_clear<W: Write, R: BufRead>(
    store: &mut ItemStore,
    ctx: &RunContext,
    args: &[String],
    out: &mut W,
    input: &mut R,
) -> anyhow::Result<()> {
    info!("command clear");

    if store.is_empty() {
        writeln!(out, "Nothing to clear.")?;
        return Ok(());
    }

    let forced = args.iter().any(|arg| arg == "--yes" || arg == "-y");
    let needs_confirmation = ctx.cfg.get_bool("confirmation").unwrap_or(true) && !forced;
    if needs_confirmation {
        let prompt = format!("Delete all {} task(s)? [y/N] ", store.len());
        if !confirm(out, input, &prompt)? {
            writeln!(out, "Cancelled.")?;
            return Ok(());
        }
    }

    let removed = store.clear_all()?;
    writeln!(out, "Deleted {removed} task(s).")?;
    Ok(())
}

#[instrument(skip(store, ctx, renderer, now, out))]
fn cmd_stats<W: Write>(
    store: &mut ItemStore,
    ctx: &RunContext,
    renderer: &Renderer,
    now: DateTime<Utc>,
    out: &mut W,
) -> anyhow::Result<()> {
    let summary = view::stats(store.tasks(), now, ctx.tz);
    renderer.write_stats(out, &summary, store.mode())
}

#[instrument(skip(ctx, args, out))]
fn cmd_login<W: Write>(ctx: &RunContext, args: &[String], out: &mut W) -> anyhow::Result<()> {
    let [user_id, token] = args else {
        return Err(anyhow!("usage: rill login <user-id> <access-token>"));
    };
    let user_id = Uuid::parse_str(user_id.trim())
        .with_context(|| format!("invalid user id: {user_id}"))?;

    let session = Session::new(user_id, token.as_str())?;
    session.save(&ctx.data_dir)?;

    writeln!(out, "Signed in as {user_id}.")?;
    if ctx.cfg.get("remote.url").is_none() {
        warn!("remote.url is not configured");
        writeln!(out, "remote.url is not set; tasks stay in local storage until it is.")?;
    } else {
        writeln!(out, "Local tasks are not copied to remote storage.")?;
    }
    Ok(())
}

#[instrument(skip(ctx, out))]
fn cmd_logout<W: Write>(ctx: &RunContext, out: &mut W) -> anyhow::Result<()> {
    if Session::clear(&ctx.data_dir)? {
        writeln!(out, "Signed out.")?;
    } else {
        writeln!(out, "No active session.")?;
    }
    Ok(())
}

#[instrument(skip(ctx, out))]
fn cmd_status<W: Write>(ctx: &RunContext, out: &mut W) -> anyhow::Result<()> {
    let session = Session::probe(&ctx.data_dir)?;
    let remote_url = ctx.cfg.get("remote.url");
    let mode = match (&session, &remote_url) {
        (Some(_), Some(_)) => persistence::Mode::Remote,
        _ => persistence::Mode::Local,
    };

    writeln!(out, "storage   {mode}")?;
    writeln!(out, "data      {}", ctx.data_dir.display())?;
    match session {
        Some(session) => writeln!(out, "user      {}", session.user_id)?,
        None => writeln!(out, "user      (signed out)")?,
    }
    if let Some(url) = remote_url {
        writeln!(out, "remote    {url}")?;
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(out, "rill commands:")?;
    writeln!(out, "  add <text> [priority:P] [category:C] [due:D]")?;
    writeln!(out, "  list [words] [priority:P] [category:C] [sort:K] [order:asc|desc] [+overdue] [-completed]")?;
    writeln!(out, "  info <id>")?;
    writeln!(out, "  edit <id> [text] [priority:P] [category:C] [due:D|due:none]")?;
    writeln!(out, "  done <id> | restore <id> | delete <id>")?;
    writeln!(out, "  clear [--yes]")?;
    writeln!(out, "  stats")?;
    writeln!(out, "  login <user-id> <access-token> | logout | status")?;
    writeln!(out, "  help | version")?;
    Ok(())
}

fn confirm<W: Write, R: BufRead>(out: &mut W, input: &mut R, prompt: &str) -> anyhow::Result<bool> {
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn parse_id(args: &[String], command: &str) -> anyhow::Result<u64> {
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("{command} requires a task id"))?;
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("{command}: invalid task id: {raw}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mod {
    Priority(Priority),
    Category(Category),
    Due(Option<NaiveDate>),
}

/// Splits `key:value` modifiers from free text. Everything after `--` is
/// text.
fn split_words_and_mods(
    args: &[String],
    now: DateTime<Utc>,
    tz: Tz,
) -> anyhow::Result<(Vec<String>, Vec<Mod>)> {
    let mut words = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" && !literal {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, now, tz)? {
            mods.push(one_mod);
            continue;
        }

        words.push(arg.clone());
    }

    Ok((words, mods))
}

fn parse_one_mod(tok: &str, now: DateTime<Utc>, tz: Tz) -> anyhow::Result<Option<Mod>> {
    let Some((key, value)) = tok.split_once(':').or_else(|| tok.split_once('=')) else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "pri" | "priority" => Ok(Some(Mod::Priority(value.parse()?))),
        "cat" | "category" => Ok(Some(Mod::Category(value.parse()?))),
        "due" => {
            let due = match value.trim().to_ascii_lowercase().as_str() {
                "" | "none" => None,
                _ => Some(parse_due_expr(value, now, tz)?),
            };
            Ok(Some(Mod::Due(due)))
        }
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ListQuery {
    filter: FilterOptions,
    key: SortKey,
    direction: SortDirection,
}

/// List arguments on top of the rc defaults (`sort.key`, `sort.direction`,
/// `show.completed`).
fn parse_list_query(cfg: &Config, args: &[String]) -> anyhow::Result<ListQuery> {
    let mut query = ListQuery {
        filter: FilterOptions {
            show_completed: cfg.get_bool("show.completed").unwrap_or(true),
            ..FilterOptions::default()
        },
        key: cfg
            .get("sort.key")
            .map(|raw| raw.parse())
            .transpose()
            .context("invalid sort.key setting")?
            .unwrap_or_default(),
        direction: cfg
            .get("sort.direction")
            .map(|raw| raw.parse())
            .transpose()
            .context("invalid sort.direction setting")?
            .unwrap_or_default(),
    };

    let mut words = Vec::new();
    for arg in args {
        match arg.as_str() {
            "+overdue" => query.filter.show_overdue = true,
            "-overdue" => query.filter.show_overdue = false,
            "+completed" => query.filter.show_completed = true,
            "-completed" => query.filter.show_completed = false,
            _ => {
                let Some((key, value)) = arg.split_once(':') else {
                    words.push(arg.as_str());
                    continue;
                };
                match key.to_ascii_lowercase().as_str() {
                    "pri" | "priority" => query.filter.priority = parse_or_all(value)?,
                    "cat" | "category" => query.filter.category = parse_or_all(value)?,
                    "sort" => query.key = value.parse()?,
                    "order" | "dir" => query.direction = value.parse()?,
                    _ => words.push(arg.as_str()),
                }
            }
        }
    }
    query.filter.search_query = words.join(" ");

    Ok(query)
}

fn parse_or_all<T>(value: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    if value.trim().eq_ignore_ascii_case("all") {
        Ok(None)
    } else {
        value.parse().map(Some)
    }
}
