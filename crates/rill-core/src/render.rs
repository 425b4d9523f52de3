use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_due, is_overdue};
use crate::persistence::Mode;
use crate::task::{Priority, Task};
use crate::view::Stats;

pub const EMPTY_INCOMPLETE_MESSAGE: &str = "No incomplete tasks.";
pub const EMPTY_COMPLETED_MESSAGE: &str = "No completed tasks.";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, tz })
    }

    pub fn plain(tz: Tz) -> Self {
        Self { color: false, tz }
    }

    /// Incomplete and completed sections, each with a count and an
    /// empty-state line.
    #[tracing::instrument(skip(self, out, incomplete, completed, now))]
    pub fn write_sections<W: Write>(
        &self,
        out: &mut W,
        incomplete: &[Task],
        completed: &[Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        writeln!(out, "Incomplete ({})", incomplete.len())?;
        if incomplete.is_empty() {
            writeln!(out, "  {EMPTY_INCOMPLETE_MESSAGE}")?;
        } else {
            self.write_task_table(out, incomplete, now)?;
        }
        writeln!(out)?;

        writeln!(out, "Completed ({})", completed.len())?;
        if completed.is_empty() {
            writeln!(out, "  {EMPTY_COMPLETED_MESSAGE}")?;
        } else {
            self.write_task_table(out, completed, now)?;
        }
        Ok(())
    }

    fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let rows: Vec<Vec<Cell>> = tasks
            .iter()
            .map(|task| {
                let priority_color = (task.priority == Priority::High).then_some(RED);
                let (due, due_color) = match task.due_date {
                    Some(date) => {
                        let late = !task.completed && is_overdue(date, now, self.tz);
                        (format_due(date), late.then_some(RED))
                    }
                    None => (String::new(), None),
                };
                vec![
                    Cell::colored(task.id.to_string(), Some(YELLOW)),
                    Cell::colored(task.priority.to_string(), priority_color),
                    Cell::plain(task.category.to_string()),
                    Cell::colored(due, due_color),
                    Cell::plain(task.text.clone()),
                ]
            })
            .collect();

        self.write_table(out, SECTION_INDENT, &TASK_HEADERS, &rows)
    }

    #[tracing::instrument(skip(self, out, task))]
    pub fn write_task_info<W: Write>(&self, out: &mut W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "text      {}", task.text)?;
        writeln!(
            out,
            "status    {}",
            if task.completed { "completed" } else { "incomplete" }
        )?;
        writeln!(out, "priority  {}", task.priority)?;
        writeln!(out, "category  {}", task.category)?;
        if let Some(due) = task.due_date {
            writeln!(out, "due       {}", format_due(due))?;
        }
        writeln!(out, "created   {}", task.created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(out, "updated   {}", task.updated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        Ok(())
    }

    pub fn write_stats<W: Write>(&self, out: &mut W, stats: &Stats, mode: Mode) -> anyhow::Result<()> {
        writeln!(out, "storage        {mode}")?;
        writeln!(out, "total          {}", stats.total)?;
        writeln!(out, "incomplete     {}", stats.incomplete)?;
        writeln!(out, "completed      {}", stats.completed)?;
        writeln!(out, "overdue        {}", stats.overdue)?;
        writeln!(out, "high priority  {}", stats.high_priority)?;
        Ok(())
    }

    /// Aligned columns; widths are measured on the raw text so colour
    /// codes never shift them.
    fn write_table<W: Write>(
        &self,
        out: &mut W,
        indent: &str,
        headers: &[&str],
        rows: &[Vec<Cell>],
    ) -> anyhow::Result<()> {
        let mut widths: Vec<usize> = headers.iter().map(|h| UnicodeWidthStr::width(*h)).collect();
        for row in rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.width());
            }
        }

        write!(out, "{indent}")?;
        for (header, width) in headers.iter().zip(&widths) {
            write!(out, "{header:width$} ", width = *width)?;
        }
        writeln!(out)?;

        write!(out, "{indent}")?;
        for width in &widths {
            write!(out, "{} ", "-".repeat(*width))?;
        }
        writeln!(out)?;

        for row in rows {
            write!(out, "{indent}")?;
            for (cell, width) in row.iter().zip(&widths) {
                let padding = width.saturating_sub(cell.width());
                write!(out, "{}{} ", self.paint(cell), " ".repeat(padding))?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    fn paint(&self, cell: &Cell) -> String {
        match cell.color {
            Some(code) if self.color => format!("\x1b[{code}m{}\x1b[0m", cell.text),
            _ => cell.text.clone(),
        }
    }
}

const SECTION_INDENT: &str = "  ";
const TASK_HEADERS: [&str; 5] = ["ID", "Pri", "Category", "Due", "Text"];
const RED: &str = "31";
const YELLOW: &str = "33";

struct Cell {
    text: String,
    color: Option<&'static str>,
}

impl Cell {
    fn plain(text: String) -> Self {
        Self { text, color: None }
    }

    fn colored(text: String, color: Option<&'static str>) -> Self {
        Self { text, color }
    }

    fn width(&self) -> usize {
        UnicodeWidthStr::width(self.text.as_str())
    }
}
