use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use taskpad_wire::ProfileDto;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::session::AuthSession;
use crate::task::Task;
use crate::view::{Counts, Projection, due_label};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("display.color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid display.color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, projection, today), fields(tab = %projection.tab))]
    pub fn print_projection(&self, projection: &Projection, today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_projection(&mut out, projection, today)
    }

    pub fn write_projection<W: Write>(
        &self,
        mut out: W,
        projection: &Projection,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if projection.is_empty() {
            writeln!(out, "{}", projection.tab.empty_message())?;
        } else if let Some(groups) = &projection.groups {
            for (idx, group) in groups.iter().enumerate() {
                if idx > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "{}", self.paint(&group.label, "1"))?;
                self.write_tasks(&mut out, &group.tasks, today)?;
            }
        } else {
            self.write_tasks(&mut out, &projection.items, today)?;
        }

        writeln!(out)?;
        writeln!(out, "{}", summary_line(&projection.counts))?;
        Ok(())
    }

    fn write_tasks<W: Write>(&self, out: W, tasks: &[Task], today: NaiveDate) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            " ".to_string(),
            "Due".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(&task.id, "33");
            let flags = match (task.completed, task.important) {
                (true, _) => "✓".to_string(),
                (false, true) => self.paint("★", "35"),
                (false, false) => String::new(),
            };
            let due = due_label(task, today).unwrap_or_default();
            let due = if task.is_overdue(today) {
                self.paint(&due, "31")
            } else {
                due
            };
            rows.push(vec![id, flags, due, task.title.clone()]);
        }

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, task, today))]
    pub fn print_task(&self, task: &Task, today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if let Some(description) = &task.description {
            writeln!(out, "description {description}")?;
        }
        if let Some(due) = due_label(task, today) {
            let due = if task.is_overdue(today) {
                self.paint(&format!("{due} (overdue)"), "31")
            } else {
                due
            };
            writeln!(out, "due         {due}")?;
        }
        writeln!(out, "important   {}", yes_no(task.important))?;
        writeln!(out, "completed   {}", yes_no(task.completed))?;
        Ok(())
    }

    pub fn print_profile(&self, profile: &ProfileDto) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "id        {}", profile.id)?;
        writeln!(out, "username  {}", profile.username)?;
        writeln!(out, "email     {}", profile.email)?;
        if let Some(picture) = &profile.profile_picture {
            writeln!(out, "picture   {picture}")?;
        }
        Ok(())
    }

    pub fn print_session(&self, session: &AuthSession) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let name = session
            .display_name
            .as_deref()
            .or(session.email.as_deref())
            .unwrap_or("unknown user");
        writeln!(out, "Signed in as {}.", self.paint(name, "32"))?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || text.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn summary_line(counts: &Counts) -> String {
    format!(
        "{} of {} completed, {} due today, {} upcoming, {} important",
        counts.completed, counts.total, counts.today, counts.upcoming, counts.important
    )
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
