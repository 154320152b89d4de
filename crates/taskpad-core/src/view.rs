//! Render-ready projection of the task
//! list: search, tab filter, date
//! grouping and dashboard counts.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{
  Deserialize,
  Serialize
};

use crate::datetime::date_label;
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
  Today,
  Upcoming,
  Important,
  Completed,
  #[default]
  All
}

impl Tab {
  pub const ALL: [Tab; 5] = [
    Tab::Today,
    Tab::Upcoming,
    Tab::Important,
    Tab::Completed,
    Tab::All
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | Tab::Today => "today",
      | Tab::Upcoming => "upcoming",
      | Tab::Important => "important",
      | Tab::Completed => "completed",
      | Tab::All => "all"
    }
  }

  pub fn empty_message(
    self
  ) -> &'static str {
    match self {
      | Tab::Today => {
        "Nothing due today."
      }
      | Tab::Upcoming => {
        "No upcoming tasks."
      }
      | Tab::Important => {
        "No important tasks."
      }
      | Tab::Completed => {
        "No completed tasks yet."
      }
      | Tab::All => {
        "All caught up. Add a task to \
         get started."
      }
    }
  }

  fn admits(
    self,
    task: &Task,
    today: NaiveDate
  ) -> bool {
    match self {
      | Tab::Today => {
        !task.completed
          && task.due_date == Some(today)
      }
      | Tab::Upcoming => {
        !task.completed
          && task
            .due_date
            .is_some_and(|d| d > today)
      }
      | Tab::Completed => task.completed,
      | Tab::Important => {
        task.important && !task.completed
      }
      | Tab::All => !task.completed
    }
  }
}

impl fmt::Display for Tab {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Tab {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let lower =
      s.trim().to_ascii_lowercase();
    Tab::ALL
      .into_iter()
      .find(|tab| tab.as_str() == lower)
      .ok_or_else(|| {
        anyhow!(
          "unknown tab `{s}`; expected \
           today, upcoming, important, \
           completed or all"
        )
      })
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskViewFilter {
  pub tab:   Tab,
  pub query: String
}

impl TaskViewFilter {
  pub fn new(
    tab: Tab,
    query: impl Into<String>
  ) -> Self {
    Self {
      tab,
      query: query.into()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub struct Counts {
  pub total:       usize,
  pub completed:   usize,
  pub uncompleted: usize,
  pub today:       usize,
  pub upcoming:    usize,
  pub important:   usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup {
  pub date:  NaiveDate,
  pub label: String,
  pub tasks: Vec<Task>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
  pub tab:    Tab,
  pub items:  Vec<Task>,
  /// Only populated for the upcoming
  /// tab.
  pub groups: Option<Vec<DateGroup>>,
  pub counts: Counts
}

impl Projection {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

pub fn project(
  tasks: &[Task],
  filter: &TaskViewFilter,
  today: NaiveDate
) -> Projection {
  // Untrimmed: a lone space is a real
  // substring, not an empty search.
  let needle =
    filter.query.to_lowercase();

  let items: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      matches_query(task, &needle)
    })
    .filter(|task| {
      filter.tab.admits(task, today)
    })
    .cloned()
    .collect();

  let groups = (filter.tab
    == Tab::Upcoming)
    .then(|| group_by_date(&items, today));

  Projection {
    tab: filter.tab,
    items,
    groups,
    counts: counts(tasks, today)
  }
}

fn matches_query(
  task: &Task,
  needle: &str
) -> bool {
  if needle.is_empty() {
    return true;
  }
  task
    .title
    .to_lowercase()
    .contains(needle)
    || task
      .description
      .as_deref()
      .is_some_and(|d| {
        d.to_lowercase().contains(needle)
      })
}

// BTreeMap orders groups by date; pushes
// keep the filtered order inside a day.
fn group_by_date(
  items: &[Task],
  today: NaiveDate
) -> Vec<DateGroup> {
  let mut by_date: BTreeMap<
    NaiveDate,
    Vec<Task>
  > = BTreeMap::new();
  for task in items {
    if let Some(date) = task.due_date {
      by_date
        .entry(date)
        .or_default()
        .push(task.clone());
    }
  }

  by_date
    .into_iter()
    .map(|(date, tasks)| DateGroup {
      date,
      label: date_label(date, today),
      tasks
    })
    .collect()
}

pub fn counts(
  tasks: &[Task],
  today: NaiveDate
) -> Counts {
  let mut counts = Counts {
    total: tasks.len(),
    ..Counts::default()
  };
  for task in tasks {
    if task.completed {
      counts.completed += 1;
      continue;
    }
    if Tab::Today.admits(task, today) {
      counts.today += 1;
    }
    if Tab::Upcoming.admits(task, today)
    {
      counts.upcoming += 1;
    }
    if task.important {
      counts.important += 1;
    }
  }
  counts.uncompleted =
    counts.total - counts.completed;
  counts
}

/// Due text for one task, e.g.
/// "Tomorrow at 3:30 PM".
pub fn due_label(
  task: &Task,
  today: NaiveDate
) -> Option<String> {
  let date = task.due_date?;
  let label = date_label(date, today);
  Some(match task.due_time {
    | Some(time) => {
      format!("{label} at {time}")
    }
    | None => label
  })
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .unwrap()
  }

  fn due(
    id: &str,
    title: &str,
    date: Option<NaiveDate>
  ) -> Task {
    let mut task = Task::new(id, title);
    task.due_date = date;
    task
  }

  fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks
      .iter()
      .map(|t| t.id.as_str())
      .collect()
  }

  #[test]
  fn today_boundary() {
    let today = ymd(2024, 5, 1);
    let mut task =
      due("1", "Standup", Some(today));

    let on_today = project(
      std::slice::from_ref(&task),
      &TaskViewFilter::new(Tab::Today, ""),
      today
    );
    assert_eq!(ids(&on_today.items), [
      "1"
    ]);
    let upcoming = project(
      std::slice::from_ref(&task),
      &TaskViewFilter::new(
        Tab::Upcoming,
        ""
      ),
      today
    );
    assert!(upcoming.is_empty());

    task.completed = true;
    for tab in [Tab::Today, Tab::Upcoming]
    {
      let view = project(
        std::slice::from_ref(&task),
        &TaskViewFilter::new(tab, ""),
        today
      );
      assert!(view.is_empty());
    }
  }

  #[test]
  fn upcoming_is_strictly_after_today() {
    let today = ymd(2024, 5, 1);
    let tasks = vec![
      due("same", "a", Some(today)),
      due(
        "next",
        "b",
        Some(ymd(2024, 5, 2))
      ),
      due("none", "c", None),
    ];
    let view = project(
      &tasks,
      &TaskViewFilter::new(
        Tab::Upcoming,
        ""
      ),
      today
    );
    assert_eq!(ids(&view.items), [
      "next"
    ]);
  }

  #[test]
  fn upcoming_groups_sort_by_date() {
    let today = ymd(2024, 4, 30);
    let tasks = vec![
      due(
        "c",
        "third",
        Some(ymd(2024, 5, 3))
      ),
      due(
        "a",
        "first",
        Some(ymd(2024, 5, 1))
      ),
      due(
        "b",
        "second",
        Some(ymd(2024, 5, 2))
      ),
      due(
        "a2",
        "first again",
        Some(ymd(2024, 5, 1))
      ),
    ];
    let view = project(
      &tasks,
      &TaskViewFilter::new(
        Tab::Upcoming,
        ""
      ),
      today
    );
    let groups = view.groups.unwrap();
    let dates: Vec<NaiveDate> = groups
      .iter()
      .map(|g| g.date)
      .collect();
    assert_eq!(dates, vec![
      ymd(2024, 5, 1),
      ymd(2024, 5, 2),
      ymd(2024, 5, 3)
    ]);
    assert_eq!(groups[0].label, "Tomorrow");
    assert_eq!(groups[1].label, "May 2");
    assert_eq!(ids(&groups[0].tasks), [
      "a", "a2"
    ]);
  }

  #[test]
  fn only_upcoming_groups() {
    let today = ymd(2024, 5, 1);
    let tasks =
      vec![due("1", "x", Some(today))];
    let view = project(
      &tasks,
      &TaskViewFilter::new(Tab::Today, ""),
      today
    );
    assert!(view.groups.is_none());
  }

  #[test]
  fn search_filters_before_tabs() {
    let today = ymd(2024, 5, 1);
    let mut rent = Task::new("2", "Pay rent");
    rent.description =
      Some("Landlord wants MILK money".to_string());
    let tasks = vec![
      Task::new("1", "Buy milk"),
      Task::new("3", "Pay rent"),
    ];
    let view = project(
      &tasks,
      &TaskViewFilter::new(
        Tab::All,
        "milk"
      ),
      today
    );
    assert_eq!(ids(&view.items), ["1"]);

    let with_desc =
      vec![tasks[0].clone(), rent];
    let view = project(
      &with_desc,
      &TaskViewFilter::new(
        Tab::All,
        "Milk"
      ),
      today
    );
    assert_eq!(ids(&view.items), [
      "1", "2"
    ]);
  }

  #[test]
  fn whitespace_query_is_literal() {
    let today = ymd(2024, 5, 1);
    let tasks = vec![
      Task::new("1", "Buy milk"),
      Task::new("2", "Taxes"),
    ];
    let view = project(
      &tasks,
      &TaskViewFilter::new(Tab::All, " "),
      today
    );
    assert_eq!(ids(&view.items), ["1"]);

    let view = project(
      &tasks,
      &TaskViewFilter::new(
        Tab::All,
        "   "
      ),
      today
    );
    assert!(view.is_empty());
    assert_eq!(view.counts.total, 2);
  }

  #[test]
  fn tab_rules() {
    let today = ymd(2024, 5, 1);
    let mut done =
      due("done", "d", Some(today));
    done.completed = true;
    done.important = true;
    let mut star = Task::new("star", "s");
    star.important = true;
    let plain = Task::new("plain", "p");
    let tasks =
      vec![done, star, plain];

    let pick = |tab| {
      project(
        &tasks,
        &TaskViewFilter::new(tab, ""),
        today
      )
      .items
      .into_iter()
      .map(|t| t.id)
      .collect::<Vec<_>>()
    };
    assert_eq!(pick(Tab::Completed), [
      "done"
    ]);
    assert_eq!(pick(Tab::Important), [
      "star"
    ]);
    assert_eq!(pick(Tab::All), [
      "star", "plain"
    ]);
  }

  #[test]
  fn counts_ignore_tab_and_search() {
    let today = ymd(2024, 5, 1);
    let mut done =
      due("1", "done", Some(today));
    done.completed = true;
    let mut star = due(
      "2",
      "star",
      Some(ymd(2024, 5, 9))
    );
    star.important = true;
    let tasks = vec![
      done,
      star,
      due("3", "due today", Some(today)),
      due(
        "4",
        "overdue",
        Some(ymd(2024, 4, 1))
      ),
    ];

    let expected = Counts {
      total:       4,
      completed:   1,
      uncompleted: 3,
      today:       1,
      upcoming:    1,
      important:   1
    };
    for tab in Tab::ALL {
      for query in ["", "star", "zzz"] {
        let view = project(
          &tasks,
          &TaskViewFilter::new(
            tab, query
          ),
          today
        );
        assert_eq!(view.counts, expected);
      }
    }
  }

  #[test]
  fn due_label_includes_time() {
    let today = ymd(2024, 5, 1);
    let mut task = due(
      "1",
      "x",
      Some(ymd(2024, 5, 2))
    );
    assert_eq!(
      due_label(&task, today).as_deref(),
      Some("Tomorrow")
    );
    task.due_time =
      Some("3:30 PM".parse().unwrap());
    assert_eq!(
      due_label(&task, today).as_deref(),
      Some("Tomorrow at 3:30 PM")
    );
    task.due_date = None;
    assert_eq!(due_label(&task, today), None);
  }

  #[test]
  fn tabs_parse_case_insensitively() {
    assert_eq!(
      "Upcoming".parse::<Tab>().unwrap(),
      Tab::Upcoming
    );
    assert!("later".parse::<Tab>().is_err());
  }
}
