use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use taskpad_wire::{TaskDto, TaskPatchPayload, TaskPayload};
use tracing::warn;

use crate::datetime::{DisplayZone, DueTime, format_deadline, parse_deadline};
use crate::validate::{self, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub due_time: Option<DueTime>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub important: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            due_date: None,
            due_time: None,
            completed: false,
            important: false,
        }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }

    /// Maps a backend record. A deadline that cannot be read is dropped
    /// rather than failing the whole list.
    pub fn from_dto(dto: TaskDto, zone: DisplayZone) -> Self {
        let (due_date, due_time) = match dto.deadline.as_deref() {
            Some(raw) => parse_deadline(raw, zone).unzip(),
            None => (None, None),
        };
        if due_date.is_none()
            && let Some(raw) = dto.deadline.as_deref()
            && !raw.trim().is_empty()
        {
            warn!(task = %dto.id, deadline = %raw, "ignoring unreadable deadline");
        }

        Self {
            id: dto.id,
            title: dto.title,
            description: dto.description.filter(|d| !d.trim().is_empty()),
            due_date,
            due_time: due_time.flatten(),
            completed: dto.is_completed,
            important: dto.is_important,
        }
    }

    pub fn to_payload(&self, user: Option<String>, zone: DisplayZone) -> anyhow::Result<TaskPayload> {
        let deadline = self
            .due_date
            .map(|date| format_deadline(date, self.due_time, zone))
            .transpose()?;
        Ok(TaskPayload {
            title: self.title.clone(),
            description: self.description.clone(),
            deadline,
            is_important: self.important,
            is_completed: self.completed,
            user,
        })
    }
}

/// Fields of the add-task form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<DueTime>,
    pub important: bool,
}

impl NewTask {
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        validate::title(&self.title)?;
        check_due(self.due_date, self.due_time, today)
    }

    pub fn into_task(self) -> Task {
        Task {
            id: String::new(),
            title: self.title.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            due_date: self.due_date,
            due_time: self.due_time,
            completed: false,
            important: self.important,
        }
    }
}

/// Changes from the edit-task form. `None` leaves a field alone;
/// `Some(None)` clears an optional one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub due_time: Option<Option<DueTime>>,
    pub important: Option<bool>,
    pub completed: Option<bool>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, task: &Task) -> Task {
        let mut next = task.clone();
        if let Some(title) = &self.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            next.description = description.clone().filter(|d| !d.trim().is_empty());
        }
        if let Some(due_date) = self.due_date {
            next.due_date = due_date;
            if due_date.is_none() {
                next.due_time = None;
            }
        }
        if let Some(due_time) = self.due_time {
            next.due_time = due_time;
        }
        if let Some(important) = self.important {
            next.important = important;
        }
        if let Some(completed) = self.completed {
            next.completed = completed;
        }
        next
    }

    /// Checks the edited task. The past-date rule only applies when the
    /// edit touches the due date, so old overdue tasks stay editable.
    pub fn validate(&self, edited: &Task, today: NaiveDate) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        validate::title(&edited.title)?;
        if self.due_date.is_some() {
            check_due(edited.due_date, edited.due_time, today)
        } else if edited.due_time.is_some() && edited.due_date.is_none() {
            Err(ValidationError::TimeWithoutDate)
        } else {
            Ok(())
        }
    }
}

fn check_due(
    due_date: Option<NaiveDate>,
    due_time: Option<DueTime>,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    match (due_date, due_time) {
        (None, Some(_)) => Err(ValidationError::TimeWithoutDate),
        (Some(date), _) => validate::due_date_not_past(date, today),
        (None, None) => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleField {
    Completed,
    Important,
}

impl ToggleField {
    pub fn current(self, task: &Task) -> bool {
        match self {
            ToggleField::Completed => task.completed,
            ToggleField::Important => task.important,
        }
    }

    pub fn set(self, task: &mut Task, value: bool) {
        match self {
            ToggleField::Completed => task.completed = value,
            ToggleField::Important => task.important = value,
        }
    }

    pub fn payload(self, value: bool) -> TaskPatchPayload {
        match self {
            ToggleField::Completed => TaskPatchPayload {
                is_completed: Some(value),
                ..Default::default()
            },
            ToggleField::Important => TaskPatchPayload {
                is_important: Some(value),
                ..Default::default()
            },
        }
    }
}

/// Every task mutation the client can ask the backend for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    Create(NewTask),
    Update { current: Task, edit: TaskEdit },
    Toggle { current: Task, field: ToggleField, value: bool },
    Delete { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Saved(Task),
    Deleted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn overdue_only_when_open_and_before_today() {
        let today = ymd(2024, 5, 2);
        let mut task = Task::new("1", "File taxes");
        task.due_date = Some(ymd(2024, 5, 1));
        assert!(task.is_overdue(today));

        task.completed = true;
        assert!(!task.is_overdue(today));

        task.completed = false;
        task.due_date = Some(today);
        assert!(!task.is_overdue(today));

        task.due_date = None;
        assert!(!task.is_overdue(today));
    }

    #[test]
    fn dto_mapping_splits_deadline_and_drops_garbage() {
        let zone = DisplayZone::default();
        let dto = TaskDto {
            id: "5".to_string(),
            title: "Dentist".to_string(),
            description: Some("".to_string()),
            deadline: Some("2024-05-03T15:30:00Z".to_string()),
            is_important: true,
            is_completed: false,
            user: Some("7".to_string()),
        };
        let task = Task::from_dto(dto.clone(), zone);
        assert_eq!(task.due_date, Some(ymd(2024, 5, 3)));
        assert_eq!(task.due_time.map(|t| t.to_string()).as_deref(), Some("3:30 PM"));
        assert_eq!(task.description, None);
        assert!(task.important);

        let garbled = TaskDto {
            deadline: Some("next tuesday-ish".to_string()),
            ..dto
        };
        let task = Task::from_dto(garbled, zone);
        assert_eq!(task.due_date, None);
        assert_eq!(task.due_time, None);
    }

    #[test]
    fn payload_carries_deadline_and_owner() {
        let mut task = Task::new("", "Dentist");
        task.due_date = Some(ymd(2024, 5, 3));
        task.due_time = Some("3:30 PM".parse().unwrap());
        let payload = task
            .to_payload(Some("7".to_string()), DisplayZone::default())
            .unwrap();
        assert_eq!(payload.deadline.as_deref(), Some("2024-05-03T15:30:00Z"));
        assert_eq!(payload.user.as_deref(), Some("7"));
        assert!(!payload.is_completed);

        let undated = Task::new("", "Someday").to_payload(None, DisplayZone::default()).unwrap();
        assert_eq!(undated.deadline, None);
    }

    #[test]
    fn new_task_validation() {
        let today = ymd(2024, 5, 2);
        let blank = NewTask {
            title: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(blank.validate(today), Err(ValidationError::EmptyTitle));

        let past = NewTask {
            title: "Late".to_string(),
            due_date: Some(ymd(2024, 5, 1)),
            ..Default::default()
        };
        assert_eq!(
            past.validate(today),
            Err(ValidationError::DueDateInPast(ymd(2024, 5, 1)))
        );

        let time_only = NewTask {
            title: "Call".to_string(),
            due_time: Some("9:00 AM".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(time_only.validate(today), Err(ValidationError::TimeWithoutDate));
    }

    #[test]
    fn edits_apply_and_clear_fields() {
        let today = ymd(2024, 5, 2);
        let mut task = Task::new("3", "Old title");
        task.due_date = Some(ymd(2024, 4, 1));
        task.due_time = Some("8:00 AM".parse().unwrap());
        task.description = Some("notes".to_string());

        let rename = TaskEdit {
            title: Some("New title".to_string()),
            ..Default::default()
        };
        let renamed = rename.apply(&task);
        assert_eq!(renamed.title, "New title");
        // Overdue task stays editable when the date is untouched.
        assert!(rename.validate(&renamed, today).is_ok());

        let clear = TaskEdit {
            description: Some(None),
            due_date: Some(None),
            ..Default::default()
        };
        let cleared = clear.apply(&task);
        assert_eq!(cleared.description, None);
        assert_eq!(cleared.due_date, None);
        assert_eq!(cleared.due_time, None);
        assert!(clear.validate(&cleared, today).is_ok());

        assert_eq!(
            TaskEdit::default().validate(&task, today),
            Err(ValidationError::EmptyUpdate)
        );
    }

    #[test]
    fn toggle_payload_names_one_field() {
        let payload = ToggleField::Important.payload(true);
        assert_eq!(payload.is_important, Some(true));
        assert_eq!(payload.is_completed, None);
    }
}
