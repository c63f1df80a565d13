use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::{CalendarRecord, DEFAULT_PRIORITY, RecordKind, new_id};
use crate::error::{CalDavError, CalDavResult};
use crate::native::{NativeComponent, NativeProperty};
use crate::time::RecordTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TodoStatus {
    #[default]
    #[serde(rename = "NEEDS-ACTION")]
    NeedsAction,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "IN-PROCESS")]
    InProcess,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::NeedsAction => "NEEDS-ACTION",
            TodoStatus::Completed => "COMPLETED",
            TodoStatus::InProcess => "IN-PROCESS",
            TodoStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TodoStatus {
    type Err = CalDavError;

    fn from_str(s: &str) -> CalDavResult<Self> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "NEEDS-ACTION" => Ok(TodoStatus::NeedsAction),
            "COMPLETED" => Ok(TodoStatus::Completed),
            "IN-PROCESS" => Ok(TodoStatus::InProcess),
            "CANCELLED" => Ok(TodoStatus::Cancelled),
            other => Err(CalDavError::InvalidParameters(format!(
                "Unknown todo status '{}'",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for TodoStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => s.parse().map_err(serde::de::Error::custom),
            None => Ok(TodoStatus::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Todo {
    #[serde(deserialize_with = "super::nullable")]
    pub id: String,
    #[serde(deserialize_with = "super::nullable")]
    pub title: String,
    #[serde(deserialize_with = "super::nullable")]
    pub description: String,
    pub due_date: Option<RecordTime>,
    pub completion_date: Option<RecordTime>,
    pub status: TodoStatus,
    #[serde(deserialize_with = "super::nullable_priority")]
    pub priority: i32,
    #[serde(deserialize_with = "super::nullable")]
    pub categories: Vec<String>,
    #[serde(deserialize_with = "super::nullable")]
    pub url: String,
    #[serde(deserialize_with = "super::nullable")]
    pub percent_complete: i32,
}

impl Default for Todo {
    fn default() -> Self {
        Todo {
            id: new_id(),
            title: String::new(),
            description: String::new(),
            due_date: None,
            completion_date: None,
            status: TodoStatus::default(),
            priority: DEFAULT_PRIORITY,
            categories: Vec::new(),
            url: String::new(),
            percent_complete: 0,
        }
    }
}

impl Todo {
    pub fn new(title: impl Into<String>) -> Self {
        Todo {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl CalendarRecord for Todo {
    const KIND: RecordKind = RecordKind::Todo;

    const FIELDS: &'static [&'static str] = &[
        "title",
        "description",
        "due_date",
        "completion_date",
        "status",
        "priority",
        "categories",
        "url",
        "percent_complete",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    /// Title non-empty, priority within 1..=9 and percent complete within 0..=100.
    fn validate(&self) -> bool {
        !self.title.is_empty()
            && (1..=9).contains(&self.priority)
            && (0..=100).contains(&self.percent_complete)
    }

    fn times_mut(&mut self) -> Vec<&mut Option<RecordTime>> {
        vec![&mut self.due_date, &mut self.completion_date]
    }

    fn to_ical(&self) -> String {
        let mut todo = NativeComponent::new(Self::KIND.component_name());
        todo.push(NativeProperty::new("UID", self.id.as_str()));
        todo.push(NativeProperty::new("SUMMARY", self.title.as_str()));
        todo.push(NativeProperty::new("DESCRIPTION", self.description.as_str()));
        if let Some(due) = &self.due_date {
            todo.push(NativeProperty::time("DUE", due));
        }
        if let Some(completed) = &self.completion_date {
            todo.push(NativeProperty::time("COMPLETED", completed));
        }
        todo.push(NativeProperty::new("STATUS", self.status.as_str()));
        todo.push(NativeProperty::new("PRIORITY", self.priority.to_string()));
        todo.push(NativeProperty::new(
            "PERCENT-COMPLETE",
            self.percent_complete.to_string(),
        ));
        if !self.url.is_empty() {
            todo.push(NativeProperty::new("URL", self.url.as_str()));
        }
        todo.to_ics()
    }
}
