//! Calendar records: events, to-dos and journal entries.
//!
//! Records are value snapshots of what the remote store holds. They know how to
//! validate themselves and how to turn into a plain key-value map, but the
//! translation to the store's native format lives in the gateway.

mod event;
mod journal;
mod recurrence;
mod todo;

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{CalDavError, CalDavResult};
use crate::time::RecordTime;

pub use event::{Attendee, Event, EventStatus};
pub use journal::Journal;
pub use recurrence::{Frequency, RecurrenceRule};
pub use todo::{Todo, TodoStatus};

pub const DEFAULT_PRIORITY: i32 = 5;

/// The three record kinds. No other kind exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Event,
    Todo,
    Journal,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Event, RecordKind::Todo, RecordKind::Journal];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Event => "event",
            RecordKind::Todo => "todo",
            RecordKind::Journal => "journal",
        }
    }

    /// iCalendar component name (VEVENT, VTODO, VJOURNAL)
    pub fn component_name(&self) -> &'static str {
        match self {
            RecordKind::Event => "VEVENT",
            RecordKind::Todo => "VTODO",
            RecordKind::Journal => "VJOURNAL",
        }
    }

    /// Key used for list payloads (`{"events": [...], "count": n}`)
    pub fn plural(&self) -> &'static str {
        match self {
            RecordKind::Event => "events",
            RecordKind::Todo => "todos",
            RecordKind::Journal => "journals",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = CalDavError;

    fn from_str(s: &str) -> CalDavResult<Self> {
        match s {
            "event" => Ok(RecordKind::Event),
            "todo" => Ok(RecordKind::Todo),
            "journal" => Ok(RecordKind::Journal),
            other => Err(CalDavError::Unsupported(format!("Unknown record kind '{}'", other))),
        }
    }
}

/// Capability shared by [`Event`], [`Todo`] and [`Journal`].
pub trait CalendarRecord: Serialize + DeserializeOwned + Clone + Into<Record> {
    const KIND: RecordKind;

    /// Field names of the key-value representation, `id` excluded.
    const FIELDS: &'static [&'static str];

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn title(&self) -> &str;

    fn priority(&self) -> i32;

    /// Title non-empty and priority within 1..=9.
    fn validate(&self) -> bool {
        !self.title().is_empty() && (1..=9).contains(&self.priority())
    }

    /// Mutable access to every date/time field, for timezone resolution.
    fn times_mut(&mut self) -> Vec<&mut Option<RecordTime>>;

    /// Minimal single-component iCalendar text. Not a full VCALENDAR document.
    fn to_ical(&self) -> String;

    /// Parsing calendar text into a record is not supported and always fails.
    fn from_ical(_ics: &str) -> CalDavResult<Self> {
        Err(CalDavError::Unsupported(format!(
            "Parsing iCalendar text into a {} record",
            Self::KIND
        )))
    }

    fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Build a record from a key-value map, generating an id when absent or empty.
    fn from_map(map: Map<String, Value>) -> CalDavResult<Self> {
        let mut record: Self = serde_json::from_value(Value::Object(map)).map_err(|e| {
            CalDavError::InvalidParameters(format!("Invalid {} fields: {}", Self::KIND, e))
        })?;
        if record.id().is_empty() {
            record.set_id(new_id());
        }
        Ok(record)
    }
}

/// Closed set of record variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Event(Event),
    Todo(Todo),
    Journal(Journal),
}

impl Record {
    pub fn from_map(kind: RecordKind, map: Map<String, Value>) -> CalDavResult<Self> {
        Ok(match kind {
            RecordKind::Event => Record::Event(Event::from_map(map)?),
            RecordKind::Todo => Record::Todo(Todo::from_map(map)?),
            RecordKind::Journal => Record::Journal(Journal::from_map(map)?),
        })
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Event(_) => RecordKind::Event,
            Record::Todo(_) => RecordKind::Todo,
            Record::Journal(_) => RecordKind::Journal,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Event(e) => e.id(),
            Record::Todo(t) => t.id(),
            Record::Journal(j) => j.id(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Record::Event(e) => e.title(),
            Record::Todo(t) => t.title(),
            Record::Journal(j) => j.title(),
        }
    }

    pub fn validate(&self) -> bool {
        match self {
            Record::Event(e) => e.validate(),
            Record::Todo(t) => t.validate(),
            Record::Journal(j) => j.validate(),
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            Record::Event(e) => e.to_map(),
            Record::Todo(t) => t.to_map(),
            Record::Journal(j) => j.to_map(),
        }
    }

    pub fn to_ical(&self) -> String {
        match self {
            Record::Event(e) => e.to_ical(),
            Record::Todo(t) => t.to_ical(),
            Record::Journal(j) => j.to_ical(),
        }
    }
}

impl From<Event> for Record {
    fn from(event: Event) -> Self {
        Record::Event(event)
    }
}

impl From<Todo> for Record {
    fn from(todo: Todo) -> Self {
        Record::Todo(todo)
    }
}

impl From<Journal> for Record {
    fn from(journal: Journal) -> Self {
        Record::Journal(journal)
    }
}

/// Random unique identifier for new records.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Treat an explicit JSON `null` like an absent field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_priority<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or(DEFAULT_PRIORITY))
}
