use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::{CalendarRecord, DEFAULT_PRIORITY, RecordKind, RecurrenceRule, new_id};
use crate::error::{CalDavError, CalDavResult};
use crate::native::{NativeComponent, NativeProperty};
use crate::time::RecordTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EventStatus {
    #[default]
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[serde(rename = "TENTATIVE")]
    Tentative,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "CONFIRMED",
            EventStatus::Tentative => "TENTATIVE",
            EventStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = CalDavError;

    fn from_str(s: &str) -> CalDavResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Ok(EventStatus::Confirmed),
            "TENTATIVE" => Ok(EventStatus::Tentative),
            "CANCELLED" => Ok(EventStatus::Cancelled),
            other => Err(CalDavError::InvalidParameters(format!(
                "Unknown event status '{}'",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for EventStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => s.parse().map_err(serde::de::Error::custom),
            None => Ok(EventStatus::default()),
        }
    }
}

/// Event participant, identified by email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attendee {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Attendee {
    pub fn new(email: impl Into<String>) -> Self {
        Attendee {
            email: email.into(),
            name: None,
        }
    }

    /// Build from a calendar address, with or without the `mailto:` scheme.
    pub fn from_uri(value: &str) -> Self {
        let value = value.trim();
        let email = match value.get(..7) {
            Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &value[7..],
            _ => value,
        };
        Attendee::new(email)
    }

    pub fn to_uri(&self) -> String {
        format!("mailto:{}", self.email)
    }
}

impl<'de> Deserialize<'de> for Attendee {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Address(String),
            Fields {
                email: String,
                #[serde(default)]
                name: Option<String>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Address(address) => Attendee::from_uri(&address),
            Repr::Fields { email, name } => Attendee {
                name,
                ..Attendee::from_uri(&email)
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(deserialize_with = "super::nullable")]
    pub id: String,
    #[serde(deserialize_with = "super::nullable")]
    pub title: String,
    #[serde(deserialize_with = "super::nullable")]
    pub description: String,
    pub start_time: Option<RecordTime>,
    pub end_time: Option<RecordTime>,
    #[serde(deserialize_with = "super::nullable")]
    pub location: String,
    #[serde(deserialize_with = "super::nullable")]
    pub attendees: Vec<Attendee>,
    #[serde(deserialize_with = "super::nullable")]
    pub categories: Vec<String>,
    pub status: EventStatus,
    #[serde(deserialize_with = "super::nullable_priority")]
    pub priority: i32,
    #[serde(deserialize_with = "super::nullable")]
    pub url: String,
    pub rrule: Option<RecurrenceRule>,
}

impl Default for Event {
    fn default() -> Self {
        Event {
            id: new_id(),
            title: String::new(),
            description: String::new(),
            start_time: None,
            end_time: None,
            location: String::new(),
            attendees: Vec::new(),
            categories: Vec::new(),
            status: EventStatus::default(),
            priority: DEFAULT_PRIORITY,
            url: String::new(),
            rrule: None,
        }
    }
}

impl Event {
    pub fn new(title: impl Into<String>) -> Self {
        Event {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl CalendarRecord for Event {
    const KIND: RecordKind = RecordKind::Event;

    const FIELDS: &'static [&'static str] = &[
        "title",
        "description",
        "start_time",
        "end_time",
        "location",
        "attendees",
        "categories",
        "status",
        "priority",
        "url",
        "rrule",
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

    fn times_mut(&mut self) -> Vec<&mut Option<RecordTime>> {
        vec![&mut self.start_time, &mut self.end_time]
    }

    fn to_ical(&self) -> String {
        let mut event = NativeComponent::new(Self::KIND.component_name());
        event.push(NativeProperty::new("UID", self.id.as_str()));
        event.push(NativeProperty::new("SUMMARY", self.title.as_str()));
        event.push(NativeProperty::new("DESCRIPTION", self.description.as_str()));
        if let Some(start) = &self.start_time {
            event.push(NativeProperty::time("DTSTART", start));
        }
        if let Some(end) = &self.end_time {
            event.push(NativeProperty::time("DTEND", end));
        }
        event.push(NativeProperty::new("LOCATION", self.location.as_str()));
        event.push(NativeProperty::new("STATUS", self.status.as_str()));
        event.push(NativeProperty::new("PRIORITY", self.priority.to_string()));
        if !self.url.is_empty() {
            event.push(NativeProperty::new("URL", self.url.as_str()));
        }
        event.to_ics()
    }
}
