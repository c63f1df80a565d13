//! Field-level mapping between records and iCalendar components.
//!
//! | record field                  | property           |
//! |-------------------------------|--------------------|
//! | title                         | SUMMARY            |
//! | description / content         | DESCRIPTION        |
//! | start_time / date             | DTSTART            |
//! | end_time                      | DTEND              |
//! | due_date                      | DUE                |
//! | completion_date               | COMPLETED          |
//! | location                      | LOCATION           |
//! | attendees                     | ATTENDEE (one each)|
//! | categories                    | CATEGORIES         |
//! | tags                          | X-TAGS             |
//! | status, priority, url         | STATUS, PRIORITY, URL |
//! | percent_complete              | PERCENT-COMPLETE   |
//! | rrule                         | RRULE              |

use std::str::FromStr;

use chrono::Utc;

use crate::native::{NativeComponent, NativeProperty};
use crate::record::{
    Attendee, CalendarRecord, DEFAULT_PRIORITY, Event, Journal, RecurrenceRule, Todo,
};
use crate::time::RecordTime;

/// Translation between a record kind and its native component.
pub trait Translate: CalendarRecord {
    /// Read a record out of a component. Absent properties become empty defaults;
    /// without a store id the component UID is used.
    fn from_component(component: &NativeComponent, id: Option<String>) -> Self;

    /// Write one record field onto the component, replacing what was there.
    /// Empty values remove the property.
    fn write_field(&self, component: &mut NativeComponent, field: &str);

    /// A complete component for a new resource.
    fn to_component(&self) -> NativeComponent {
        let mut component = NativeComponent::new(Self::KIND.component_name());
        component.push(NativeProperty::new("UID", self.id()));
        component.push(NativeProperty::new(
            "DTSTAMP",
            Utc::now().format("%Y%m%dT%H%M%SZ").to_string(),
        ));
        self.apply_fields(&mut component, Self::FIELDS);
        component
    }

    /// Rewrite only the named fields.
    fn apply_fields(&self, component: &mut NativeComponent, fields: &[&str]) {
        for field in fields {
            self.write_field(component, field);
        }
    }
}

impl Translate for Event {
    fn from_component(c: &NativeComponent, id: Option<String>) -> Self {
        Event {
            id: record_id(c, id),
            title: text(c, "SUMMARY"),
            description: text(c, "DESCRIPTION"),
            start_time: time(c, "DTSTART"),
            end_time: time(c, "DTEND"),
            location: text(c, "LOCATION"),
            attendees: c
                .properties_named("ATTENDEE")
                .map(|p| Attendee {
                    name: p.param("CN").map(str::to_string),
                    ..Attendee::from_uri(&p.value)
                })
                .collect(),
            categories: list(c, "CATEGORIES"),
            status: parsed(c, "STATUS"),
            priority: priority(c),
            url: raw(c, "URL"),
            rrule: c
                .property("RRULE")
                .and_then(|p| RecurrenceRule::parse_rrule(&p.value).ok()),
        }
    }

    fn write_field(&self, c: &mut NativeComponent, field: &str) {
        match field {
            "title" => set_text(c, "SUMMARY", &self.title),
            "description" => set_text(c, "DESCRIPTION", &self.description),
            "start_time" => set_time(c, "DTSTART", self.start_time.as_ref()),
            "end_time" => set_time(c, "DTEND", self.end_time.as_ref()),
            "location" => set_text(c, "LOCATION", &self.location),
            "attendees" => c.set_all(
                "ATTENDEE",
                self.attendees
                    .iter()
                    .map(|a| {
                        let property = NativeProperty::new("ATTENDEE", a.to_uri());
                        match &a.name {
                            Some(name) => property.with_param("CN", name.as_str()),
                            None => property,
                        }
                    })
                    .collect(),
            ),
            "categories" => set_list(c, "CATEGORIES", &self.categories),
            "status" => c.set(NativeProperty::new("STATUS", self.status.as_str())),
            "priority" => c.set(NativeProperty::new("PRIORITY", self.priority.to_string())),
            "url" => set_text(c, "URL", &self.url),
            "rrule" => match &self.rrule {
                Some(rule) => c.set(NativeProperty::new("RRULE", rule.to_rrule())),
                None => c.remove("RRULE"),
            },
            _ => {}
        }
    }
}

impl Translate for Todo {
    fn from_component(c: &NativeComponent, id: Option<String>) -> Self {
        Todo {
            id: record_id(c, id),
            title: text(c, "SUMMARY"),
            description: text(c, "DESCRIPTION"),
            due_date: time(c, "DUE"),
            completion_date: time(c, "COMPLETED"),
            status: parsed(c, "STATUS"),
            priority: priority(c),
            categories: list(c, "CATEGORIES"),
            url: raw(c, "URL"),
            percent_complete: c
                .property("PERCENT-COMPLETE")
                .and_then(|p| p.value.trim().parse().ok())
                .unwrap_or(0),
        }
    }

    fn write_field(&self, c: &mut NativeComponent, field: &str) {
        match field {
            "title" => set_text(c, "SUMMARY", &self.title),
            "description" => set_text(c, "DESCRIPTION", &self.description),
            "due_date" => set_time(c, "DUE", self.due_date.as_ref()),
            "completion_date" => set_time(c, "COMPLETED", self.completion_date.as_ref()),
            "status" => c.set(NativeProperty::new("STATUS", self.status.as_str())),
            "priority" => c.set(NativeProperty::new("PRIORITY", self.priority.to_string())),
            "categories" => set_list(c, "CATEGORIES", &self.categories),
            "url" => set_text(c, "URL", &self.url),
            "percent_complete" => c.set(NativeProperty::new(
                "PERCENT-COMPLETE",
                self.percent_complete.to_string(),
            )),
            _ => {}
        }
    }
}

impl Translate for Journal {
    fn from_component(c: &NativeComponent, id: Option<String>) -> Self {
        Journal {
            id: record_id(c, id),
            date: time(c, "DTSTART"),
            title: text(c, "SUMMARY"),
            content: text(c, "DESCRIPTION"),
            tags: list(c, "X-TAGS"),
            categories: list(c, "CATEGORIES"),
            priority: priority(c),
            url: raw(c, "URL"),
        }
    }

    fn write_field(&self, c: &mut NativeComponent, field: &str) {
        match field {
            "date" => set_time(c, "DTSTART", self.date.as_ref()),
            "title" => set_text(c, "SUMMARY", &self.title),
            "content" => set_text(c, "DESCRIPTION", &self.content),
            "tags" => set_joined(c, "X-TAGS", &self.tags),
            "categories" => set_list(c, "CATEGORIES", &self.categories),
            "priority" => c.set(NativeProperty::new("PRIORITY", self.priority.to_string())),
            "url" => set_text(c, "URL", &self.url),
            _ => {}
        }
    }
}

fn record_id(c: &NativeComponent, id: Option<String>) -> String {
    id.filter(|id| !id.is_empty())
        .or_else(|| c.property("UID").map(|p| p.value.clone()))
        .unwrap_or_default()
}

fn text(c: &NativeComponent, name: &str) -> String {
    c.text(name).unwrap_or_default()
}

fn raw(c: &NativeComponent, name: &str) -> String {
    c.property(name).map(|p| p.value.clone()).unwrap_or_default()
}

fn time(c: &NativeComponent, name: &str) -> Option<RecordTime> {
    c.property(name).and_then(NativeProperty::time_value)
}

/// Values of every property with this name, list items flattened.
fn list(c: &NativeComponent, name: &str) -> Vec<String> {
    c.properties_named(name)
        .flat_map(NativeProperty::list_value)
        .collect()
}

/// PRIORITY 0 means undefined in iCalendar and reads as the default.
fn priority(c: &NativeComponent) -> i32 {
    c.property("PRIORITY")
        .and_then(|p| p.value.trim().parse::<i32>().ok())
        .filter(|p| *p != 0)
        .unwrap_or(DEFAULT_PRIORITY)
}

/// Enumerated value; unknown or missing values fall back to the default.
fn parsed<T: FromStr + Default>(c: &NativeComponent, name: &str) -> T {
    c.property(name)
        .and_then(|p| p.value.parse().ok())
        .unwrap_or_default()
}

fn set_text(c: &mut NativeComponent, name: &str, value: &str) {
    if value.is_empty() {
        c.remove(name);
    } else {
        c.set(NativeProperty::new(name, value));
    }
}

fn set_time(c: &mut NativeComponent, name: &str, value: Option<&RecordTime>) {
    match value {
        Some(time) => c.set(NativeProperty::time(name, time)),
        None => c.remove(name),
    }
}

/// One property per item; CATEGORIES may repeat.
fn set_list(c: &mut NativeComponent, name: &str, values: &[String]) {
    c.set_all(name, NativeProperty::repeated(name, values));
}

/// Extension properties are single-valued to the renderer and carry no TEXT
/// escaping, so the items go comma-joined on one line.
fn set_joined(c: &mut NativeComponent, name: &str, values: &[String]) {
    let items: Vec<String> = values
        .iter()
        .map(|v| v.replace([',', '\r', '\n'], " ").trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    set_text(c, name, &items.join(","));
}
