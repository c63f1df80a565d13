//! The store's native record format: iCalendar components and properties.
//!
//! A [`NativeRecord`] is one calendar object resource as held by the server. It
//! is a walkable tree of named components, each carrying named properties whose
//! values are kept decoded. TEXT escaping and line folding belong to the
//! `icalendar` codec on either side.

mod generate;
mod parse;

pub use generate::{PRODID, generate_ics, render_component};
pub use parse::parse_ics;

use crate::error::CalDavResult;
use crate::record::RecordKind;
use crate::time::RecordTime;

/// One calendar object resource.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeRecord {
    /// Store identifier (resource name without the `.ics` suffix), when known
    pub id: Option<String>,
    /// Path of the resource on the server, when it has been stored
    pub href: Option<String>,
    /// Components inside the VCALENDAR wrapper
    pub components: Vec<NativeComponent>,
}

impl NativeRecord {
    pub fn new(components: Vec<NativeComponent>) -> Self {
        NativeRecord {
            id: None,
            href: None,
            components,
        }
    }

    /// Parse a VCALENDAR document.
    pub fn from_ics(id: Option<String>, href: Option<String>, content: &str) -> CalDavResult<Self> {
        Ok(NativeRecord {
            id,
            href,
            components: parse_ics(content)?,
        })
    }

    pub fn to_ics(&self) -> String {
        generate_ics(&self.components)
    }

    /// First component of the given kind.
    pub fn find(&self, kind: RecordKind) -> Option<&NativeComponent> {
        self.components
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(kind.component_name()))
    }

    pub fn find_mut(&mut self, kind: RecordKind) -> Option<&mut NativeComponent> {
        self.components
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(kind.component_name()))
    }

    /// UID of the first component that has one.
    pub fn uid(&self) -> Option<String> {
        self.components
            .iter()
            .find_map(|c| c.property("UID").map(|p| p.value.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeComponent {
    pub name: String,
    pub properties: Vec<NativeProperty>,
    pub components: Vec<NativeComponent>,
}

impl NativeComponent {
    pub fn new(name: impl Into<String>) -> Self {
        NativeComponent {
            name: name.into(),
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&NativeProperty> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn properties_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a NativeProperty> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.property(name).map(|p| p.value.clone())
    }

    pub fn push(&mut self, property: NativeProperty) {
        self.properties.push(property);
    }

    /// Replace every property with this name by `property`, keeping the position
    /// of the first one.
    pub fn set(&mut self, property: NativeProperty) {
        match self
            .properties
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(&property.name))
        {
            Some(index) => {
                let name = property.name.clone();
                self.properties[index] = property;
                let mut seen = false;
                self.properties.retain(|p| {
                    if !p.name.eq_ignore_ascii_case(&name) {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.properties.push(property),
        }
    }

    /// Replace every property with this name by `properties` (multi-valued properties).
    pub fn set_all(&mut self, name: &str, properties: Vec<NativeProperty>) {
        let index = self
            .properties
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
            .unwrap_or(self.properties.len());
        self.remove(name);
        let index = index.min(self.properties.len());
        self.properties.splice(index..index, properties);
    }

    pub fn remove(&mut self, name: &str) {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    /// Render this component alone (no VCALENDAR wrapper).
    pub fn to_ics(&self) -> String {
        render_component(self)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeProperty {
    pub name: String,
    pub params: Vec<(String, String)>,
    /// Decoded value
    pub value: String,
}

impl NativeProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        NativeProperty {
            name: name.into(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// One property per item, for properties that may repeat (CATEGORIES).
    pub fn repeated(name: &str, values: &[String]) -> Vec<Self> {
        values
            .iter()
            .map(|value| NativeProperty::new(name, value.as_str()))
            .collect()
    }

    /// DATE or DATE-TIME property; dates carry `VALUE=DATE`.
    pub fn time(name: impl Into<String>, time: &RecordTime) -> Self {
        let property = NativeProperty::new(name, time.to_ics_value());
        match time {
            RecordTime::Date(_) => property.with_param("VALUE", "DATE"),
            _ => property,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Read a DATE or DATE-TIME value, honouring `VALUE=DATE` and `TZID`.
    pub fn time_value(&self) -> Option<RecordTime> {
        let is_date = self
            .param("VALUE")
            .is_some_and(|v| v.eq_ignore_ascii_case("DATE"));
        RecordTime::from_ics_value(&self.value, self.param("TZID"), is_date)
    }

    /// Items of a comma-separated list value.
    pub fn list_value(&self) -> Vec<String> {
        self.value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_and_list_values() {
        let props = NativeProperty::repeated("CATEGORIES", &["work".to_string(), "home".to_string()]);
        let values: Vec<_> = props.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(values, vec!["work", "home"]);

        let joined = NativeProperty::new("CATEGORIES", "work, home,,travel");
        assert_eq!(joined.list_value(), vec!["work", "home", "travel"]);
    }

    #[test]
    fn test_set_replaces_all_same_named_properties_in_place() {
        let mut c = NativeComponent::new("VEVENT");
        c.push(NativeProperty::new("UID", "1"));
        c.push(NativeProperty::new("SUMMARY", "a"));
        c.push(NativeProperty::new("LOCATION", "x"));
        c.push(NativeProperty::new("summary", "b"));

        c.set(NativeProperty::new("SUMMARY", "c"));

        let names: Vec<_> = c.properties.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(names, vec!["1", "c", "x"]);
    }

    #[test]
    fn test_set_all_swaps_multi_valued_properties() {
        let mut c = NativeComponent::new("VEVENT");
        c.push(NativeProperty::new("UID", "1"));
        c.push(NativeProperty::new("ATTENDEE", "mailto:a@x.org"));
        c.push(NativeProperty::new("ATTENDEE", "mailto:b@x.org"));
        c.push(NativeProperty::new("SUMMARY", "s"));

        c.set_all("ATTENDEE", vec![NativeProperty::new("ATTENDEE", "mailto:c@x.org")]);

        let values: Vec<_> = c.properties.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(values, vec!["1", "mailto:c@x.org", "s"]);

        c.set_all("ATTENDEE", Vec::new());
        assert_eq!(c.properties_named("ATTENDEE").count(), 0);
    }

    #[test]
    fn test_time_properties_mark_dates() {
        let date = RecordTime::parse("2025-06-01").unwrap();
        let prop = NativeProperty::time("DTSTART", &date);
        assert_eq!(prop.param("VALUE"), Some("DATE"));
        assert_eq!(prop.value, "20250601");
        assert_eq!(prop.time_value(), Some(date));

        let instant = RecordTime::parse("2025-06-01T10:00:00Z").unwrap();
        let prop = NativeProperty::time("DUE", &instant);
        assert!(prop.params.is_empty());
        assert_eq!(prop.value, "20250601T100000Z");
    }

    #[test]
    fn test_record_finds_first_component_of_kind() {
        let mut todo = NativeComponent::new("VTODO");
        todo.push(NativeProperty::new("UID", "todo-1"));
        let record = NativeRecord::new(vec![NativeComponent::new("VTIMEZONE"), todo]);

        assert!(record.find(RecordKind::Todo).is_some());
        assert!(record.find(RecordKind::Event).is_none());
        assert_eq!(record.uid().as_deref(), Some("todo-1"));
    }
}
