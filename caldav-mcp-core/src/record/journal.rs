use serde::{Deserialize, Serialize};

use super::{CalendarRecord, DEFAULT_PRIORITY, RecordKind, new_id};
use crate::native::{NativeComponent, NativeProperty};
use crate::time::RecordTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Journal {
    #[serde(deserialize_with = "super::nullable")]
    pub id: String,
    pub date: Option<RecordTime>,
    #[serde(deserialize_with = "super::nullable")]
    pub title: String,
    #[serde(deserialize_with = "super::nullable")]
    pub content: String,
    #[serde(deserialize_with = "super::nullable")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "super::nullable")]
    pub categories: Vec<String>,
    #[serde(deserialize_with = "super::nullable_priority")]
    pub priority: i32,
    #[serde(deserialize_with = "super::nullable")]
    pub url: String,
}

impl Default for Journal {
    fn default() -> Self {
        Journal {
            id: new_id(),
            date: None,
            title: String::new(),
            content: String::new(),
            tags: Vec::new(),
            categories: Vec::new(),
            priority: DEFAULT_PRIORITY,
            url: String::new(),
        }
    }
}

impl Journal {
    pub fn new(title: impl Into<String>) -> Self {
        Journal {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl CalendarRecord for Journal {
    const KIND: RecordKind = RecordKind::Journal;

    const FIELDS: &'static [&'static str] = &[
        "date",
        "title",
        "content",
        "tags",
        "categories",
        "priority",
        "url",
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
        vec![&mut self.date]
    }

    fn to_ical(&self) -> String {
        let mut journal = NativeComponent::new(Self::KIND.component_name());
        journal.push(NativeProperty::new("UID", self.id.as_str()));
        journal.push(NativeProperty::new("SUMMARY", self.title.as_str()));
        journal.push(NativeProperty::new("DESCRIPTION", self.content.as_str()));
        if let Some(date) = &self.date {
            journal.push(NativeProperty::time("DTSTART", date));
        }
        for category in NativeProperty::repeated("CATEGORIES", &self.categories) {
            journal.push(category);
        }
        journal.push(NativeProperty::new("PRIORITY", self.priority.to_string()));
        if !self.url.is_empty() {
            journal.push(NativeProperty::new("URL", self.url.as_str()));
        }
        journal.to_ics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_journal_map_round_trip_keeps_lists() {
        let journal: Journal = serde_json::from_value(json!({
            "id": "j-1",
            "title": "Retro",
            "content": "Went well",
            "tags": ["team"],
            "date": "2025-02-14"
        }))
        .unwrap();

        let map = journal.to_map();
        assert_eq!(map["date"], json!("2025-02-14"));
        assert_eq!(map["tags"], json!(["team"]));
        assert_eq!(map["categories"], json!([]));
        assert_eq!(map["priority"], json!(5));

        let back = Journal::from_map(map).unwrap();
        assert_eq!(back, journal);
    }

    #[test]
    fn test_to_ical_uses_description_for_content() {
        let mut journal = Journal::new("Notes");
        journal.content = "line one\nline two".to_string();
        let ics = journal.to_ical();
        assert!(ics.starts_with("BEGIN:VJOURNAL\r\n"));
        assert!(ics.contains("DESCRIPTION:line one\\nline two\r\n"));
        assert!(!ics.contains("DTSTART"), "no date means no DTSTART");
    }

    #[test]
    fn test_to_ical_carries_priority_and_categories() {
        let mut journal = Journal::new("Retro");
        journal.priority = 2;
        journal.categories = vec!["team".to_string(), "q1".to_string()];
        let ics = journal.to_ical();
        assert!(ics.contains("PRIORITY:2\r\n"), "got {ics}");
        assert!(ics.contains("CATEGORIES:team\r\n"), "got {ics}");
        assert!(ics.contains("CATEGORIES:q1\r\n"), "got {ics}");
    }
}
