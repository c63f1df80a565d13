//! Remote calendar store abstraction.
//!
//! A [`Connector`] turns resolved settings into a live [`CalendarSession`]. The
//! gateway only ever talks to these traits, so the CalDAV backend and the
//! in-memory store are interchangeable.

mod caldav;
mod memory;

pub use caldav::{CalDavConnector, CalDavSession};
pub use memory::{MemoryConnector, MemorySession};

use crate::config::Settings;
use crate::error::{CalDavError, CalDavResult};
use crate::native::NativeRecord;
use crate::record::RecordKind;
use crate::time::TimeRange;

/// A calendar collection exposed by the principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Path of the collection, always ending in `/`
    pub href: String,
    pub name: String,
}

impl Collection {
    pub fn new(href: impl Into<String>, name: impl Into<String>) -> Self {
        let mut href = href.into();
        if !href.ends_with('/') {
            href.push('/');
        }
        Collection {
            href,
            name: name.into(),
        }
    }

    /// Path of a resource inside this collection (`{collection}/{id}.ics`).
    pub fn resource_href(&self, id: &str) -> CalDavResult<String> {
        check_id(id)?;
        Ok(format!("{}{}.ics", self.href, id))
    }
}

/// An id must stay a single path segment of its collection. Percent-escapes
/// are kept as the server sent them.
fn check_id(id: &str) -> CalDavResult<()> {
    let outside_segment = |c: char| {
        matches!(c, '/' | '\\' | '?' | '#') || c.is_control() || c.is_whitespace()
    };
    if id.is_empty() || id == "." || id == ".." || id.contains(outside_segment) {
        return Err(CalDavError::InvalidParameters(format!(
            "Invalid identifier '{}'",
            id.escape_debug()
        )));
    }
    Ok(())
}

/// Resource name without its `.ics` suffix.
pub fn id_from_href(href: &str) -> String {
    let name = href.trim_end_matches('/').rsplit('/').next().unwrap_or(href);
    name.strip_suffix(".ics").unwrap_or(name).to_string()
}

#[allow(async_fn_in_trait)]
pub trait Connector {
    type Session: CalendarSession;

    /// Establish a session. Failures are [`CalDavError::Authentication`](crate::CalDavError::Authentication).
    async fn connect(&self, settings: &Settings) -> CalDavResult<Self::Session>;
}

#[allow(async_fn_in_trait)]
pub trait CalendarSession {
    /// Calendar collections of the principal, in server order.
    async fn calendars(&self) -> CalDavResult<Vec<Collection>>;

    /// Fetch one resource by id. Missing resources are [`CalDavError::NotFound`](crate::CalDavError::NotFound).
    async fn fetch(&self, collection: &Collection, id: &str) -> CalDavResult<NativeRecord>;

    /// Every resource in the collection.
    async fn fetch_all(&self, collection: &Collection) -> CalDavResult<Vec<NativeRecord>>;

    /// Resources with a component of `kind` overlapping `range`.
    async fn query(
        &self,
        collection: &Collection,
        kind: RecordKind,
        range: &TimeRange,
    ) -> CalDavResult<Vec<NativeRecord>>;

    /// Store a record. Records without an href are created, others replaced.
    /// Returns the store identifier.
    async fn save(&self, collection: &Collection, record: &NativeRecord) -> CalDavResult<String>;

    async fn delete(&self, collection: &Collection, record: &NativeRecord) -> CalDavResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_href_and_id_round_trip() {
        let collection = Collection::new("/dav/calendars/user/work", "Work");
        assert_eq!(collection.href, "/dav/calendars/user/work/");

        let href = collection.resource_href("abc-123").unwrap();
        assert_eq!(href, "/dav/calendars/user/work/abc-123.ics");
        assert_eq!(id_from_href(&href), "abc-123");
        assert_eq!(id_from_href("plain"), "plain");
    }

    #[test]
    fn test_ids_must_stay_inside_collection() {
        let collection = Collection::new("/cal/work/", "Work");
        for id in ["../other/x", "a/b", "..", ".", "", "x?y", "x#y", "a\\b", "a b", "a\nb"] {
            let err = collection.resource_href(id).expect_err(id);
            assert!(
                matches!(err, CalDavError::InvalidParameters(_)),
                "{id:?} should be rejected, got {err:?}"
            );
        }
        assert_eq!(
            collection.resource_href("My%20Event").unwrap(),
            "/cal/work/My%20Event.ics",
            "server percent-escapes pass through"
        );
    }
}
