//! In-memory calendar store holding iCalendar text per resource.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use super::{CalendarSession, Collection, Connector, id_from_href};
use crate::config::Settings;
use crate::error::{CalDavError, CalDavResult};
use crate::native::{NativeComponent, NativeRecord};
use crate::record::RecordKind;
use crate::time::TimeRange;

#[derive(Debug, Default)]
struct MemoryState {
    calendars: Vec<Collection>,
    /// (href, ICS text) in insertion order
    resources: Vec<(String, String)>,
    connects: usize,
}

impl MemoryState {
    fn position(&self, href: &str) -> Option<usize> {
        self.resources.iter().position(|(h, _)| h == href)
    }
}

/// Connector for the in-memory store. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    credentials: Option<(String, String)>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    /// A store with a single `Default` calendar.
    pub fn new() -> Self {
        Self::with_calendars(vec![Collection::new("/calendars/user/default/", "Default")])
    }

    pub fn with_calendars(calendars: Vec<Collection>) -> Self {
        MemoryConnector {
            state: Arc::new(Mutex::new(MemoryState {
                calendars,
                ..Default::default()
            })),
            credentials: None,
        }
    }

    /// Reject sessions whose settings carry different credentials.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Seed a resource directly.
    pub fn insert(&self, collection: &Collection, id: &str, ics: &str) -> CalDavResult<()> {
        let href = collection.resource_href(id)?;
        let mut state = self.lock();
        match state.position(&href) {
            Some(index) => state.resources[index].1 = ics.to_string(),
            None => state.resources.push((href, ics.to_string())),
        }
        Ok(())
    }

    /// Stored ICS text for an id, searching every collection.
    pub fn resource(&self, id: &str) -> Option<String> {
        self.lock()
            .resources
            .iter()
            .find(|(href, _)| id_from_href(href) == id)
            .map(|(_, ics)| ics.clone())
    }

    /// Href a resource was stored under.
    pub fn href_of(&self, id: &str) -> Option<String> {
        self.lock()
            .resources
            .iter()
            .find(|(href, _)| id_from_href(href) == id)
            .map(|(href, _)| href.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Connector for MemoryConnector {
    type Session = MemorySession;

    async fn connect(&self, settings: &Settings) -> CalDavResult<MemorySession> {
        if let Some((username, password)) = &self.credentials {
            if username != &settings.username || password != &settings.password {
                return Err(CalDavError::Authentication(format!(
                    "Invalid credentials for user '{}'",
                    settings.username
                )));
            }
        }

        self.lock().connects += 1;
        Ok(MemorySession {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }
}

impl CalendarSession for MemorySession {
    async fn calendars(&self) -> CalDavResult<Vec<Collection>> {
        Ok(self.lock().calendars.clone())
    }

    async fn fetch(&self, collection: &Collection, id: &str) -> CalDavResult<NativeRecord> {
        let href = collection.resource_href(id)?;
        let state = self.lock();
        let (_, ics) = state
            .resources
            .iter()
            .find(|(h, _)| *h == href)
            .ok_or_else(|| CalDavError::NotFound(id.to_string()))?;
        NativeRecord::from_ics(Some(id.to_string()), Some(href.clone()), ics)
    }

    async fn fetch_all(&self, collection: &Collection) -> CalDavResult<Vec<NativeRecord>> {
        let state = self.lock();
        let records = state
            .resources
            .iter()
            .filter(|(href, _)| href.starts_with(&collection.href))
            .filter_map(|(href, ics)| {
                match NativeRecord::from_ics(Some(id_from_href(href)), Some(href.clone()), ics) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping unparseable resource {}: {}", href, e);
                        None
                    }
                }
            })
            .collect();
        Ok(records)
    }

    async fn query(
        &self,
        collection: &Collection,
        kind: RecordKind,
        range: &TimeRange,
    ) -> CalDavResult<Vec<NativeRecord>> {
        let records = self.fetch_all(collection).await?;
        Ok(records
            .into_iter()
            .filter(|record| record.find(kind).is_some_and(|c| in_range(c, range)))
            .collect())
    }

    async fn save(&self, collection: &Collection, record: &NativeRecord) -> CalDavResult<String> {
        let id = record
            .id
            .clone()
            .or_else(|| record.uid())
            .ok_or_else(|| CalDavError::InvalidParameters("Record has no identifier".into()))?;
        let ics = record.to_ics();
        let mut state = self.lock();

        match &record.href {
            None => {
                let href = collection.resource_href(&id)?;
                if state.position(&href).is_some() {
                    return Err(CalDavError::Store(format!("Resource {} already exists", href)));
                }
                state.resources.push((href, ics));
            }
            Some(href) => {
                let index = state
                    .position(href)
                    .ok_or_else(|| CalDavError::NotFound(id.clone()))?;
                state.resources[index].1 = ics;
            }
        }
        Ok(id)
    }

    async fn delete(&self, collection: &Collection, record: &NativeRecord) -> CalDavResult<()> {
        let href = match (&record.href, &record.id) {
            (Some(href), _) => href.clone(),
            (None, Some(id)) => collection.resource_href(id)?,
            (None, None) => {
                return Err(CalDavError::InvalidParameters("Record has no identifier".into()));
            }
        };

        let mut state = self.lock();
        let index = state
            .position(&href)
            .ok_or_else(|| CalDavError::NotFound(id_from_href(&href)))?;
        state.resources.remove(index);
        Ok(())
    }
}

/// Time-range match in the spirit of a CalDAV calendar-query. Components with
/// no time at all always match.
fn in_range(component: &NativeComponent, range: &TimeRange) -> bool {
    let time = |name: &str| component.property(name).and_then(|p| p.time_value());
    let start = time("DTSTART").or_else(|| time("DUE"));
    let end = time("DTEND").or_else(|| time("DUE"));

    match (start, end) {
        (Some(start), end) => range.overlaps(start.to_utc(), end.map(|e| e.to_utc())),
        (None, Some(end)) => range.overlaps(end.to_utc(), None),
        (None, None) => true,
    }
}
