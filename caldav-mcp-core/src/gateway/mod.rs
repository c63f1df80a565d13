//! Calendar Gateway: connection lifecycle and record CRUD against the store.
//!
//! Every operation returns a [`CalDavResult`]. While disconnected, operations
//! fail with [`CalDavError::NotConnected`]; front ends call
//! [`Gateway::ensure_connected`] first.

mod translate;

pub use translate::Translate;

use chrono_tz::Tz;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{CalDavError, CalDavResult};
use crate::native::NativeRecord;
use crate::record::{CalendarRecord, Event, Journal, Todo};
use crate::store::{CalendarSession, Collection, Connector};
use crate::time::TimeRange;

/// Which calendar collection of the principal to work in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CollectionSelector {
    #[default]
    First,
    /// Match by display name or href
    Named(String),
}

impl CollectionSelector {
    pub fn from_setting(calendar: Option<&str>) -> Self {
        match calendar.map(str::trim) {
            Some(name) if !name.is_empty() => CollectionSelector::Named(name.to_string()),
            _ => CollectionSelector::First,
        }
    }

    fn select(&self, calendars: Vec<Collection>) -> CalDavResult<Collection> {
        match self {
            CollectionSelector::First => calendars
                .into_iter()
                .next()
                .ok_or_else(|| CalDavError::NotFound("No calendars found for this account".into())),
            CollectionSelector::Named(name) => {
                let wanted = name.trim_end_matches('/');
                calendars
                    .into_iter()
                    .find(|c| c.name == *name || c.href.trim_end_matches('/') == wanted)
                    .ok_or_else(|| CalDavError::NotFound(format!("Calendar '{}'", name)))
            }
        }
    }
}

pub struct Gateway<C: Connector> {
    connector: C,
    settings: Settings,
    selector: CollectionSelector,
    session: Option<C::Session>,
}

impl<C: Connector> Gateway<C> {
    pub fn new(connector: C, settings: Settings) -> Self {
        let selector = CollectionSelector::from_setting(settings.calendar.as_deref());
        Gateway {
            connector,
            settings,
            selector,
            session: None,
        }
    }

    pub fn with_selector(mut self, selector: CollectionSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Open a new session, replacing any existing one.
    ///
    /// On failure the gateway is left disconnected.
    pub async fn connect(&mut self) -> CalDavResult<()> {
        self.session = None;
        match self.connector.connect(&self.settings).await {
            Ok(session) => {
                info!("Connected to CalDAV server at {}", self.settings.server_url);
                self.session = Some(session);
                Ok(())
            }
            Err(e @ CalDavError::Authentication(_)) => Err(e),
            Err(e) => Err(CalDavError::Authentication(e.to_string())),
        }
    }

    pub fn disconnect(&mut self) {
        if self.session.take().is_some() {
            info!("Disconnected from CalDAV server");
        }
    }

    /// Connect unless a session is already open.
    pub async fn ensure_connected(&mut self) -> CalDavResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect().await
    }

    fn session(&self) -> CalDavResult<&C::Session> {
        self.session.as_ref().ok_or(CalDavError::NotConnected)
    }

    fn tz(&self) -> CalDavResult<Tz> {
        self.settings.tz()
    }

    async fn collection(&self, session: &C::Session) -> CalDavResult<Collection> {
        let calendars = session.calendars().await?;
        self.selector.select(calendars)
    }

    /// Store a new record and return its identifier.
    pub async fn create<R: Translate>(&self, mut record: R) -> CalDavResult<String> {
        let session = self.session()?;
        let collection = self.collection(session).await?;
        resolve_times(&mut record, self.tz()?)?;

        let native = NativeRecord {
            id: Some(record.id().to_string()),
            href: None,
            components: vec![record.to_component()],
        };
        let id = session.save(&collection, &native).await?;
        info!("Created {} {} in {}", R::KIND, id, collection.href);
        Ok(id)
    }

    pub async fn read<R: Translate>(&self, id: &str) -> CalDavResult<R> {
        let session = self.session()?;
        let collection = self.collection(session).await?;
        let native = session.fetch(&collection, id).await?;

        let component = native
            .find(R::KIND)
            .ok_or_else(|| CalDavError::NotFound(format!("{} {}", R::KIND, id)))?;
        Ok(R::from_component(component, native.id.clone()))
    }

    /// Overwrite only the fields present in `fields`. `id` is ignored.
    pub async fn update<R: Translate>(&self, id: &str, fields: &Map<String, Value>) -> CalDavResult<()> {
        let names: Vec<&str> = fields
            .keys()
            .map(String::as_str)
            .filter(|key| *key != "id")
            .collect();
        if let Some(unknown) = names.iter().find(|key| !R::FIELDS.contains(*key)) {
            return Err(CalDavError::InvalidParameters(format!(
                "Unknown {} field '{}'",
                R::KIND,
                unknown
            )));
        }

        let session = self.session()?;
        let collection = self.collection(session).await?;
        let mut native = session.fetch(&collection, id).await?;
        let store_id = native.id.clone();

        let component = native
            .find_mut(R::KIND)
            .ok_or_else(|| CalDavError::NotFound(format!("{} {}", R::KIND, id)))?;
        let current = R::from_component(component, store_id);

        let mut merged = current.to_map();
        for name in &names {
            if let Some(value) = fields.get(*name) {
                merged.insert(name.to_string(), value.clone());
            }
        }
        let mut updated = R::from_map(merged)?;
        resolve_times(&mut updated, self.tz()?)?;
        updated.apply_fields(component, &names);

        session.save(&collection, &native).await?;
        info!("Updated {} {} ({})", R::KIND, id, names.join(", "));
        Ok(())
    }

    pub async fn delete<R: Translate>(&self, id: &str) -> CalDavResult<()> {
        let session = self.session()?;
        let collection = self.collection(session).await?;
        let native = session.fetch(&collection, id).await?;
        if native.find(R::KIND).is_none() {
            return Err(CalDavError::NotFound(format!("{} {}", R::KIND, id)));
        }

        session.delete(&collection, &native).await?;
        info!("Deleted {} {}", R::KIND, id);
        Ok(())
    }

    /// Records of one kind, optionally limited to a date range.
    ///
    /// The range applies only when both bounds are given.
    pub async fn list<R: Translate>(&self, start: Option<&str>, end: Option<&str>) -> CalDavResult<Vec<R>> {
        let session = self.session()?;
        let collection = self.collection(session).await?;
        let range = TimeRange::from_bounds(start, end, self.tz()?)?;

        let natives = match &range {
            Some(range) => session.query(&collection, R::KIND, range).await?,
            None => session.fetch_all(&collection).await?,
        };
        debug!("Fetched {} resources from {}", natives.len(), collection.href);

        Ok(natives
            .iter()
            .filter_map(|native| {
                native
                    .find(R::KIND)
                    .map(|component| R::from_component(component, native.id.clone()))
            })
            .collect())
    }

    pub async fn create_event(&self, event: Event) -> CalDavResult<String> {
        self.create(event).await
    }

    pub async fn read_event(&self, id: &str) -> CalDavResult<Event> {
        self.read(id).await
    }

    pub async fn update_event(&self, id: &str, fields: &Map<String, Value>) -> CalDavResult<()> {
        self.update::<Event>(id, fields).await
    }

    pub async fn delete_event(&self, id: &str) -> CalDavResult<()> {
        self.delete::<Event>(id).await
    }

    pub async fn list_events(&self, start: Option<&str>, end: Option<&str>) -> CalDavResult<Vec<Event>> {
        self.list(start, end).await
    }

    pub async fn create_todo(&self, todo: Todo) -> CalDavResult<String> {
        self.create(todo).await
    }

    pub async fn read_todo(&self, id: &str) -> CalDavResult<Todo> {
        self.read(id).await
    }

    pub async fn update_todo(&self, id: &str, fields: &Map<String, Value>) -> CalDavResult<()> {
        self.update::<Todo>(id, fields).await
    }

    pub async fn delete_todo(&self, id: &str) -> CalDavResult<()> {
        self.delete::<Todo>(id).await
    }

    pub async fn list_todos(&self, start: Option<&str>, end: Option<&str>) -> CalDavResult<Vec<Todo>> {
        self.list(start, end).await
    }

    pub async fn create_journal(&self, journal: Journal) -> CalDavResult<String> {
        self.create(journal).await
    }

    pub async fn read_journal(&self, id: &str) -> CalDavResult<Journal> {
        self.read(id).await
    }

    pub async fn update_journal(&self, id: &str, fields: &Map<String, Value>) -> CalDavResult<()> {
        self.update::<Journal>(id, fields).await
    }

    pub async fn delete_journal(&self, id: &str) -> CalDavResult<()> {
        self.delete::<Journal>(id).await
    }

    pub async fn list_journals(&self, start: Option<&str>, end: Option<&str>) -> CalDavResult<Vec<Journal>> {
        self.list(start, end).await
    }
}

/// Pin floating times to the configured zone.
fn resolve_times<R: CalendarRecord>(record: &mut R, tz: Tz) -> CalDavResult<()> {
    for slot in record.times_mut() {
        if let Some(time) = slot.take() {
            *slot = Some(time.resolve_in(tz)?);
        }
    }
    Ok(())
}
