//! Core library for caldav-mcp.
//!
//! - `record`: events, to-dos and journal entries
//! - `native` and `store`: the remote store's iCalendar resources and how to reach them
//! - `gateway`: connection lifecycle and CRUD translation
//! - `rpc`: JSON-RPC envelopes and error normalization

pub mod config;
pub mod error;
pub mod gateway;
pub mod native;
pub mod record;
pub mod rpc;
pub mod store;
pub mod time;

pub use config::{ConfigResolver, DEFAULT_CONFIG_PATH, Settings};
pub use error::{CalDavError, CalDavResult};
pub use gateway::{CollectionSelector, Gateway, Translate};
pub use record::{
    Attendee, CalendarRecord, Event, EventStatus, Frequency, Journal, Record, RecordKind,
    RecurrenceRule, Todo, TodoStatus,
};
pub use store::{CalDavConnector, CalendarSession, Collection, Connector, MemoryConnector};
pub use time::{RecordTime, TimeRange};
