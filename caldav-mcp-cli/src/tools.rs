//! Alternative front end: one call per operation, each returning plain JSON.
//!
//! Failures never escape a call; they come back as `{"error": "..."}` (or a
//! one-element list of that for the listing calls).

use caldav_mcp_core::{
    CalDavError, CalDavResult, CalendarRecord, Connector, Event, Frequency, Gateway, RecordTime,
    RecurrenceRule, Todo, Translate,
};
use clap::Subcommand;
use serde_json::{Map, Value, json};

#[derive(Subcommand, Debug, Clone)]
pub enum ToolCommand {
    /// Connect to the CalDAV server
    Connect,
    /// Drop the current session and connect again
    Reconnect,
    /// List events, optionally limited to a date range
    GetEvents {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Create a single event
    CreateEvent {
        title: String,
        /// Start time (YYYY-MM-DDTHH:MM:SS)
        start_time: String,
        /// End time (YYYY-MM-DDTHH:MM:SS)
        end_time: String,
    },
    /// Create a repeating event
    CreateRecurringEvent {
        title: String,
        start_time: String,
        end_time: String,
        /// DAILY, WEEKLY, MONTHLY, YEARLY, ...
        #[arg(long, default_value = "DAILY")]
        frequency: String,
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// Number of occurrences (unbounded when omitted)
        #[arg(long)]
        count: Option<u32>,
    },
    /// List to-dos
    GetTodos,
    /// Create a to-do
    CreateTodo {
        title: String,
        #[arg(long)]
        due_date: Option<String>,
    },
    /// Delete an event by id
    DeleteEvent { id: String },
}

fn error_value(err: impl std::fmt::Display) -> Value {
    json!({"error": err.to_string()})
}

fn connect_error(err: &CalDavError) -> String {
    format!("Failed to connect to CalDAV server: {}", err)
}

/// Replace the named time fields with their display rendering.
fn display_times(mut map: Map<String, Value>, fields: &[&str]) -> Value {
    for field in fields {
        let display = match map.get(*field) {
            Some(Value::String(raw)) => RecordTime::parse(raw).ok().map(|t| t.display()),
            _ => None,
        };
        if let Some(display) = display {
            map.insert(field.to_string(), Value::String(display));
        }
    }
    Value::Object(map)
}

pub struct Tools<C: Connector> {
    gateway: Gateway<C>,
}

impl<C: Connector> Tools<C> {
    pub fn new(gateway: Gateway<C>) -> Self {
        Tools { gateway }
    }

    pub fn gateway(&self) -> &Gateway<C> {
        &self.gateway
    }

    pub async fn run(&mut self, command: ToolCommand) -> Value {
        match command {
            ToolCommand::Connect => self.connect().await,
            ToolCommand::Reconnect => self.reconnect().await,
            ToolCommand::GetEvents { start, end } => {
                self.get_events(start.as_deref(), end.as_deref()).await
            }
            ToolCommand::CreateEvent {
                title,
                start_time,
                end_time,
            } => self.create_event(&title, &start_time, &end_time).await,
            ToolCommand::CreateRecurringEvent {
                title,
                start_time,
                end_time,
                frequency,
                interval,
                count,
            } => {
                self.create_recurring_event(&title, &start_time, &end_time, &frequency, interval, count)
                    .await
            }
            ToolCommand::GetTodos => self.get_todos().await,
            ToolCommand::CreateTodo { title, due_date } => {
                self.create_todo(&title, due_date.as_deref()).await
            }
            ToolCommand::DeleteEvent { id } => self.delete_event(&id).await,
        }
    }

    pub async fn connect(&mut self) -> Value {
        let result = self.gateway.connect().await;
        connection_status(result, "connected", "Successfully connected to CalDAV server")
    }

    pub async fn reconnect(&mut self) -> Value {
        self.gateway.disconnect();
        let result = self.gateway.connect().await;
        connection_status(result, "reconnected", "Successfully reconnected to CalDAV server")
    }

    pub async fn get_events(&mut self, start: Option<&str>, end: Option<&str>) -> Value {
        if let Err(e) = self.gateway.ensure_connected().await {
            return json!([{"error": connect_error(&e)}]);
        }
        match self.gateway.list_events(start, end).await {
            Ok(events) => Value::Array(
                events
                    .iter()
                    .map(|e| display_times(e.to_map(), &["start_time", "end_time"]))
                    .collect(),
            ),
            Err(e) => json!([error_value(e)]),
        }
    }

    pub async fn get_todos(&mut self) -> Value {
        if let Err(e) = self.gateway.ensure_connected().await {
            return json!([{"error": connect_error(&e)}]);
        }
        match self.gateway.list_todos(None, None).await {
            Ok(todos) => Value::Array(
                todos
                    .iter()
                    .map(|t| display_times(t.to_map(), &["due_date", "completion_date"]))
                    .collect(),
            ),
            Err(e) => json!([error_value(e)]),
        }
    }

    pub async fn create_event(&mut self, title: &str, start_time: &str, end_time: &str) -> Value {
        let fields = json!({"title": title, "start_time": start_time, "end_time": end_time});
        self.create::<Event>(fields).await
    }

    pub async fn create_recurring_event(
        &mut self,
        title: &str,
        start_time: &str,
        end_time: &str,
        frequency: &str,
        interval: u32,
        count: Option<u32>,
    ) -> Value {
        let rrule = match frequency.parse::<Frequency>() {
            Ok(frequency) => RecurrenceRule::new(frequency, Some(interval), count),
            Err(e) => return error_value(e),
        };
        let fields = json!({
            "title": title,
            "start_time": start_time,
            "end_time": end_time,
            "rrule": rrule,
        });
        self.create::<Event>(fields).await
    }

    pub async fn create_todo(&mut self, title: &str, due_date: Option<&str>) -> Value {
        let fields = json!({"title": title, "due_date": due_date});
        self.create::<Todo>(fields).await
    }

    pub async fn delete_event(&mut self, id: &str) -> Value {
        if let Err(e) = self.gateway.ensure_connected().await {
            return error_value(connect_error(&e));
        }
        match self.gateway.delete_event(id).await {
            Ok(()) => json!({"id": id, "status": "deleted"}),
            Err(e) => error_value(e),
        }
    }

    async fn create<R: Translate>(&mut self, fields: Value) -> Value {
        if let Err(e) = self.gateway.ensure_connected().await {
            return error_value(connect_error(&e));
        }
        match self.try_create::<R>(fields).await {
            Ok(map) => Value::Object(map),
            Err(e) => error_value(e),
        }
    }

    async fn try_create<R: Translate>(&self, fields: Value) -> CalDavResult<Map<String, Value>> {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut record = R::from_map(fields)?;
        if !record.validate() {
            return Err(CalDavError::InvalidParameters(format!("Invalid {} data", R::KIND)));
        }
        let id = self.gateway.create(record.clone()).await?;
        record.set_id(id);
        Ok(record.to_map())
    }
}

fn connection_status(result: CalDavResult<()>, ok: &str, message: &str) -> Value {
    match result {
        Ok(()) => json!({"status": ok, "message": message}),
        Err(CalDavError::Authentication(reason)) => json!({
            "status": "failed",
            "message": format!("Failed to connect to CalDAV server: {}", reason),
        }),
        Err(e) => json!({"status": "error", "message": e.to_string()}),
    }
}
