//! Request Dispatcher: routes `caldav.<kind>.<op>` requests to the gateway.

use caldav_mcp_core::rpc::{
    ErrorCode, ErrorInfo, JSONRPC_VERSION, create_error_response, create_success_response,
    handle_exception,
};
use caldav_mcp_core::{
    CalDavError, CalDavResult, CalendarRecord, Connector, Event, Gateway, Journal, RecordKind,
    Todo, Translate,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Operation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Operation::Create),
            "read" => Some(Operation::Read),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            "list" => Some(Operation::List),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

/// Update params: `{id, data: {...}}`, or `{id, ...fields}` inline.
#[derive(Deserialize)]
struct UpdateParams {
    id: String,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(flatten)]
    inline: Map<String, Value>,
}

#[derive(Deserialize, Default)]
struct ListParams {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

/// Split a method name into record kind and operation.
fn route(method: &str) -> Result<(RecordKind, Operation), ErrorInfo> {
    let unsupported =
        || ErrorInfo::new(ErrorCode::OperationNotSupported, format!("Unsupported method: {}", method));

    let rest = method.strip_prefix("caldav.").ok_or_else(unsupported)?;
    let (kind, op) = rest.split_once('.').unwrap_or((rest, ""));
    let kind: RecordKind = kind.parse().map_err(|_| unsupported())?;

    let op = Operation::parse(op).ok_or_else(|| {
        ErrorInfo::new(
            ErrorCode::OperationNotSupported,
            format!("Unsupported {} method: {}", kind, method),
        )
    })?;
    Ok((kind, op))
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> CalDavResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| CalDavError::InvalidParameters(format!("Invalid params: {}", e)))
}

fn params_object(params: &Value) -> CalDavResult<Map<String, Value>> {
    match params {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(CalDavError::InvalidParameters("params must be an object".into())),
    }
}

fn invalid_format() -> Value {
    create_error_response(ErrorCode::InvalidParameters, "Invalid JSON format", None)
}

pub struct Dispatcher<C: Connector> {
    gateway: Gateway<C>,
}

impl<C: Connector> Dispatcher<C> {
    pub fn new(gateway: Gateway<C>) -> Self {
        Dispatcher { gateway }
    }

    pub fn gateway(&self) -> &Gateway<C> {
        &self.gateway
    }

    /// Initial connection attempt. Failure is logged; requests retry on their own.
    pub async fn connect(&mut self) {
        if let Err(e) = self.gateway.connect().await {
            warn!("Initial connection failed: {}", e);
        }
    }

    pub fn shutdown(&mut self) {
        self.gateway.disconnect();
    }

    /// Handle one raw input line as read off the wire.
    pub async fn handle_bytes(&mut self, line: &[u8]) -> Option<Value> {
        match std::str::from_utf8(line) {
            Ok(line) => self.handle_line(line).await,
            Err(e) => {
                warn!("Input is not UTF-8: {}", e);
                Some(invalid_format())
            }
        }
    }

    /// Handle one input line. Blank lines produce no response.
    pub async fn handle_line(&mut self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(request) => Some(self.handle_request(&request).await),
            Err(e) => {
                warn!("Invalid JSON: {}", e);
                Some(invalid_format())
            }
        }
    }

    pub async fn handle_request(&mut self, request: &Value) -> Value {
        if request.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return create_error_response(
                ErrorCode::InvalidParameters,
                "Invalid JSON-RPC version",
                None,
            );
        }
        let Some(method) = request.get("method").and_then(Value::as_str) else {
            return create_error_response(ErrorCode::InvalidParameters, "Missing method", None);
        };
        let params = match request.get("params") {
            None | Some(Value::Null) => json!({}),
            Some(params) => params.clone(),
        };

        let (kind, op) = match route(method) {
            Ok(route) => route,
            Err(info) => return info.into_response(),
        };
        debug!("Dispatching {} ({} {:?})", method, kind, op);

        if let Err(e) = self.gateway.ensure_connected().await {
            return handle_exception(&e, method).into_response();
        }

        let result = match kind {
            RecordKind::Event => self.run::<Event>(op, &params).await,
            RecordKind::Todo => self.run::<Todo>(op, &params).await,
            RecordKind::Journal => self.run::<Journal>(op, &params).await,
        };

        match result {
            Ok(value) => create_success_response(value),
            Err(e) => handle_exception(&e, method).into_response(),
        }
    }

    async fn run<R: Translate>(&self, op: Operation, params: &Value) -> CalDavResult<Value> {
        match op {
            Operation::Create => {
                let record = R::from_map(params_object(params)?)?;
                if !record.validate() {
                    return Err(CalDavError::InvalidParameters(format!(
                        "Invalid {} data: a title and a priority between 1 and 9 are required",
                        R::KIND
                    )));
                }
                let id = self.gateway.create(record).await?;
                Ok(json!({"id": id, "status": "created"}))
            }
            Operation::Read => {
                let IdParams { id } = parse_params(params)?;
                let record: R = self.gateway.read(&id).await?;
                Ok(Value::Object(record.to_map()))
            }
            Operation::Update => {
                let UpdateParams { id, data, inline } = parse_params(params)?;
                let fields = data.unwrap_or(inline);
                self.gateway.update::<R>(&id, &fields).await?;
                Ok(json!({"id": id, "status": "updated"}))
            }
            Operation::Delete => {
                let IdParams { id } = parse_params(params)?;
                self.gateway.delete::<R>(&id).await?;
                Ok(json!({"id": id, "status": "deleted"}))
            }
            Operation::List => {
                let ListParams { start, end } = parse_params(params)?;
                let records: Vec<R> = self.gateway.list(start.as_deref(), end.as_deref()).await?;
                let items: Vec<Value> = records.iter().map(|r| Value::Object(r.to_map())).collect();
                let count = items.len();

                let mut result = Map::new();
                result.insert(R::KIND.plural().to_string(), Value::Array(items));
                result.insert("count".to_string(), json!(count));
                Ok(Value::Object(result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caldav_mcp_core::{MemoryConnector, Settings};

    fn dispatcher(connector: MemoryConnector) -> Dispatcher<MemoryConnector> {
        Dispatcher::new(Gateway::new(connector, Settings::default()))
    }

    async fn send(dispatcher: &mut Dispatcher<MemoryConnector>, request: Value) -> Value {
        dispatcher
            .handle_line(&request.to_string())
            .await
            .expect("Request line should get a response")
    }

    fn error_code(response: &Value) -> i64 {
        response["error"]["code"].as_i64().expect("Response should be an error")
    }

    #[test]
    fn test_route() {
        assert_eq!(
            route("caldav.journal.list").unwrap(),
            (RecordKind::Journal, Operation::List)
        );

        let info = route("calendar.list").unwrap_err();
        assert_eq!(info.code, ErrorCode::OperationNotSupported);
        assert_eq!(info.message, "Unsupported method: calendar.list");

        let info = route("caldav.note.read").unwrap_err();
        assert_eq!(info.message, "Unsupported method: caldav.note.read");

        let info = route("caldav.todo.archive").unwrap_err();
        assert_eq!(info.message, "Unsupported todo method: caldav.todo.archive");

        let info = route("caldav.event").unwrap_err();
        assert_eq!(info.message, "Unsupported event method: caldav.event");
    }

    #[tokio::test]
    async fn test_create_event_scenario() {
        let connector = MemoryConnector::new();
        let mut dispatcher = dispatcher(connector.clone());

        let response = send(
            &mut dispatcher,
            json!({
                "jsonrpc": "2.0",
                "method": "caldav.event.create",
                "params": {
                    "title": "Standup",
                    "start_time": "2025-01-01T09:00:00",
                    "end_time": "2025-01-01T09:15:00"
                },
                "id": 1
            }),
        )
        .await;

        assert_eq!(response["jsonrpc"], "2.0");
        assert!(response.get("error").is_none(), "got {response}");
        assert_eq!(response["result"]["status"], "created");
        let id = response["result"]["id"].as_str().expect("Should return an id");
        assert!(!id.is_empty());

        let ics = connector.resource(id).expect("Event should be stored");
        assert!(ics.contains("SUMMARY:Standup"), "stored: {ics}");
        assert!(ics.contains("DTSTART:20250101T140000Z"), "stored: {ics}");
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let mut dispatcher = dispatcher(MemoryConnector::new());

        let response = dispatcher.handle_line("{not json").await.unwrap();
        assert_eq!(error_code(&response), 1001);
        assert_eq!(response["error"]["message"], "Invalid JSON format");

        let response = send(&mut dispatcher, json!({"jsonrpc": "1.0", "method": "caldav.event.list"})).await;
        assert_eq!(response["error"]["message"], "Invalid JSON-RPC version");

        let response = send(&mut dispatcher, json!({"jsonrpc": "2.0", "params": {}})).await;
        assert_eq!(response["error"]["message"], "Missing method");
        assert_eq!(error_code(&response), 1001);

        assert!(dispatcher.handle_line("   ").await.is_none(), "blank lines are skipped");

        let response = dispatcher.handle_bytes(b"{\"method\": \"\xff\"}").await.unwrap();
        assert_eq!(response["error"]["message"], "Invalid JSON format", "invalid UTF-8 is malformed input");
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_supported() {
        let mut dispatcher = dispatcher(MemoryConnector::new());
        let response = send(&mut dispatcher, json!({"jsonrpc": "2.0", "method": "caldav.event.archive"})).await;
        assert_eq!(error_code(&response), 1005);
    }

    #[tokio::test]
    async fn test_read_missing_todo_is_not_found() {
        let mut dispatcher = dispatcher(MemoryConnector::new());
        let response = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.todo.read", "params": {"id": "nope"}}),
        )
        .await;

        assert_eq!(error_code(&response), 1002);
        assert_eq!(response["error"]["data"]["method"], "caldav.todo.read");
        assert_eq!(response["error"]["data"]["exception_type"], "NotFound");
    }

    #[tokio::test]
    async fn test_invalid_record_is_rejected() {
        let mut dispatcher = dispatcher(MemoryConnector::new());

        let response = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.todo.create", "params": {"title": "x", "percent_complete": 150}}),
        )
        .await;
        assert_eq!(error_code(&response), 1001);

        let response = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.journal.create", "params": {"title": ""}}),
        )
        .await;
        assert_eq!(error_code(&response), 1001);
    }

    #[tokio::test]
    async fn test_ids_cannot_leave_the_collection() {
        let connector = MemoryConnector::new();
        let mut dispatcher = dispatcher(connector.clone());

        let response = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.event.create",
                   "params": {"id": "../other/x", "title": "Escape"}}),
        )
        .await;
        assert_eq!(error_code(&response), 1001, "got {response}");
        assert!(connector.is_empty(), "nothing may be written");

        let response = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.todo.delete", "params": {"id": "a/../../b"}}),
        )
        .await;
        assert_eq!(error_code(&response), 1001);
        assert_eq!(response["error"]["data"]["exception_type"], "InvalidParameters");
    }

    #[tokio::test]
    async fn test_update_read_delete_cycle() {
        let mut dispatcher = dispatcher(MemoryConnector::new());

        let created = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.todo.create", "params": {"title": "Taxes", "priority": 2}}),
        )
        .await;
        let id = created["result"]["id"].as_str().unwrap().to_string();

        let updated = send(
            &mut dispatcher,
            json!({
                "jsonrpc": "2.0",
                "method": "caldav.todo.update",
                "params": {"id": id, "data": {"status": "COMPLETED", "percent_complete": 100}}
            }),
        )
        .await;
        assert_eq!(updated["result"], json!({"id": id, "status": "updated"}));

        let read = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.todo.read", "params": {"id": id}}),
        )
        .await;
        assert_eq!(read["result"]["title"], "Taxes", "untouched field survives");
        assert_eq!(read["result"]["priority"], 2, "untouched field survives");
        assert_eq!(read["result"]["status"], "COMPLETED");
        assert_eq!(read["result"]["percent_complete"], 100);

        let deleted = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.todo.delete", "params": {"id": id}}),
        )
        .await;
        assert_eq!(deleted["result"], json!({"id": id, "status": "deleted"}));

        let listed = send(&mut dispatcher, json!({"jsonrpc": "2.0", "method": "caldav.todo.list"})).await;
        assert_eq!(listed["result"], json!({"todos": [], "count": 0}));
    }

    #[tokio::test]
    async fn test_inline_update_fields() {
        let mut dispatcher = dispatcher(MemoryConnector::new());
        let created = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.journal.create", "params": {"title": "Day 1", "content": "Rain"}}),
        )
        .await;
        let id = created["result"]["id"].as_str().unwrap().to_string();

        send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.journal.update", "params": {"id": id, "title": "Day one"}}),
        )
        .await;

        let read = send(
            &mut dispatcher,
            json!({"jsonrpc": "2.0", "method": "caldav.journal.read", "params": {"id": id}}),
        )
        .await;
        assert_eq!(read["result"]["title"], "Day one");
        assert_eq!(read["result"]["content"], "Rain");
    }

    #[tokio::test]
    async fn test_list_with_range() {
        let mut dispatcher = dispatcher(MemoryConnector::new());
        for (title, start) in [("Early", "2025-03-01T10:00:00Z"), ("Late", "2025-06-01T10:00:00Z")] {
            send(
                &mut dispatcher,
                json!({"jsonrpc": "2.0", "method": "caldav.event.create", "params": {"title": title, "start_time": start}}),
            )
            .await;
        }

        let response = send(
            &mut dispatcher,
            json!({
                "jsonrpc": "2.0",
                "method": "caldav.event.list",
                "params": {"start": "2025-02-01", "end": "2025-04-01"}
            }),
        )
        .await;
        assert_eq!(response["result"]["count"], 1);
        assert_eq!(response["result"]["events"][0]["title"], "Early");
    }

    #[tokio::test]
    async fn test_auto_connect_failure_is_authentication_error() {
        let connector = MemoryConnector::new().with_credentials("alice", "secret");
        let mut dispatcher = dispatcher(connector);
        dispatcher.connect().await;
        assert!(!dispatcher.gateway().is_connected());

        let response = send(&mut dispatcher, json!({"jsonrpc": "2.0", "method": "caldav.event.list"})).await;
        assert_eq!(error_code(&response), 1003);
    }
}
