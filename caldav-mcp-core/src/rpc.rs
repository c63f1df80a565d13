//! JSON-RPC envelopes and error normalization.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::error::CalDavError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Fixed error code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "i64")]
pub enum ErrorCode {
    InvalidParameters,
    ResourceNotFound,
    AuthenticationFailed,
    InternalError,
    OperationNotSupported,
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::InvalidParameters => 1001,
            ErrorCode::ResourceNotFound => 1002,
            ErrorCode::AuthenticationFailed => 1003,
            ErrorCode::InternalError => 1004,
            ErrorCode::OperationNotSupported => 1005,
        }
    }

    /// Code for an error. Anything not explicitly classified is internal.
    pub fn classify(err: &CalDavError) -> Self {
        match err {
            CalDavError::InvalidParameters(_) => ErrorCode::InvalidParameters,
            CalDavError::NotFound(_) => ErrorCode::ResourceNotFound,
            CalDavError::Authentication(_) | CalDavError::NotConnected => {
                ErrorCode::AuthenticationFailed
            }
            CalDavError::Unsupported(_) => ErrorCode::OperationNotSupported,
            _ => ErrorCode::InternalError,
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> i64 {
        code.code()
    }
}

/// Body of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorInfo {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn into_response(self) -> Value {
        create_error_response(self.code, self.message, self.data)
    }
}

/// Normalize a failure raised while running `context` (the method name).
pub fn handle_exception(err: &CalDavError, context: &str) -> ErrorInfo {
    let code = ErrorCode::classify(err);
    error!("{} failed ({}): {}", context, code.code(), err);

    ErrorInfo {
        code,
        message: err.to_string(),
        data: Some(json!({
            "method": context,
            "exception_type": err.kind(),
        })),
    }
}

pub fn create_error_response(code: ErrorCode, message: impl Into<String>, data: Option<Value>) -> Value {
    let mut error = json!({
        "code": code.code(),
        "message": message.into(),
    });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "error": error,
    })
}

pub fn create_success_response(result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "result": result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let cases = [
            (CalDavError::InvalidParameters("x".into()), 1001),
            (CalDavError::NotFound("x".into()), 1002),
            (CalDavError::Authentication("x".into()), 1003),
            (CalDavError::NotConnected, 1003),
            (CalDavError::Unsupported("x".into()), 1005),
            (CalDavError::Store("boom".into()), 1004),
            (CalDavError::IcsParse("bad".into()), 1004),
            (CalDavError::Config("bad".into()), 1004),
        ];
        for (err, code) in cases {
            assert_eq!(ErrorCode::classify(&err).code(), code, "{err:?}");
        }
    }

    #[test]
    fn test_handle_exception_records_context() {
        let info = handle_exception(&CalDavError::Store("server exploded".into()), "caldav.event.list");
        assert_eq!(info.code, ErrorCode::InternalError);
        assert_eq!(info.message, "CalDAV store error: server exploded");
        assert_eq!(
            info.data,
            Some(json!({"method": "caldav.event.list", "exception_type": "Store"}))
        );
    }

    #[test]
    fn test_envelope_shapes() {
        assert_eq!(
            create_success_response(json!({"id": "a", "status": "created"})),
            json!({"jsonrpc": "2.0", "result": {"id": "a", "status": "created"}})
        );
        assert_eq!(
            create_error_response(ErrorCode::InvalidParameters, "Invalid JSON format", None),
            json!({"jsonrpc": "2.0", "error": {"code": 1001, "message": "Invalid JSON format"}})
        );

        let info = ErrorInfo::new(ErrorCode::OperationNotSupported, "nope");
        assert_eq!(serde_json::to_value(&info).unwrap(), json!({"code": 1005, "message": "nope"}));
    }
}
