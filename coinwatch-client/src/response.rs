//! The `{success, data, error}` envelope returned by the gateway.

use serde_json::Value;

use crate::error::{ApiError, ApiResult, Failure};

/// Outcome of one gateway call.
///
/// Every gateway call resolves to an envelope, never a panic or an `Err`.
/// On failure `data` carries the parsed error body when there was one.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub failure: Option<Failure>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            failure: None,
        }
    }

    pub fn fail(failure: Failure, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
            failure: Some(failure),
        }
    }

    /// A non-2xx answer with its (possibly absent) body.
    pub fn rejected(failure: Failure, data: Option<Value>, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data,
            error: Some(message.into()),
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Server-provided message from the error body, if any.
    pub fn server_message(&self) -> Option<String> {
        self.data.as_ref().and_then(error_message)
    }

    /// Converts the envelope into a `Result`. A successful call without a
    /// body yields `Value::Null`.
    pub fn into_result(self) -> ApiResult<Value> {
        if self.success {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        let failure = self.failure.unwrap_or(Failure::Transport);
        let message = self
            .error
            .unwrap_or_else(|| crate::error::NETWORK_FAILURE.to_owned());
        Err(ApiError::new(failure, message))
    }
}

/// Extracts a human-readable message from an error body.
///
/// Looks at `detail`, then `error`, then `message`. String values are used
/// directly; for lists the first string entry is used.
pub fn error_message(body: &Value) -> Option<String> {
    ["detail", "error", "message"]
        .iter()
        .filter_map(|field| body.get(field))
        .find_map(message_text)
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => items.iter().find_map(message_text),
        _ => None,
    }
}
