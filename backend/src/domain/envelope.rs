//! Response envelopes.
//!
//! Every response body leaves the service wrapped in one of two shapes:
//! - success: `{"code":200,"message":"success","data":<any>,"timestamp":<ms>}`
//! - failure: `{"code":<status>,"message":<string|string[]>,"data":<object|null>}`

use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Message;

/// Message carried by every success envelope.
pub const SUCCESS_MESSAGE: &str = "success";

/// Success envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Always `200` for wrapped results.
    pub code: u16,
    /// Always [`SUCCESS_MESSAGE`] for wrapped results.
    pub message: Message,
    /// Handler output.
    pub data: Option<T>,
    /// Epoch milliseconds at wrap time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` with the current time from `clock`.
    pub fn success(data: Option<T>, clock: &dyn Clock) -> Self {
        Self {
            code: 200,
            message: Message::from(SUCCESS_MESSAGE),
            data,
            timestamp: Some(clock.utc().timestamp_millis()),
        }
    }
}

/// Failure envelope. `code` always equals the HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// HTTP status code.
    pub code: u16,
    /// Translated message or list of messages.
    pub message: Message,
    /// Field-level detail, or `null`.
    pub data: Option<Map<String, Value>>,
}

/// Whether `value` already has the envelope shape.
///
/// Heuristic: an object with a numeric `code`, a string `message` and a `data`
/// key (which may be `null`). A handler result that happens to match is
/// passed through unchanged.
#[must_use]
pub fn is_envelope(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    map.get("code").is_some_and(Value::is_number)
        && map.get("message").is_some_and(Value::is_string)
        && map.contains_key("data")
}

/// Wrap a handler result into a success envelope unless it already is one.
///
/// # Examples
/// ```
/// use mockable::DefaultClock;
/// use serde_json::json;
/// use storefront::domain::envelope::wrap;
///
/// let wrapped = wrap(json!({"id": 7}), &DefaultClock);
/// assert_eq!(wrapped["code"], 200);
/// assert_eq!(wrapped["data"], json!({"id": 7}));
///
/// let already = json!({"code": 201, "message": "created", "data": null});
/// assert_eq!(wrap(already.clone(), &DefaultClock), already);
/// ```
#[must_use]
pub fn wrap(data: Value, clock: &dyn Clock) -> Value {
    if is_envelope(&data) {
        return data;
    }
    let data = (!data.is_null()).then_some(data);
    serde_json::to_value(ApiResponse::success(data, clock)).unwrap_or(Value::Null)
}
