//! Classification of failures into error envelopes.
//!
//! Every failure that reaches the exception filter is reduced to one
//! [`ApiErrorResponse`] whose `code` equals the HTTP status. Server-side
//! detail is logged here and never copied into the envelope.

use serde_json::{Map, Value};
use tracing::{error, warn};

use super::i18n::{I18nContext, translate};
use super::{ApiErrorResponse, Error, FaultPayload, Message, RequestId};

/// A failure as observed by the exception filter.
#[derive(Debug)]
pub enum Caught<'a> {
    /// Error raised by application code.
    Domain(&'a Error),
    /// Error raised by the web framework itself (extractors, routing).
    Framework {
        /// Status chosen by the framework.
        status: u16,
        /// Framework description of the failure.
        message: String,
    },
    /// A handler panicked; carries the rendered panic payload.
    Panic(String),
}

/// Request coordinates attached to failure logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorSite<'a> {
    /// Correlation identifier.
    pub request_id: Option<&'a RequestId>,
    /// HTTP method.
    pub method: &'a str,
    /// Request path.
    pub path: &'a str,
}

impl ErrorSite<'_> {
    fn request_id(&self) -> &str {
        self.request_id.map_or("-", RequestId::as_str)
    }
}

struct StatusDefault {
    reason: &'static str,
    key: &'static str,
    english: &'static str,
}

const fn entry(reason: &'static str, key: &'static str, english: &'static str) -> StatusDefault {
    StatusDefault {
        reason,
        key,
        english,
    }
}

/// Translation key for internal faults.
pub const INTERNAL_SERVER_ERROR: &str = "internalServerError";
/// Translation key for rate-limit rejections.
pub const TOO_MANY_REQUESTS: &str = "tooManyRequests";

const CLIENT_FALLBACK: StatusDefault = entry("", "requestFailed", "Request failed");
const SERVER_FALLBACK: StatusDefault = entry("", INTERNAL_SERVER_ERROR, "Internal server error");

fn status_default(status: u16) -> StatusDefault {
    match status {
        400 => entry("Bad Request", "badRequest", "Bad request"),
        401 => entry("Unauthorized", "unauthorized", "Unauthorized"),
        403 => entry("Forbidden", "forbidden", "Forbidden"),
        404 => entry("Not Found", "notFound", "Resource not found"),
        405 => entry("Method Not Allowed", "methodNotAllowed", "Method not allowed"),
        406 => entry("Not Acceptable", "notAcceptable", "Not acceptable"),
        408 => entry("Request Timeout", "requestTimeout", "Request timeout"),
        409 => entry("Conflict", "conflict", "Conflict"),
        413 => entry("Payload Too Large", "payloadTooLarge", "Payload too large"),
        415 => entry(
            "Unsupported Media Type",
            "unsupportedMediaType",
            "Unsupported media type",
        ),
        422 => entry(
            "Unprocessable Entity",
            "unprocessableEntity",
            "Unprocessable entity",
        ),
        429 => entry(
            "Too Many Requests",
            TOO_MANY_REQUESTS,
            "Too many requests, please try again later",
        ),
        500 => entry("Internal Server Error", INTERNAL_SERVER_ERROR, "Internal server error"),
        501 => entry("Not Implemented", "notImplemented", "Not implemented"),
        502 => entry("Bad Gateway", "badGateway", "Bad gateway"),
        503 => entry("Service Unavailable", "serviceUnavailable", "Service unavailable"),
        504 => entry("Gateway Timeout", "gatewayTimeout", "Gateway timeout"),
        500..=599 => SERVER_FALLBACK,
        _ => CLIENT_FALLBACK,
    }
}

/// Translated default message for `status`, falling back to English.
///
/// # Examples
/// ```
/// use storefront::domain::normalize::default_message;
///
/// assert_eq!(default_message(500, None), "Internal server error");
/// assert_eq!(default_message(429, None), "Too many requests, please try again later");
/// ```
#[must_use]
pub fn default_message(status: u16, i18n: Option<&I18nContext<'_>>) -> String {
    let defaults = status_default(status);
    translate(i18n, defaults.key).unwrap_or_else(|| defaults.english.to_owned())
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether `message` is a framework boilerplate phrase for `status`.
///
/// Matches the canonical reason phrase, optionally suffixed with
/// `Exception`, ignoring case, spacing and punctuation, as well as the bare
/// `Http Exception` name.
#[must_use]
pub fn is_boilerplate(status: u16, message: &str) -> bool {
    let squashed = squash(message);
    if squashed.is_empty() || squashed == "httpexception" {
        return true;
    }
    let reason = squash(status_default(status).reason);
    !reason.is_empty()
        && (squashed == reason || squashed.strip_suffix("exception") == Some(reason.as_str()))
}

fn localise(status: u16, text: &str, i18n: Option<&I18nContext<'_>>) -> String {
    if is_boilerplate(status, text) {
        return default_message(status, i18n);
    }
    translate(i18n, text).unwrap_or_else(|| text.to_owned())
}

fn localise_value(value: Value, i18n: Option<&I18nContext<'_>>) -> Value {
    match value {
        Value::String(key) => Value::String(translate(i18n, &key).unwrap_or(key)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| localise_value(item, i18n))
                .collect(),
        ),
        other => other,
    }
}

fn localise_errors(
    errors: &Map<String, Value>,
    i18n: Option<&I18nContext<'_>>,
) -> Map<String, Value> {
    errors
        .iter()
        .map(|(field, value)| (field.clone(), localise_value(value.clone(), i18n)))
        .collect()
}

fn envelope(status: u16, message: Message, data: Option<Map<String, Value>>) -> ApiErrorResponse {
    ApiErrorResponse {
        code: status,
        message,
        data,
    }
}

fn internal(i18n: Option<&I18nContext<'_>>) -> ApiErrorResponse {
    envelope(500, Message::One(default_message(500, i18n)), None)
}

fn log_client(status: u16, site: &ErrorSite<'_>, detail: &str) {
    warn!(
        request_id = site.request_id(),
        method = site.method,
        path = site.path,
        status,
        detail,
        "request failed"
    );
}

/// Envelope for a domain error, without logging it.
///
/// Internal faults always yield the generic message.
#[must_use]
pub fn envelope_of(err: &Error, i18n: Option<&I18nContext<'_>>) -> ApiErrorResponse {
    match err {
        Error::RateLimited { .. } => envelope(429, Message::One(default_message(429, i18n)), None),
        Error::Http(fault) => {
            let status = fault.status();
            match fault.payload() {
                FaultPayload::Text(text) => {
                    envelope(status, Message::One(localise(status, text, i18n)), None)
                }
                FaultPayload::Structured {
                    message, errors, ..
                } => envelope(
                    status,
                    message.clone().map(|text| localise(status, &text, i18n)),
                    errors.as_ref().map(|errors| localise_errors(errors, i18n)),
                ),
            }
        }
        Error::Internal(_) => internal(i18n),
    }
}

/// Reduce `caught` to the envelope sent to the client.
///
/// Statuses `>= 500` are logged at `error`, `4xx` at `warn`.
///
/// # Examples
/// ```
/// use storefront::domain::normalize::{normalize, Caught, ErrorSite};
/// use storefront::domain::Error;
///
/// let err = Error::internal("boom");
/// let body = normalize(Caught::Domain(&err), None, &ErrorSite::default());
/// assert_eq!(body.code, 500);
/// assert_eq!(body.message.as_single(), Some("Internal server error"));
/// assert!(body.data.is_none());
/// ```
#[must_use]
pub fn normalize(
    caught: Caught<'_>,
    i18n: Option<&I18nContext<'_>>,
    site: &ErrorSite<'_>,
) -> ApiErrorResponse {
    match caught {
        Caught::Domain(Error::RateLimited { retry_after }) => {
            warn!(
                request_id = site.request_id(),
                method = site.method,
                path = site.path,
                status = 429_u16,
                retry_after_secs = retry_after.map(|d| d.as_secs()),
                "rate limit exceeded"
            );
            envelope(429, Message::One(default_message(429, i18n)), None)
        }
        Caught::Domain(err @ Error::Http(fault)) => {
            let status = fault.status();
            let body = envelope_of(err, i18n);
            if status >= 500 {
                error!(
                    request_id = site.request_id(),
                    method = site.method,
                    path = site.path,
                    status,
                    detail = %fault.payload_text(),
                    "request failed"
                );
            } else {
                log_client(status, site, &fault.payload_text());
            }
            body
        }
        Caught::Domain(Error::Internal(fault)) => {
            error!(
                request_id = site.request_id(),
                method = site.method,
                path = site.path,
                status = 500_u16,
                message = fault.message(),
                source_chain = ?fault.source_chain(),
                backtrace = %fault.backtrace(),
                "unhandled server fault"
            );
            internal(i18n)
        }
        Caught::Framework { status, message } if status >= 500 => {
            error!(
                request_id = site.request_id(),
                method = site.method,
                path = site.path,
                status,
                message = %message,
                "framework server fault"
            );
            internal(i18n)
        }
        Caught::Framework { status, message } => {
            log_client(status, site, &message);
            envelope(status, Message::One(localise(status, &message, i18n)), None)
        }
        Caught::Panic(payload) => {
            error!(
                request_id = site.request_id(),
                method = site.method,
                path = site.path,
                status = 500_u16,
                payload = %payload,
                "handler panicked"
            );
            internal(i18n)
        }
    }
}

/// Render a panic payload for logging.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("<non-string panic payload>"))
}
