//! Domain-level error types.
//!
//! These errors are transport agnostic. The exception filter classifies them
//! into HTTP statuses and translated envelope messages; nothing in this
//! module knows about Actix.
//!
//! Three shapes exist, mirroring how failures are raised across the backend:
//! - [`Error::RateLimited`]: request volume exceeded the configured window.
//! - [`Error::Http`]: a failure with an explicit status and a string or
//!   structured payload (validation, authorization, not found, ...).
//! - [`Error::Internal`]: an uncaught fault whose detail stays server-side.

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope message: either a single string or a list of strings.
///
/// # Examples
/// ```
/// use storefront::domain::Message;
///
/// let one = Message::from("notFound");
/// assert_eq!(one.as_single(), Some("notFound"));
/// let many = Message::from(vec!["a".to_owned(), "b".to_owned()]);
/// assert_eq!(serde_json::to_value(&many).unwrap(), serde_json::json!(["a", "b"]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// A single message or translation key.
    One(String),
    /// Several messages, typically one per failed validation rule.
    Many(Vec<String>),
}

impl Message {
    /// Return the message when it is a single string.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::One(message) => Some(message.as_str()),
            Self::Many(_) => None,
        }
    }

    /// Apply `f` to every contained string.
    #[must_use]
    pub fn map(self, mut f: impl FnMut(String) -> String) -> Self {
        match self {
            Self::One(message) => Self::One(f(message)),
            Self::Many(messages) => Self::Many(messages.into_iter().map(f).collect()),
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::One(value.to_owned())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for Message {
    fn from(value: Vec<String>) -> Self {
        Self::Many(value)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(message) => f.write_str(message),
            Self::Many(messages) => f.write_str(&messages.join("; ")),
        }
    }
}

/// Payload attached to an [`HttpFault`].
#[derive(Debug, Clone, PartialEq)]
pub enum FaultPayload {
    /// Bare string; treated as a translation key with literal fallback.
    Text(String),
    /// Structured body with an optional error name and field-level errors.
    Structured {
        /// Message or list of messages.
        message: Message,
        /// Short error name such as `Bad Request`.
        error: Option<String>,
        /// Field-level errors surfaced as the envelope `data`.
        errors: Option<Map<String, Value>>,
    },
}

impl FaultPayload {
    /// Field-level errors, if any.
    #[must_use]
    pub fn errors(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Text(_) => None,
            Self::Structured { errors, .. } => errors.as_ref(),
        }
    }
}

impl From<&str> for FaultPayload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FaultPayload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Failure carrying an explicit HTTP status and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpFault {
    status: u16,
    payload: FaultPayload,
}

impl HttpFault {
    /// HTTP status code in the `400..=599` range.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Payload supplied by the raiser.
    #[must_use]
    pub fn payload(&self) -> &FaultPayload {
        &self.payload
    }

    /// Payload rendered for logs.
    #[must_use]
    pub fn payload_text(&self) -> String {
        match &self.payload {
            FaultPayload::Text(text) => text.clone(),
            FaultPayload::Structured {
                message,
                error: Some(name),
                ..
            } => format!("{name}: {message}"),
            FaultPayload::Structured { message, .. } => message.to_string(),
        }
    }
}

/// Uncaught server-side fault.
///
/// The message, source chain and backtrace are logged by the exception
/// filter and never serialised into a response.
#[derive(Clone)]
pub struct InternalFault {
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    backtrace: Arc<Backtrace>,
}

impl InternalFault {
    fn new(message: String, source: Option<Arc<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            message,
            source,
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Server-side description of the fault.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Backtrace captured when the fault was raised.
    ///
    /// Empty unless `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` enables capture.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Rendered source chain, outermost first.
    #[must_use]
    pub fn source_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut next: Option<&(dyn std::error::Error + 'static)> = self
            .source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static));
        while let Some(error) = next {
            chain.push(error.to_string());
            next = error.source();
        }
        chain
    }
}

impl fmt::Debug for InternalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalFault")
            .field("message", &self.message)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Failure raised by handlers, middleware and services.
///
/// # Examples
/// ```
/// use storefront::domain::Error;
///
/// let err = Error::not_found("userNotFound");
/// assert_eq!(err.status(), 404);
/// assert_eq!(Error::internal("boom").status(), 500);
/// ```
#[derive(Debug, Clone)]
pub enum Error {
    /// Request volume exceeded the configured threshold.
    RateLimited {
        /// Time until the current window resets, when known.
        retry_after: Option<Duration>,
    },
    /// Failure with an explicit HTTP status.
    Http(HttpFault),
    /// Uncaught server fault.
    Internal(InternalFault),
}

impl Error {
    /// Build a failure with an explicit status and payload.
    ///
    /// Statuses outside `400..=599` do not describe a failure; they are
    /// promoted to an internal fault so the mistake is logged.
    pub fn http(status: u16, payload: impl Into<FaultPayload>) -> Self {
        if !(400..=599).contains(&status) {
            return Self::internal(format!("error raised with non-error status {status}"));
        }
        Self::Http(HttpFault {
            status,
            payload: payload.into(),
        })
    }

    /// Build a failure with a structured payload.
    pub fn structured(
        status: u16,
        message: impl Into<Message>,
        error: Option<String>,
        errors: Option<Map<String, Value>>,
    ) -> Self {
        Self::http(
            status,
            FaultPayload::Structured {
                message: message.into(),
                error,
                errors,
            },
        )
    }

    /// `400 Bad Request`.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::http(400, message.into())
    }

    /// `400 Bad Request` carrying field-level validation errors.
    ///
    /// # Examples
    /// ```
    /// use serde_json::{json, Map};
    /// use storefront::domain::Error;
    ///
    /// let mut errors = Map::new();
    /// errors.insert("username".to_owned(), json!("usernameRequired"));
    /// let err = Error::validation(errors);
    /// assert_eq!(err.status(), 400);
    /// ```
    pub fn validation(errors: Map<String, Value>) -> Self {
        Self::structured(
            400,
            "validationFailed",
            Some("Bad Request".to_owned()),
            Some(errors),
        )
    }

    /// `401 Unauthorized`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::http(401, message.into())
    }

    /// `403 Forbidden`.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::http(403, message.into())
    }

    /// `404 Not Found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(404, message.into())
    }

    /// `409 Conflict`.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::http(409, message.into())
    }

    /// `422 Unprocessable Entity`.
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::http(422, message.into())
    }

    /// `503 Service Unavailable`.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::http(503, message.into())
    }

    /// `429 Too Many Requests`.
    #[must_use]
    pub fn too_many_requests(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Uncaught fault described by `message`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(InternalFault::new(message.into(), None))
    }

    /// Uncaught fault wrapping `source`.
    pub fn from_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal(InternalFault::new(message.into(), Some(Arc::new(source))))
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::Http(fault) => fault.status,
            Self::Internal(_) => 500,
        }
    }

    /// Attach field-level errors, upgrading a text payload to a structured one.
    ///
    /// Has no effect on rate-limit or internal faults.
    #[must_use]
    pub fn with_errors(self, errors: Map<String, Value>) -> Self {
        match self {
            Self::Http(HttpFault { status, payload }) => {
                let payload = match payload {
                    FaultPayload::Text(message) => FaultPayload::Structured {
                        message: Message::One(message),
                        error: None,
                        errors: Some(errors),
                    },
                    FaultPayload::Structured { message, error, .. } => FaultPayload::Structured {
                        message,
                        error,
                        errors: Some(errors),
                    },
                };
                Self::Http(HttpFault { status, payload })
            }
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { .. } => f.write_str("rate limit exceeded"),
            Self::Http(fault) => match &fault.payload {
                FaultPayload::Text(message) => write!(f, "{} {message}", fault.status),
                FaultPayload::Structured { message, .. } => write!(f, "{} {message}", fault.status),
            },
            Self::Internal(fault) => f.write_str(&fault.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Internal(fault) => fault
                .source
                .as_deref()
                .map(|source| source as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}
