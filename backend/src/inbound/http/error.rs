//! HTTP adapter mapping for domain errors.
//!
//! Purpose: let handlers and middleware return [`Error`] directly. The
//! rendering here is the untranslated envelope; the exception filter
//! replaces it with the localized one and owns the logging.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};

use crate::domain::Error;
use crate::domain::normalize::envelope_of;
use crate::middleware::envelope_response;

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let retry_after = match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        };
        envelope_response(&envelope_of(self, None), retry_after)
    }
}
