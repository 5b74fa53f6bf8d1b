//! Login and logout handlers.
//!
//! ```text
//! POST /api/v1/login {"username":"admin","password":"password"}
//! POST /api/v1/logout
//! ```

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::domain::{ApiResult, Error, LoginCredentials, LoginValidationError, UserId};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// Login request body for `POST /api/v1/login`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl TryFrom<LoginRequest> for LoginCredentials {
    type Error = LoginValidationError;

    fn try_from(value: LoginRequest) -> Result<Self, Self::Error> {
        Self::try_from_parts(&value.username, &value.password)
    }
}

/// Identity established by a successful login.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: UserId,
    pub role: Option<String>,
}

fn map_login_validation_error(err: LoginValidationError) -> Error {
    let (field, key) = match err {
        LoginValidationError::EmptyUsername => ("username", "usernameRequired"),
        LoginValidationError::EmptyPassword => ("password", "passwordRequired"),
    };
    let mut errors = Map::new();
    errors.insert(field.to_owned(), Value::from(key));
    Error::validation(errors)
}

/// Authenticate credentials and establish a session.
pub async fn login(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<LoginRequest>,
) -> ApiResult<web::Json<LoginResponse>> {
    let credentials =
        LoginCredentials::try_from(payload.into_inner()).map_err(map_login_validation_error)?;
    let principal = state.login.authenticate(&credentials).await?;
    session.persist_principal(&principal)?;
    info!(user_id = %principal.id(), "login succeeded");
    Ok(web::Json(LoginResponse {
        user_id: principal.id().clone(),
        role: principal.role().map(str::to_owned),
    }))
}

/// Forget the session principal.
pub async fn logout(session: SessionContext) -> HttpResponse {
    session.clear();
    HttpResponse::Ok().finish()
}
