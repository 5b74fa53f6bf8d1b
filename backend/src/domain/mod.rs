//! Domain primitives, services and ports.
//!
//! Purpose: hold the transport-agnostic core of the request pipeline. The
//! permission table and guard, envelope shapes, error classification,
//! transaction service and audit dispatch all live here; Actix adapters in
//! `middleware` and `inbound` only translate to and from these types.
//!
//! Public surface:
//! - `Error` and `Message`: failures raised anywhere in the backend.
//! - `Permission`, `PermissionSet`, `Role`, `PermissionTable`: RBAC data.
//! - `PermissionGuard`: the authorization predicate.
//! - `ApiResponse`, `ApiErrorResponse`: response envelopes.
//! - `TransactionService`, `TransactionScope`: units of work.
//! - `AuditSpec`, `AuditRecord`, `AuditDispatcher`, `AuditRetention`.

pub mod audit;
pub mod authorization;
pub mod envelope;
pub mod error;
pub mod i18n;
pub mod normalize;
pub mod permission;
pub mod ports;
mod principal;
mod request_id;
pub mod role;
pub mod transaction;
pub mod user;

pub use self::audit::{AuditDispatcher, AuditInput, AuditRecord, AuditRetention, AuditSpec};
pub use self::authorization::PermissionGuard;
pub use self::envelope::{ApiErrorResponse, ApiResponse};
pub use self::error::{Error, FaultPayload, HttpFault, InternalFault, Message};
pub use self::i18n::{I18nContext, LocaleHints, Localizer};
pub use self::permission::{Permission, PermissionSet, UnknownPermission};
pub use self::principal::Principal;
pub use self::request_id::RequestId;
pub use self::role::{PermissionTable, Role, UnknownRole};
pub use self::transaction::{TransactionScope, TransactionService};
pub use self::user::{
    LoginCredentials, LoginValidationError, User, UserId, UserValidationError,
};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use storefront::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;
