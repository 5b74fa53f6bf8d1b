//! Request middleware.
//!
//! Purpose: implement the request pipeline around handlers. App-wide layers,
//! outermost first: [`RequestIdentity`], [`ExceptionFilter`], [`Throttle`],
//! [`ResponseEnvelope`], the cookie session and [`Authenticate`]. Per
//! resource: [`RoutePolicy`] and, where needed, [`Transactional`].

pub mod authentication;
pub mod envelope;
pub mod exception_filter;
pub mod request_id;
pub mod route_policy;
pub mod throttle;
pub mod transactional;

pub use authentication::Authenticate;
pub use envelope::{ResponseEnvelope, SkipTransform};
pub use exception_filter::{
    ExceptionFilter, LANG_HEADER, RequestFacts, envelope_response, render,
};
pub use request_id::{REQUEST_ID_HEADER, RequestIdentity};
pub use route_policy::{AuditTrail, RoutePolicy};
pub use throttle::{FixedWindowLimiter, Throttle};
pub use transactional::{Transactional, Tx};
