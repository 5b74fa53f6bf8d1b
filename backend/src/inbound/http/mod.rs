//! HTTP inbound adapter exposing REST endpoints.

pub mod audit_logs;
pub mod auth;
pub mod error;
pub mod health;
pub mod routes;
pub mod session;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod users;
