//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed repositories using Diesel ORM
//! - **memory**: in-process stores used when no database is configured and
//!   by tests
//! - **i18n**: JSON message catalogues embedded at build time
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no business logic.

pub mod i18n;
pub mod memory;
pub mod persistence;
