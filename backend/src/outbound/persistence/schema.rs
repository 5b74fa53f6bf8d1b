//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the database migrations exactly. They are used
//! by Diesel for compile-time query validation and type-safe SQL generation.
//!
//! # Maintenance
//!
//! When migrations change the schema, this file should be regenerated or
//! manually updated to reflect those changes. The `diesel print-schema`
//! command can generate these definitions from a live database.

diesel::table! {
    /// User accounts table.
    ///
    /// The `id` column is the primary key (UUID v4).
    users (id) {
        /// Primary key: UUID v4 identifier.
        id -> Uuid,
        /// Human-readable display name (max 64 characters).
        display_name -> Varchar,
        /// Role name resolved against the permission table.
        role -> Varchar,
        /// Record creation timestamp.
        created_at -> Timestamptz,
        /// Last modification timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only audit trail.
    audit_logs (id) {
        /// Surrogate key.
        id -> Int8,
        /// Acting user, null for anonymous calls.
        user_id -> Nullable<Varchar>,
        action -> Varchar,
        entity_type -> Varchar,
        /// Affected entity, or `unknown`.
        entity_id -> Varchar,
        old_value -> Nullable<Jsonb>,
        new_value -> Nullable<Jsonb>,
        ip_address -> Nullable<Varchar>,
        user_agent -> Nullable<Varchar>,
        request_id -> Nullable<Varchar>,
        /// Indexed for retention purges.
        created_at -> Timestamptz,
    }
}
