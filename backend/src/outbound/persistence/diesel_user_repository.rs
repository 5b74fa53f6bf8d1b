//! PostgreSQL-backed `UserRepository` adapter.
//!
//! Writes run through [`TransactionService::run`]; reads use a plain pooled
//! connection.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;

use crate::domain::ports::{UserPersistenceError, UserRepository};
use crate::domain::{TransactionService, User, UserId};

use super::connection::PgConnectionSource;
use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{NewUserRow, UserRow};
use super::pool::PoolError;
use super::schema::users;

/// Diesel-backed implementation of the user repository port.
#[derive(Clone)]
pub struct DieselUserRepository {
    transactions: TransactionService<PgConnectionSource>,
}

impl DieselUserRepository {
    /// Create a new repository writing through `transactions`.
    pub fn new(transactions: TransactionService<PgConnectionSource>) -> Self {
        Self { transactions }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> UserPersistenceError {
    map_basic_diesel_error(
        error,
        |message| UserPersistenceError::query(message),
        |message| UserPersistenceError::connection(message),
    )
}

fn map_pool_error(error: PoolError) -> UserPersistenceError {
    map_basic_pool_error(error, UserPersistenceError::connection)
}

fn into_user(row: UserRow) -> Result<User, UserPersistenceError> {
    User::try_from(row).map_err(|err| UserPersistenceError::query(format!("invalid user row: {err}")))
}

#[async_trait]
impl UserRepository for DieselUserRepository {
    async fn upsert(&self, user: &User) -> Result<(), UserPersistenceError> {
        let user = user.clone();
        self.transactions
            .run(|conn| {
                async move {
                    let row = NewUserRow::from(&user);
                    diesel::insert_into(users::table)
                        .values(&row)
                        .on_conflict(users::id)
                        .do_update()
                        .set((&row, users::updated_at.eq(diesel::dsl::now)))
                        .execute(conn.pg())
                        .await
                        .map_err(map_diesel_error)?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self
            .transactions
            .source()
            .pool()
            .get()
            .await
            .map_err(map_pool_error)?;
        let row = users::table
            .find(*id.as_uuid())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(into_user).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, UserPersistenceError> {
        let mut conn = self
            .transactions
            .source()
            .pool()
            .get()
            .await
            .map_err(map_pool_error)?;
        let rows: Vec<UserRow> = users::table
            .select(UserRow::as_select())
            .order(users::display_name.asc())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(into_user).collect()
    }

    async fn delete(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError> {
        let uuid = *id.as_uuid();
        self.transactions
            .run(|conn| {
                async move {
                    let existing = users::table
                        .find(uuid)
                        .select(UserRow::as_select())
                        .for_update()
                        .first(conn.pg())
                        .await
                        .optional()
                        .map_err(map_diesel_error)?;
                    if existing.is_some() {
                        diesel::delete(users::table.find(uuid))
                            .execute(conn.pg())
                            .await
                            .map_err(map_diesel_error)?;
                    }
                    existing.map(into_user).transpose()
                }
                .scope_boxed()
            })
            .await
    }
}
