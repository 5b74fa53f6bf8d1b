//! In-memory [`UserRepository`] backed by [`MemoryDatabase`].

use async_trait::async_trait;
use diesel_async::scoped_futures::ScopedFutureExt;

use super::MemoryDatabase;
use crate::domain::ports::{UserPersistenceError, UserRepository};
use crate::domain::{TransactionService, User, UserId};

/// User repository whose writes run through [`TransactionService::run`].
#[derive(Clone)]
pub struct MemoryUserRepository {
    transactions: TransactionService<MemoryDatabase>,
}

impl MemoryUserRepository {
    /// Repository writing through `transactions`.
    pub fn new(transactions: TransactionService<MemoryDatabase>) -> Self {
        Self { transactions }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn upsert(&self, user: &User) -> Result<(), UserPersistenceError> {
        let user = user.clone();
        self.transactions
            .run(|conn| {
                async move {
                    conn.upsert_user(user);
                    Ok::<_, UserPersistenceError>(())
                }
                .scope_boxed()
            })
            .await
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError> {
        let conn = self.transactions.source().connection();
        Ok(conn.find_user(id))
    }

    async fn list(&self) -> Result<Vec<User>, UserPersistenceError> {
        Ok(self.transactions.source().connection().users())
    }

    async fn delete(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError> {
        let id = id.clone();
        self.transactions
            .run(|conn| async move { Ok(conn.delete_user(&id)) }.scope_boxed())
            .await
    }
}
