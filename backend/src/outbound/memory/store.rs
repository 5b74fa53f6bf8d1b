//! In-memory database with transactional staging.
//!
//! Writes made inside a transaction are staged on the connection and only
//! reach the shared tables on commit. Writes outside a transaction apply
//! immediately. The database counts open connections so tests can check
//! that every exit path releases its connection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::ports::{ConnectionSource, TransactionError, TransactionalConnection};
use crate::domain::{User, UserId};

#[derive(Debug, Default, Clone)]
struct Tables {
    users: BTreeMap<Uuid, User>,
}

#[derive(Debug, Clone)]
enum Write {
    Upsert(User),
    Delete(Uuid),
}

impl Tables {
    fn apply(&mut self, write: Write) {
        match write {
            Write::Upsert(user) => {
                self.users.insert(*user.id().as_uuid(), user);
            }
            Write::Delete(id) => {
                self.users.remove(&id);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    open: AtomicUsize,
    fail_connects: AtomicBool,
    fail_commits: AtomicBool,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared in-memory database handle.
///
/// Clones share the same tables and connection counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    /// Database pre-populated with `users`.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let db = Self::default();
        {
            let mut tables = db.shared.tables();
            for user in users {
                tables.apply(Write::Upsert(user));
            }
        }
        db
    }

    /// Number of connections handed out and not yet released.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Make subsequent `connect` calls fail.
    pub fn fail_connects(&self, fail: bool) {
        self.shared.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent commits fail, leaving the transaction open.
    pub fn fail_commits(&self, fail: bool) {
        self.shared.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Committed users ordered by display name.
    #[must_use]
    pub fn committed_users(&self) -> Vec<User> {
        sorted(self.shared.tables().users.values().cloned().collect())
    }

    /// Open a connection without going through the async port.
    #[must_use]
    pub fn connection(&self) -> MemoryConnection {
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        MemoryConnection {
            shared: Arc::clone(&self.shared),
            staged: None,
        }
    }
}

fn sorted(mut users: Vec<User>) -> Vec<User> {
    users.sort_by(|a, b| a.display_name().cmp(b.display_name()));
    users
}

#[async_trait]
impl ConnectionSource for MemoryDatabase {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection, TransactionError> {
        if self.shared.fail_connects.load(Ordering::SeqCst) {
            return Err(TransactionError::connect("memory database unavailable"));
        }
        Ok(self.connection())
    }
}

/// Connection to a [`MemoryDatabase`].
///
/// Reads observe committed data overlaid with this connection's own staged
/// writes.
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
    staged: Option<Vec<Write>>,
}

impl MemoryConnection {
    /// Whether a transaction is open on this connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    fn write(&mut self, write: Write) {
        match self.staged.as_mut() {
            Some(staged) => staged.push(write),
            None => self.shared.tables().apply(write),
        }
    }

    fn view(&self) -> Tables {
        let mut tables = self.shared.tables().clone();
        for write in self.staged.iter().flatten() {
            tables.apply(write.clone());
        }
        tables
    }

    /// Insert or replace a user.
    pub fn upsert_user(&mut self, user: User) {
        self.write(Write::Upsert(user));
    }

    /// Delete a user, returning the removed record.
    pub fn delete_user(&mut self, id: &UserId) -> Option<User> {
        let existing = self.find_user(id)?;
        self.write(Write::Delete(*id.as_uuid()));
        Some(existing)
    }

    /// Look up one user.
    #[must_use]
    pub fn find_user(&self, id: &UserId) -> Option<User> {
        self.view().users.remove(id.as_uuid())
    }

    /// Visible users ordered by display name.
    #[must_use]
    pub fn users(&self) -> Vec<User> {
        sorted(self.view().users.into_values().collect())
    }
}

#[async_trait]
impl TransactionalConnection for MemoryConnection {
    async fn begin(&mut self) -> Result<(), TransactionError> {
        if self.staged.is_some() {
            return Err(TransactionError::begin("nested transactions are not supported"));
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TransactionError> {
        if self.staged.is_none() {
            return Err(TransactionError::commit("no transaction is open"));
        }
        if self.shared.fail_commits.load(Ordering::SeqCst) {
            return Err(TransactionError::commit("injected commit failure"));
        }
        let writes = self.staged.take().unwrap_or_default();
        let mut tables = self.shared.tables();
        for write in writes {
            tables.apply(write);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TransactionError> {
        self.staged
            .take()
            .map(drop)
            .ok_or_else(|| TransactionError::rollback("no transaction is open"))
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.shared.open.fetch_sub(1, Ordering::SeqCst);
    }
}
