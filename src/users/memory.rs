use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::RepoError;
use crate::users::repo::UserRepository;
use crate::users::repo_types::{Account, AccountChanges, NewAccount};

/// Process-local repository used when no `DATABASE_URL` is configured and in
/// tests. Uniqueness checks and writes happen under one write lock.
#[derive(Default)]
pub struct InMemoryUserRepository {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, Account>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.rows
            .values()
            .any(|a| a.email == email && Some(a.id) != except)
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, RepoError> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepoError> {
        let guard = self.inner.read().await;
        Ok(guard.rows.values().find(|a| a.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, RepoError> {
        Ok(self.inner.read().await.rows.values().cloned().collect())
    }

    async fn create(&self, new: NewAccount) -> Result<Account, RepoError> {
        let mut guard = self.inner.write().await;
        if guard.rows.values().any(|a| a.username == new.username) {
            return Err(RepoError::Duplicate("username"));
        }
        if guard.email_taken(&new.email, None) {
            return Err(RepoError::Duplicate("email"));
        }

        guard.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let account = Account {
            id: guard.next_id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };
        guard.rows.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update(&self, id: i64, changes: AccountChanges) -> Result<Option<Account>, RepoError> {
        let mut guard = self.inner.write().await;
        if let Some(email) = &changes.email {
            if guard.email_taken(email, Some(id)) {
                return Err(RepoError::Duplicate("email"));
            }
        }
        let Some(account) = guard.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            account.email = email;
        }
        if let Some(hash) = changes.password_hash {
            account.password_hash = hash;
        }
        account.updated_at = OffsetDateTime::now_utc();
        Ok(Some(account.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        Ok(self.inner.write().await.rows.remove(&id).is_some())
    }
}
