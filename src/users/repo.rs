use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::RepoError;
use crate::users::repo_types::{Account, AccountChanges, NewAccount};

/// Storage contract consumed by the authorization gate, login and the user
/// handlers. Implementations enforce unique usernames and emails and give
/// atomic single-row semantics.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepoError>;
    async fn list(&self) -> Result<Vec<Account>, RepoError>;
    async fn create(&self, new: NewAccount) -> Result<Account, RepoError>;
    async fn update(&self, id: i64, changes: AccountChanges) -> Result<Option<Account>, RepoError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, RepoError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, RepoError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, RepoError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }

    async fn list(&self) -> Result<Vec<Account>, RepoError> {
        let rows = sqlx::query_as::<_, Account>(&format!(
            "SELECT {COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn create(&self, new: NewAccount) -> Result<Account, RepoError> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)
    }

    async fn update(&self, id: i64, changes: AccountChanges) -> Result<Option<Account>, RepoError> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                updated_at = now()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique)
    }

    async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

fn map_unique(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some("users_username_key") => RepoError::Duplicate("username"),
                _ => RepoError::Duplicate("email"),
            };
        }
    }
    RepoError::Database(e)
}
