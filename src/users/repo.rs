use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The `users.email` unique constraint rejected the write.
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn map_write_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Database(err),
    }
}

/// Persistence for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    /// Writes name, email, password hash and admin flag back; bumps `updated_at`.
    /// `None` when the row is gone.
    async fn save(&self, user: &User) -> Result<Option<User>, StoreError>;
    /// Returns `false` when no row matched.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn list_by_admin(&self, is_admin: bool) -> Result<Vec<User>, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, is_admin, created_at, updated_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)
    }

    async fn save(&self, user: &User) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = $2, email = $3, password_hash = $4, is_admin = $5, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_by_admin(&self, is_admin: bool) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_admin = $1 ORDER BY created_at ASC"
        ))
        .bind(is_admin)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use time::OffsetDateTime;

    use super::*;

    /// In-process store honoring the same email uniqueness as the table.
    #[derive(Default)]
    pub struct MemoryUserStore {
        rows: Mutex<Vec<User>>,
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|u| u.email == email).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|u| u.id == id).cloned())
        }

        async fn create(&self, new: NewUser) -> Result<User, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|u| u.email == new.email) {
                return Err(StoreError::DuplicateEmail);
            }
            let now = OffsetDateTime::now_utc();
            let user = User {
                id: Uuid::new_v4(),
                name: new.name,
                email: new.email,
                password_hash: new.password_hash,
                is_admin: false,
                created_at: now,
                updated_at: now,
            };
            rows.push(user.clone());
            Ok(user)
        }

        async fn save(&self, user: &User) -> Result<Option<User>, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|u| u.email == user.email && u.id != user.id) {
                return Err(StoreError::DuplicateEmail);
            }
            let Some(row) = rows.iter_mut().find(|u| u.id == user.id) else {
                return Ok(None);
            };
            *row = User {
                updated_at: OffsetDateTime::now_utc(),
                created_at: row.created_at,
                ..user.clone()
            };
            Ok(Some(row.clone()))
        }

        async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|u| u.id != id);
            Ok(rows.len() != before)
        }

        async fn list_by_admin(&self, is_admin: bool) -> Result<Vec<User>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().filter(|u| u.is_admin == is_admin).cloned().collect())
        }
    }
}
