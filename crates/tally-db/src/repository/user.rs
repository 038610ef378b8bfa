//! # User Repository
//!
//! Users only exist here so documents and movements can point at a real row
//! and be read back with it. Authentication is someone else's job.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tally_core::requests::NewUser;
use tally_core::{new_id, CoreError, User, ValidationError};
use tracing::debug;

use crate::error::{DbResult, EngineResult};

/// Loads a user by id.
pub async fn fetch_user(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(user)
}

/// Fails with `UserNotFound` unless the user exists.
pub async fn require_user(conn: &mut SqliteConnection, id: &str) -> EngineResult<User> {
    fetch_user(conn, id)
        .await?
        .ok_or_else(|| CoreError::UserNotFound(id.to_string()).into())
}

/// Repository for users.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates a user. Emails are unique.
    pub async fn create_user(&self, new: &NewUser) -> EngineResult<User> {
        new.validate()?;

        let email = new.email.trim().to_lowercase();
        let taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        if taken.is_some() {
            return Err(ValidationError::Duplicate {
                field: "email".to_string(),
                value: email,
            }
            .into());
        }

        let user = User {
            id: new_id(),
            name: new.name.trim().to_string(),
            email,
            role: new.role.clone(),
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %user.id, email = %user.email, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.role)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    /// Gets a user by id.
    pub async fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id).await
    }
}
