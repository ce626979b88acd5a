/// Account records and operations
use crate::admin::Role;
use crate::error::{ModError, ModResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Account identity as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Account store
#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a new account
    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        role: Role,
    ) -> ModResult<Identity> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, username, role, is_active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(role.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                ModError::Conflict(format!("Account {} already exists", username))
            }
            other => ModError::Database(other),
        })?;

        Ok(Identity {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            username: username.to_string(),
            avatar: None,
            role,
            is_active: true,
            created_at: now,
        })
    }

    /// Get account by id
    pub async fn get_user(&self, id: i64) -> ModResult<Option<Identity>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, username, avatar, role, is_active, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_identity).transpose()
    }

    /// Get account by username
    pub async fn find_by_username(&self, username: &str) -> ModResult<Option<Identity>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, username, avatar, role, is_active, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_identity).transpose()
    }

    /// Set the active flag. Returns false when no account matched the expected prior state.
    pub async fn set_active(&self, id: i64, active: bool) -> ModResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_active = ?, updated_at = ? WHERE id = ? AND is_active = ?",
        )
        .bind(active)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(!active)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_role(&self, id: i64, role: Role) -> ModResult<()> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ModError::NotFound(format!("User {} not found", id)));
        }

        Ok(())
    }

    pub async fn set_avatar(&self, id: i64, avatar: Option<&str>) -> ModResult<()> {
        sqlx::query("UPDATE users SET avatar = ?, updated_at = ? WHERE id = ?")
            .bind(avatar)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn set_password_hash(&self, id: i64, password_hash: &str) -> ModResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ModError::NotFound(format!("User {} not found", id)));
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn password_hash(&self, id: i64) -> ModResult<Option<String>> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

        Ok(hash)
    }
}

fn parse_identity(row: SqliteRow) -> ModResult<Identity> {
    let role_str: String = row.try_get("role")?;
    let created_at_str: String = row.try_get("created_at")?;

    Ok(Identity {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        avatar: row.try_get("avatar")?,
        role: Role::from_str(&role_str)?,
        is_active: row.try_get("is_active")?,
        created_at: super::parse_timestamp(&created_at_str)?,
    })
}
