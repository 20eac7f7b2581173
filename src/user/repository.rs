//! User directory repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::models::UserProfile;

/// Repository over the mirrored users table.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    /// Create a new user directory.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, display_name, avatar_url, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        Ok(user)
    }

    /// Fetch several users at once, keyed by ID. Missing IDs are absent
    /// from the map, not errors.
    #[instrument(skip(self, ids))]
    pub async fn get_many(&self, ids: &[&str]) -> Result<HashMap<String, UserProfile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, display_name, avatar_url, created_at, updated_at \
             FROM users WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, UserProfile>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let users = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch users")?;

        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    /// Check whether a user row exists.
    #[instrument(skip(self))]
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check user existence")?;

        Ok(count.0 > 0)
    }

    /// Mirror a user row from a verified credential.
    ///
    /// Inserts on first sight, refreshes the display name afterwards. The
    /// identity subsystem remains the source of truth for these fields.
    #[instrument(skip(self))]
    pub async fn ensure(&self, id: &str, display_name: &str) -> Result<UserProfile> {
        debug!("Mirroring user {} into directory", id);

        sqlx::query(
            r#"
            INSERT INTO users (id, display_name)
            VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                updated_at = datetime('now')
            "#,
        )
        .bind(id)
        .bind(display_name)
        .execute(&self.pool)
        .await
        .context("Failed to upsert user")?;

        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after upsert"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> UserDirectory {
        let db = Database::in_memory().await.unwrap();
        UserDirectory::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_ensure_and_get() {
        let users = setup().await;

        let user = users.ensure("usr_alice", "Alice").await.unwrap();
        assert_eq!(user.id, "usr_alice");
        assert_eq!(user.display_name, "Alice");

        let fetched = users.get("usr_alice").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert!(users.exists("usr_alice").await.unwrap());
        assert!(!users.exists("usr_nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_refreshes_display_name() {
        let users = setup().await;

        users.ensure("usr_alice", "Alice").await.unwrap();
        let updated = users.ensure("usr_alice", "Alice Smith").await.unwrap();
        assert_eq!(updated.display_name, "Alice Smith");
    }

    #[tokio::test]
    async fn test_get_many() {
        let users = setup().await;

        users.ensure("usr_alice", "Alice").await.unwrap();
        users.ensure("usr_bob", "Bob").await.unwrap();

        let map = users
            .get_many(&["usr_alice", "usr_bob", "usr_missing"])
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["usr_bob"].display_name, "Bob");
        assert!(!map.contains_key("usr_missing"));

        assert!(users.get_many(&[]).await.unwrap().is_empty());
    }
}
