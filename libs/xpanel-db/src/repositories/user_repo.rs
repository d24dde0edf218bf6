use sqlx::PgPool;
use anyhow::{Context, Result};
use tracing::{info, warn};
use crate::models::user::{DEFAULT_PASSWORD, DEFAULT_USERNAME, User};

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Seeds the default admin/admin account on an empty database.
    pub async fn ensure_default_user(&self) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;

        if count > 0 {
            return Ok(());
        }

        let hash = bcrypt::hash(DEFAULT_PASSWORD, bcrypt::DEFAULT_COST)
            .context("Failed to hash password")?;
        sqlx::query("INSERT INTO users (username, password) VALUES ($1, $2)")
            .bind(DEFAULT_USERNAME)
            .bind(&hash)
            .execute(&self.pool)
            .await
            .context("Failed to create default user")?;

        warn!("Created default user '{}', change its password", DEFAULT_USERNAME);
        Ok(())
    }

    pub async fn get_first_user(&self) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT id, username, password FROM users ORDER BY id ASC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch first user")
    }

    /// The user if the credentials match, `None` otherwise.
    pub async fn check_user(&self, username: &str, password: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, username, password FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by username")?;

        let Some(user) = user else {
            return Ok(None);
        };
        let matches = bcrypt::verify(password, &user.password).context("Failed to verify password")?;
        Ok(matches.then_some(user))
    }

    pub async fn update_user(&self, id: i64, username: &str, password: &str) -> Result<()> {
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .context("Failed to hash password")?;

        let result = sqlx::query("UPDATE users SET username = $1, password = $2 WHERE id = $3")
            .bind(username)
            .bind(&hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update user credentials")?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("User {} not found", id));
        }
        info!("Updated credentials for user {}", id);
        Ok(())
    }
}
