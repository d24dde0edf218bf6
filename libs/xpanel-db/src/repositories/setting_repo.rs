use sqlx::PgPool;
use anyhow::{Context, Result};
use tracing::info;
use crate::models::settings::{AllSetting, Setting};

#[derive(Debug, Clone)]
pub struct SettingRepository {
    pool: PgPool,
}

impl SettingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_all_rows(&self) -> Result<Vec<Setting>> {
        sqlx::query_as::<_, Setting>("SELECT id, key, value, updated_at FROM settings ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch settings from DB")
    }

    /// Stored settings on top of the defaults.
    pub async fn get_all_setting(&self) -> Result<AllSetting> {
        let rows = self.get_all_rows().await?;
        let setting = AllSetting::from_pairs(rows.iter().map(|row| (row.key.as_str(), row.value.as_str())))?;
        Ok(setting)
    }

    pub async fn update_all_setting(&self, setting: &AllSetting) -> Result<()> {
        setting.check_valid()?;

        let mut tx = self.pool.begin().await?;
        for (key, value) in setting.to_pairs() {
            sqlx::query(
                "INSERT INTO settings (key, value) VALUES ($1, $2)
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()"
            )
            .bind(key)
            .bind(&value)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to update setting {}", key))?;
        }
        tx.commit().await?;

        info!("Saved panel settings");
        Ok(())
    }
}
