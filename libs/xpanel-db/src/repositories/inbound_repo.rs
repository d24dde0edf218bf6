use sqlx::{PgExecutor, PgPool};
use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info};
use xpanel_shared::api::Traffic;
use crate::error::ModelError;
use crate::models::inbound::Inbound;

#[derive(Debug, Clone)]
pub struct InboundRepository {
    pool: PgPool,
}

impl InboundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_inbounds(&self, user_id: i64) -> Result<Vec<Inbound>> {
        sqlx::query_as::<_, Inbound>("SELECT * FROM inbounds WHERE user_id = $1 ORDER BY id ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch inbounds for user")
    }

    pub async fn get_all_inbounds(&self) -> Result<Vec<Inbound>> {
        sqlx::query_as::<_, Inbound>("SELECT * FROM inbounds ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch all inbounds")
    }

    pub async fn get_inbound(&self, id: i64) -> Result<Option<Inbound>> {
        sqlx::query_as::<_, Inbound>("SELECT * FROM inbounds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch inbound by ID")
    }

    pub async fn get_inbounds_with_secondary_forward(&self) -> Result<Vec<Inbound>> {
        sqlx::query_as::<_, Inbound>(
            "SELECT * FROM inbounds WHERE secondary_forward_enable = TRUE AND secondary_forward_protocol <> 'none' ORDER BY id ASC"
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch inbounds with secondary forward")
    }

    /// Whether another inbound already listens on `port`. `ignore_id` excludes
    /// the record being updated; pass 0 for new records.
    pub async fn check_port_exist(&self, port: i32, ignore_id: i64) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM inbounds WHERE port = $1 AND id <> $2)")
            .bind(port)
            .bind(ignore_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check inbound port")
    }

    pub async fn add_inbound(&self, inbound: &mut Inbound) -> Result<i64> {
        self.prepare_for_save(inbound, 0).await?;

        let id = insert_inbound(&self.pool, inbound).await?;
        inbound.id = id;
        info!("Added inbound {} ({}) on port {}", inbound.tag, inbound.protocol, inbound.port);
        Ok(id)
    }

    /// Inserts every inbound or none of them.
    pub async fn add_inbounds(&self, inbounds: &mut [Inbound]) -> Result<()> {
        let mut ports = HashSet::new();
        for inbound in inbounds.iter_mut() {
            if !ports.insert(inbound.port) {
                return Err(ModelError::PortInUse(inbound.port).into());
            }
            self.prepare_for_save(inbound, 0).await?;
        }

        let mut tx = self.pool.begin().await?;
        for inbound in inbounds.iter_mut() {
            let port = inbound.port;
            let id = insert_inbound(&mut *tx, inbound)
                .await
                .with_context(|| format!("Failed to insert inbound on port {}", port))?;
            inbound.id = id;
        }
        tx.commit().await.context("Failed to commit inbound batch")?;

        info!("Added {} inbounds", inbounds.len());
        Ok(())
    }

    /// Overwrites every editable field of the stored record. Ownership and
    /// the id are kept.
    pub async fn update_inbound(&self, inbound: &mut Inbound) -> Result<()> {
        self.prepare_for_save(inbound, inbound.id).await?;

        let result = sqlx::query(
            r#"
            UPDATE inbounds SET
                up = $1, down = $2, total = $3, remark = $4, enable = $5, expiry_time = $6,
                listen = $7, port = $8, protocol = $9, settings = $10, stream_settings = $11,
                tag = $12, sniffing = $13,
                secondary_forward_enable = $14, secondary_forward_protocol = $15,
                secondary_forward_address = $16, secondary_forward_port = $17,
                secondary_forward_username = $18, secondary_forward_password = $19
            WHERE id = $20
            "#
        )
        .bind(inbound.up)
        .bind(inbound.down)
        .bind(inbound.total)
        .bind(&inbound.remark)
        .bind(inbound.enable)
        .bind(inbound.expiry_time)
        .bind(&inbound.listen)
        .bind(inbound.port)
        .bind(&inbound.protocol)
        .bind(&inbound.settings)
        .bind(&inbound.stream_settings)
        .bind(&inbound.tag)
        .bind(&inbound.sniffing)
        .bind(inbound.secondary_forward_enable)
        .bind(&inbound.secondary_forward_protocol)
        .bind(&inbound.secondary_forward_address)
        .bind(inbound.secondary_forward_port)
        .bind(&inbound.secondary_forward_username)
        .bind(&inbound.secondary_forward_password)
        .bind(inbound.id)
        .execute(&self.pool)
        .await
        .context("Failed to update inbound")?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("Inbound {} not found", inbound.id));
        }
        info!("Updated inbound {} ({})", inbound.id, inbound.tag);
        Ok(())
    }

    pub async fn del_inbound(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM inbounds WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete inbound")?;

        info!("Deleted inbound {}", id);
        Ok(())
    }

    /// Adds Xray traffic samples to the matching inbound counters. Outbound
    /// samples are skipped.
    pub async fn add_traffic(&self, traffics: &[Traffic]) -> Result<()> {
        if traffics.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for traffic in traffics.iter().filter(|t| t.is_inbound) {
            sqlx::query("UPDATE inbounds SET up = up + $1, down = down + $2 WHERE tag = $3")
                .bind(traffic.up)
                .bind(traffic.down)
                .bind(&traffic.tag)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to add traffic for {}", traffic.tag))?;
        }
        tx.commit().await.context("Failed to commit traffic update")?;

        debug!("Recorded {} traffic samples", traffics.len());
        Ok(())
    }

    /// Disables enabled inbounds whose quota is used up or whose expiry has
    /// passed. Returns how many were switched off.
    pub async fn disable_invalid_inbounds(&self, now_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE inbounds SET enable = FALSE
            WHERE ((total > 0 AND up + down >= total) OR (expiry_time > 0 AND expiry_time <= $1))
              AND enable = TRUE
            "#
        )
        .bind(now_millis)
        .execute(&self.pool)
        .await
        .context("Failed to disable invalid inbounds")?;

        let count = result.rows_affected();
        if count > 0 {
            info!("Disabled {} exhausted or expired inbounds", count);
        }
        Ok(count)
    }

    async fn prepare_for_save(&self, inbound: &mut Inbound, ignore_id: i64) -> Result<()> {
        if self.check_port_exist(inbound.port, ignore_id).await? {
            return Err(ModelError::PortInUse(inbound.port).into());
        }
        inbound.validate_secondary_forward().into_result()?;
        inbound.normalize_secondary_forward();
        inbound.assign_tag();
        Ok(())
    }
}

async fn insert_inbound<'e, E: PgExecutor<'e>>(executor: E, inbound: &Inbound) -> Result<i64> {
    sqlx::query_scalar(
        r#"
        INSERT INTO inbounds (
            user_id, up, down, total, remark, enable, expiry_time,
            listen, port, protocol, settings, stream_settings, tag, sniffing,
            secondary_forward_enable, secondary_forward_protocol, secondary_forward_address,
            secondary_forward_port, secondary_forward_username, secondary_forward_password
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        RETURNING id
        "#
    )
    .bind(inbound.user_id)
    .bind(inbound.up)
    .bind(inbound.down)
    .bind(inbound.total)
    .bind(&inbound.remark)
    .bind(inbound.enable)
    .bind(inbound.expiry_time)
    .bind(&inbound.listen)
    .bind(inbound.port)
    .bind(&inbound.protocol)
    .bind(&inbound.settings)
    .bind(&inbound.stream_settings)
    .bind(&inbound.tag)
    .bind(&inbound.sniffing)
    .bind(inbound.secondary_forward_enable)
    .bind(&inbound.secondary_forward_protocol)
    .bind(&inbound.secondary_forward_address)
    .bind(inbound.secondary_forward_port)
    .bind(&inbound.secondary_forward_username)
    .bind(&inbound.secondary_forward_password)
    .fetch_one(executor)
    .await
    .context("Failed to insert inbound")
}
