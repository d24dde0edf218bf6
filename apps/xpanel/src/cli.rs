use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::PgPool;
use std::fs;
use std::path::Path;
use tracing::info;
use xpanel_db::env::{Environment, SystemEnvironment};
use xpanel_db::models::inbound::Inbound;
use xpanel_db::repositories::{InboundRepository, SettingRepository, UserRepository};
use xpanel_shared::api::Msg;

use crate::generator::ConfigGenerator;

pub async fn write_config(pool: &PgPool, output: Option<&Path>) -> Result<()> {
    let setting = SettingRepository::new(pool.clone()).get_all_setting().await?;
    let inbounds = InboundRepository::new(pool.clone()).get_all_inbounds().await?;

    let config = ConfigGenerator::generate_config(&setting.xray_template_config, &inbounds)?;
    let rendered = serde_json::to_string_pretty(&config.build())?;

    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write Xray config to {}", path.display()))?;
            info!("Xray config written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundReport {
    pub id: i64,
    pub tag: String,
    pub protocol: String,
    pub enable: bool,
    pub expired: bool,
    pub exhausted: bool,
    pub forward_endpoint: String,
    pub problems: Vec<String>,
}

impl InboundReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Everything wrong with one stored inbound, without touching the database.
pub fn inspect(inbound: &Inbound, env: &impl Environment) -> InboundReport {
    let mut problems = Vec::new();

    if inbound.protocol_kind().is_none() {
        problems.push(format!("unknown protocol {:?}", inbound.protocol));
    }
    if !(1..=65535).contains(&inbound.port) {
        problems.push(format!("port {} is out of range", inbound.port));
    }
    if let Err(e) = inbound.to_inbound() {
        problems.push(e.to_string());
    }
    let check = inbound.validate_secondary_forward();
    if !check.valid {
        problems.push(check.message);
    }

    InboundReport {
        id: inbound.id,
        tag: inbound.tag.clone(),
        protocol: inbound.protocol.clone(),
        enable: inbound.enable,
        expired: inbound.is_expired(env),
        exhausted: inbound.is_exhausted(),
        forward_endpoint: inbound.secondary_forward_endpoint(),
        problems,
    }
}

pub async fn check_inbounds(pool: &PgPool, as_json: bool) -> Result<()> {
    let inbounds = InboundRepository::new(pool.clone()).get_all_inbounds().await?;
    let env = SystemEnvironment;
    let reports: Vec<InboundReport> = inbounds.iter().map(|i| inspect(i, &env)).collect();
    let failed = reports.iter().filter(|r| !r.is_valid()).count();

    if as_json {
        let msg = if failed == 0 {
            Msg::ok_with("all inbounds are valid", reports)
        } else {
            Msg {
                success: false,
                msg: format!("{} inbound(s) failed validation", failed),
                obj: Some(reports),
            }
        };
        println!("{}", serde_json::to_string_pretty(&msg)?);
    } else {
        for report in &reports {
            let state = if report.is_valid() { "ok" } else { "INVALID" };
            println!("[{}] #{} {} ({})", state, report.id, report.tag, report.protocol);
            if !report.forward_endpoint.is_empty() {
                println!("    forward -> {}", report.forward_endpoint);
            }
            if report.expired || report.exhausted {
                println!("    expired: {}, exhausted: {}", report.expired, report.exhausted);
            }
            for problem in &report.problems {
                println!("    - {}", problem);
            }
        }
    }

    if failed > 0 {
        return Err(anyhow::anyhow!("{} inbound(s) failed validation", failed));
    }
    Ok(())
}

pub async fn disable_invalid(pool: &PgPool) -> Result<()> {
    let now = SystemEnvironment.now_millis();
    let count = InboundRepository::new(pool.clone())
        .disable_invalid_inbounds(now)
        .await?;
    println!("Disabled {} inbound(s).", count);
    Ok(())
}

pub async fn reset_credentials(pool: &PgPool, username: &str, password: &str) -> Result<()> {
    let users = UserRepository::new(pool.clone());
    let user = users
        .get_first_user()
        .await?
        .ok_or_else(|| anyhow::anyhow!("No user exists yet"))?;

    users.update_user(user.id, username, password).await?;
    println!("Credentials for user #{} have been reset.", user.id);
    Ok(())
}

pub async fn show_info(pool: &PgPool) -> Result<()> {
    let setting = SettingRepository::new(pool.clone()).get_all_setting().await?;
    let listen = if setting.web_listen.is_empty() { "0.0.0.0" } else { setting.web_listen.as_str() };
    let scheme = if setting.web_cert_file.is_empty() { "http" } else { "https" };

    println!("Panel URL:   {}://{}:{}{}", scheme, listen, setting.web_port, setting.normalized_base_path());
    println!("Time zone:   {}", setting.time_location);
    println!("Bot enabled: {}", setting.tg_bot_enable);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpanel_db::env::StaticEnvironment;

    #[test]
    fn healthy_inbound_has_no_problems() {
        let env = StaticEnvironment::new(1_000, "host");
        let inbound = Inbound {
            port: 443,
            protocol: "vless".to_string(),
            expiry_time: 500,
            ..Default::default()
        };
        let report = inspect(&inbound, &env);
        assert!(report.is_valid());
        assert!(report.expired);
        assert!(!report.exhausted);
    }

    #[test]
    fn every_problem_is_listed() {
        let env = StaticEnvironment::new(1_000, "host");
        let inbound = Inbound {
            port: 0,
            protocol: "wireguard".to_string(),
            stream_settings: "{".to_string(),
            secondary_forward_enable: true,
            secondary_forward_protocol: "none".to_string(),
            ..Default::default()
        };
        let report = inspect(&inbound, &env);
        assert_eq!(report.problems.len(), 4);
        assert!(report.problems[2].contains("streamSettings"));
        assert_eq!(
            report.problems[3],
            xpanel_db::models::inbound::MSG_FORWARD_PROTOCOL_REQUIRED
        );
        assert_eq!(report.forward_endpoint, "");
    }
}
