use crate::error::{ModelError, Result};
use crate::models::without_nulls;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::warn;

/// Row of the `settings` key/value table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Server-wide panel options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AllSetting {
    pub web_listen: String,
    pub web_port: i32,
    pub web_cert_file: String,
    pub web_key_file: String,
    pub web_base_path: String,
    pub tg_bot_enable: bool,
    pub tg_bot_token: String,
    pub tg_bot_chat_id: i64,
    pub tg_run_time: String, // cron spec for the bot report
    pub xray_template_config: String,
    pub time_location: String,
}

impl Default for AllSetting {
    fn default() -> Self {
        Self {
            web_listen: String::new(),
            web_port: 54321,
            web_cert_file: String::new(),
            web_key_file: String::new(),
            web_base_path: "/".to_string(),
            tg_bot_enable: false,
            tg_bot_token: String::new(),
            tg_bot_chat_id: 0,
            tg_run_time: String::new(),
            xray_template_config: String::new(),
            time_location: "Asia/Shanghai".to_string(),
        }
    }
}

impl AllSetting {
    pub fn from_source(source: Option<serde_json::Value>) -> Result<Self> {
        match source {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(value) => Ok(serde_json::from_value(without_nulls(value))?),
        }
    }

    /// Field-by-field comparison. Both sides are already default-filled by
    /// construction.
    pub fn equals(&self, other: &AllSetting) -> bool {
        self == other
    }

    /// Builds the settings from stored rows on top of the defaults.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut setting = Self::default();
        for (key, value) in pairs {
            setting.apply(key, value)?;
        }
        Ok(setting)
    }

    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "webListen" => self.web_listen = value.to_string(),
            "webPort" => self.web_port = parse_value(key, value)?,
            "webCertFile" => self.web_cert_file = value.to_string(),
            "webKeyFile" => self.web_key_file = value.to_string(),
            "webBasePath" => self.web_base_path = value.to_string(),
            "tgBotEnable" => self.tg_bot_enable = parse_value(key, value)?,
            "tgBotToken" => self.tg_bot_token = value.to_string(),
            "tgBotChatId" => self.tg_bot_chat_id = parse_value(key, value)?,
            "tgRunTime" => self.tg_run_time = value.to_string(),
            "xrayTemplateConfig" => self.xray_template_config = value.to_string(),
            "timeLocation" => self.time_location = value.to_string(),
            _ => warn!("Ignoring unknown setting key {}", key),
        }
        Ok(())
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("webListen", self.web_listen.clone()),
            ("webPort", self.web_port.to_string()),
            ("webCertFile", self.web_cert_file.clone()),
            ("webKeyFile", self.web_key_file.clone()),
            ("webBasePath", self.web_base_path.clone()),
            ("tgBotEnable", self.tg_bot_enable.to_string()),
            ("tgBotToken", self.tg_bot_token.clone()),
            ("tgBotChatId", self.tg_bot_chat_id.to_string()),
            ("tgRunTime", self.tg_run_time.clone()),
            ("xrayTemplateConfig", self.xray_template_config.clone()),
            ("timeLocation", self.time_location.clone()),
        ]
    }

    pub fn check_valid(&self) -> Result<()> {
        if !(1..=65535).contains(&self.web_port) {
            return Err(invalid("webPort", self.web_port.to_string()));
        }
        if !self.web_base_path.starts_with('/') {
            return Err(invalid("webBasePath", self.web_base_path.clone()));
        }
        if self.web_cert_file.is_empty() != self.web_key_file.is_empty() {
            let (key, value) = if self.web_cert_file.is_empty() {
                ("webCertFile", &self.web_cert_file)
            } else {
                ("webKeyFile", &self.web_key_file)
            };
            return Err(invalid(key, value.clone()));
        }
        if !self.xray_template_config.is_empty()
            && serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&self.xray_template_config).is_err()
        {
            return Err(invalid("xrayTemplateConfig", self.xray_template_config.clone()));
        }
        Ok(())
    }

    /// Base path with exactly one leading and one trailing slash.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.web_base_path.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(key, value.to_string()))
}

fn invalid(key: &str, value: String) -> ModelError {
    ModelError::InvalidSetting {
        key: key.to_string(),
        value,
    }
}
