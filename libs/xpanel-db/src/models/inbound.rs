use crate::env::Environment;
use crate::error::{ModelError, Result};
use crate::models::blob::{BlobField, parse_blob};
use crate::models::without_nulls;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use xpanel_shared::xray::{FORWARD_NONE, InboundConfig, LinkEncoder};

pub const ONE_GB: i64 = 1_073_741_824;

pub const MSG_FORWARD_PROTOCOL_REQUIRED: &str =
    "a protocol must be selected when secondary forwarding is enabled";
pub const MSG_FORWARD_ADDRESS_REQUIRED: &str = "the upstream server address must not be empty";
pub const MSG_FORWARD_PORT_RANGE: &str = "the upstream port must be between 1 and 65535";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    VMess,
    VLess,
    Trojan,
    Shadowsocks,
    DokodemoDoor,
    Socks,
    Http,
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vmess" => Some(Protocol::VMess),
            "vless" => Some(Protocol::VLess),
            "trojan" => Some(Protocol::Trojan),
            "shadowsocks" => Some(Protocol::Shadowsocks),
            "dokodemo-door" => Some(Protocol::DokodemoDoor),
            "socks" => Some(Protocol::Socks),
            "http" => Some(Protocol::Http),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::VMess => "vmess",
            Protocol::VLess => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::DokodemoDoor => "dokodemo-door",
            Protocol::Socks => "socks",
            Protocol::Http => "http",
        }
    }

    /// Protocols a client can import from a share link.
    pub fn has_link(&self) -> bool {
        matches!(
            self,
            Protocol::VMess | Protocol::VLess | Protocol::Trojan | Protocol::Shadowsocks
        )
    }
}

/// Persisted inbound row.
///
/// Built with every field at its default and then overwritten by whatever the
/// source object carries; unknown source fields are ignored. Nothing derived
/// is stored: quota, expiry and forward state are recomputed on each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct Inbound {
    pub id: i64,
    pub user_id: i64,
    pub up: i64,
    pub down: i64,
    pub total: i64, // bytes, 0 = unlimited
    pub remark: String,
    pub enable: bool,
    pub expiry_time: i64, // unix millis, 0 = never

    pub listen: String,
    pub port: i32,
    pub protocol: String,
    pub settings: String,
    pub stream_settings: String,
    pub tag: String,
    pub sniffing: String,

    pub secondary_forward_enable: bool,
    pub secondary_forward_protocol: String, // 'none', 'socks', 'http', 'https'
    pub secondary_forward_address: String,
    pub secondary_forward_port: i32,
    pub secondary_forward_username: String,
    pub secondary_forward_password: String,
}

impl Default for Inbound {
    fn default() -> Self {
        Self {
            id: 0,
            user_id: 0,
            up: 0,
            down: 0,
            total: 0,
            remark: String::new(),
            enable: true,
            expiry_time: 0,
            listen: String::new(),
            port: 0,
            protocol: String::new(),
            settings: String::new(),
            stream_settings: String::new(),
            tag: String::new(),
            sniffing: String::new(),
            secondary_forward_enable: false,
            secondary_forward_protocol: FORWARD_NONE.to_string(),
            secondary_forward_address: String::new(),
            secondary_forward_port: 0,
            secondary_forward_username: String::new(),
            secondary_forward_password: String::new(),
        }
    }
}

/// Outcome of [`Inbound::validate_secondary_forward`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryForwardCheck {
    pub valid: bool,
    pub message: String,
}

impl SecondaryForwardCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    fn invalid(message: &str) -> Self {
        Self {
            valid: false,
            message: message.to_string(),
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(ModelError::InvalidSecondaryForwardConfig(self.message))
        }
    }
}

impl Inbound {
    /// Default-filled record overwritten by the fields present on `source`.
    pub fn from_source(source: Option<serde_json::Value>) -> Result<Self> {
        match source {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(value) => Ok(serde_json::from_value(without_nulls(value))?),
        }
    }

    pub fn quota_in_gb(&self) -> f64 {
        round_to_cents(self.total as f64 / ONE_GB as f64)
    }

    pub fn set_quota_in_gb(&mut self, gb: f64) {
        self.total = (gb.max(0.0) * ONE_GB as f64).round() as i64;
    }

    pub fn protocol_kind(&self) -> Option<Protocol> {
        Protocol::parse(&self.protocol)
    }

    pub fn is_vmess(&self) -> bool {
        self.protocol_kind() == Some(Protocol::VMess)
    }

    pub fn is_vless(&self) -> bool {
        self.protocol_kind() == Some(Protocol::VLess)
    }

    pub fn is_trojan(&self) -> bool {
        self.protocol_kind() == Some(Protocol::Trojan)
    }

    pub fn is_shadowsocks(&self) -> bool {
        self.protocol_kind() == Some(Protocol::Shadowsocks)
    }

    pub fn is_dokodemo_door(&self) -> bool {
        self.protocol_kind() == Some(Protocol::DokodemoDoor)
    }

    pub fn is_socks(&self) -> bool {
        self.protocol_kind() == Some(Protocol::Socks)
    }

    pub fn is_http(&self) -> bool {
        self.protocol_kind() == Some(Protocol::Http)
    }

    /// Address clients should dial. Wildcard and empty listen addresses fall
    /// back to the caller's own host name.
    pub fn resolved_address(&self, env: &impl Environment) -> String {
        if self.listen.is_empty() || self.listen == "0.0.0.0" {
            env.hostname()
        } else {
            self.listen.clone()
        }
    }

    pub fn expiry_moment(&self) -> Option<DateTime<Utc>> {
        if self.expiry_time == 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.expiry_time)
    }

    pub fn set_expiry_moment(&mut self, moment: Option<DateTime<Utc>>) {
        self.expiry_time = moment.map_or(0, |t| t.timestamp_millis());
    }

    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expiry_time != 0 && self.expiry_time < now_millis
    }

    pub fn is_expired(&self, env: &impl Environment) -> bool {
        self.is_expired_at(env.now_millis())
    }

    pub fn used_traffic(&self) -> i64 {
        self.up + self.down
    }

    pub fn is_exhausted(&self) -> bool {
        self.total > 0 && self.used_traffic() >= self.total
    }

    /// Whether the periodic disable job would switch this inbound off.
    pub fn is_invalid_at(&self, now_millis: i64) -> bool {
        self.is_exhausted() || (self.expiry_time > 0 && self.expiry_time <= now_millis)
    }

    pub fn has_secondary_forward(&self) -> bool {
        self.secondary_forward_enable
            && !self.secondary_forward_protocol.is_empty()
            && self.secondary_forward_protocol != FORWARD_NONE
    }

    pub fn secondary_forward_endpoint(&self) -> String {
        if !self.has_secondary_forward() {
            return String::new();
        }
        format!(
            "{}:{}",
            self.secondary_forward_address, self.secondary_forward_port
        )
    }

    pub fn secondary_forward_requires_auth(&self) -> bool {
        !self.secondary_forward_username.is_empty() || !self.secondary_forward_password.is_empty()
    }

    pub fn has_shareable_link(&self) -> bool {
        self.protocol_kind().is_some_and(|p| p.has_link())
    }

    /// Checks the forward fields in a fixed order and reports only the first
    /// violation. Disabled forwards are always valid.
    pub fn validate_secondary_forward(&self) -> SecondaryForwardCheck {
        if !self.secondary_forward_enable {
            return SecondaryForwardCheck::ok();
        }
        if self.secondary_forward_protocol.is_empty() || self.secondary_forward_protocol == FORWARD_NONE {
            return SecondaryForwardCheck::invalid(MSG_FORWARD_PROTOCOL_REQUIRED);
        }
        if self.secondary_forward_address.is_empty() {
            return SecondaryForwardCheck::invalid(MSG_FORWARD_ADDRESS_REQUIRED);
        }
        if !(1..=65535).contains(&self.secondary_forward_port) {
            return SecondaryForwardCheck::invalid(MSG_FORWARD_PORT_RANGE);
        }
        SecondaryForwardCheck::ok()
    }

    /// Clears forward fields that an inactive forward must not carry.
    pub fn normalize_secondary_forward(&mut self) {
        if self.secondary_forward_enable && self.secondary_forward_protocol != FORWARD_NONE {
            return;
        }
        self.secondary_forward_enable = false;
        self.secondary_forward_protocol = FORWARD_NONE.to_string();
        self.secondary_forward_address.clear();
        self.secondary_forward_port = 0;
        self.secondary_forward_username.clear();
        self.secondary_forward_password.clear();
    }

    pub fn assign_tag(&mut self) {
        self.tag = format!("inbound-{}", self.port);
    }

    /// Runtime configuration for Xray and the link encoders. Each blob is
    /// parsed on its own and the first malformed one is reported. No
    /// validation happens here.
    pub fn to_inbound(&self) -> Result<InboundConfig> {
        let settings = parse_blob(BlobField::Settings, Some(&self.settings))?;
        let stream_settings = parse_blob(BlobField::StreamSettings, Some(&self.stream_settings))?;
        let sniffing = parse_blob(BlobField::Sniffing, Some(&self.sniffing))?;

        Ok(InboundConfig {
            port: self.port,
            listen: self.listen.clone(),
            protocol: self.protocol.clone(),
            settings,
            stream_settings,
            tag: self.tag.clone(),
            sniffing,
            secondary_forward_enable: self.secondary_forward_enable,
            secondary_forward_protocol: self.secondary_forward_protocol.clone(),
            secondary_forward_address: self.secondary_forward_address.clone(),
            secondary_forward_port: self.secondary_forward_port,
            secondary_forward_username: self.secondary_forward_username.clone(),
            secondary_forward_password: self.secondary_forward_password.clone(),
        })
    }

    pub fn gen_link(
        &self,
        encoder: &dyn LinkEncoder,
        env: &impl Environment,
    ) -> Result<Option<String>> {
        if !self.has_shareable_link() {
            return Ok(None);
        }
        let inbound = self.to_inbound()?;
        Ok(encoder.encode(&inbound, &self.resolved_address(env), &self.remark))
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
