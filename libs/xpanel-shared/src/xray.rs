use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const FORWARD_NONE: &str = "none";
pub const FORWARD_SOCKS: &str = "socks";
pub const FORWARD_HTTP: &str = "http";
pub const FORWARD_HTTPS: &str = "https";

/// Runtime inbound configuration handed to Xray and to link encoders.
///
/// Carries the parsed protocol, transport and sniffing objects plus the
/// panel-side secondary forward fields, which never reach Xray directly:
/// they are turned into an extra outbound and a routing rule by
/// [`XrayConfig::build`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundConfig {
    pub port: i32,
    pub listen: String,
    pub protocol: String,
    pub settings: Map<String, Value>,
    pub stream_settings: Map<String, Value>,
    pub tag: String,
    pub sniffing: Map<String, Value>,

    pub secondary_forward_enable: bool,
    pub secondary_forward_protocol: String,
    pub secondary_forward_address: String,
    pub secondary_forward_port: i32,
    pub secondary_forward_username: String,
    pub secondary_forward_password: String,
}

impl InboundConfig {
    pub fn has_secondary_forward(&self) -> bool {
        self.secondary_forward_enable
            && !self.secondary_forward_protocol.is_empty()
            && self.secondary_forward_protocol != FORWARD_NONE
    }

    pub fn forward_tag(&self) -> String {
        format!("{}-forward-{}", self.secondary_forward_protocol, self.port)
    }

    /// The inbound as Xray expects it. `listen` is dropped when empty so Xray
    /// binds every interface.
    pub fn to_xray_value(&self) -> Value {
        let mut inbound = Map::new();
        if !self.listen.is_empty() {
            inbound.insert("listen".into(), Value::String(self.listen.clone()));
        }
        inbound.insert("port".into(), json!(self.port));
        inbound.insert("protocol".into(), Value::String(self.protocol.clone()));
        inbound.insert("settings".into(), Value::Object(self.settings.clone()));
        inbound.insert(
            "streamSettings".into(),
            Value::Object(self.stream_settings.clone()),
        );
        inbound.insert("tag".into(), Value::String(self.tag.clone()));
        inbound.insert("sniffing".into(), Value::Object(self.sniffing.clone()));
        Value::Object(inbound)
    }

    /// Outbound relaying this inbound's traffic to the upstream proxy, if the
    /// forward is active and uses a protocol Xray can dial.
    pub fn forward_outbound(&self) -> Option<Value> {
        if !self.has_secondary_forward() {
            return None;
        }

        let protocol = match self.secondary_forward_protocol.as_str() {
            FORWARD_SOCKS => FORWARD_SOCKS,
            FORWARD_HTTP | FORWARD_HTTPS => FORWARD_HTTP,
            _ => return None,
        };

        let mut server = json!({
            "address": self.secondary_forward_address,
            "port": self.secondary_forward_port,
        });
        // Xray only accepts complete credential pairs
        if !self.secondary_forward_username.is_empty() && !self.secondary_forward_password.is_empty() {
            server["users"] = json!([{
                "user": self.secondary_forward_username,
                "pass": self.secondary_forward_password,
            }]);
        }

        let mut outbound = json!({
            "protocol": protocol,
            "settings": { "servers": [server] },
            "tag": self.forward_tag(),
        });
        if self.secondary_forward_protocol == FORWARD_HTTPS {
            outbound["streamSettings"] = json!({ "security": "tls" });
        }
        Some(outbound)
    }

    pub fn forward_routing_rule(&self) -> Value {
        json!({
            "type": "field",
            "inboundTag": [self.tag],
            "outboundTag": self.forward_tag(),
        })
    }
}

/// Full Xray configuration: template sections plus the panel's inbounds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrayConfig {
    pub log: Option<Value>,
    pub routing: Option<Value>,
    pub dns: Option<Value>,
    #[serde(default)]
    pub inbounds: Vec<InboundConfig>,
    pub outbounds: Option<Value>,
    pub transport: Option<Value>,
    pub policy: Option<Value>,
    pub api: Option<Value>,
    pub stats: Option<Value>,
    pub reverse: Option<Value>,
    pub fake_dns: Option<Value>,
}

impl XrayConfig {
    pub fn from_template(template: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(template)
    }

    /// Renders the final document. Active secondary forwards contribute one
    /// outbound each, appended after the template's outbounds, and one routing
    /// rule each, appended after the template's rules.
    pub fn build(&self) -> Value {
        let mut config = Map::new();
        insert_section(&mut config, "log", &self.log);
        insert_section(&mut config, "dns", &self.dns);

        let mut inbounds = Vec::with_capacity(self.inbounds.len());
        let mut forward_outbounds = Vec::new();
        let mut forward_rules = Vec::new();
        for inbound in &self.inbounds {
            inbounds.push(inbound.to_xray_value());
            if let Some(outbound) = inbound.forward_outbound() {
                forward_outbounds.push(outbound);
                forward_rules.push(inbound.forward_routing_rule());
            }
        }
        config.insert("inbounds".into(), Value::Array(inbounds));

        let mut outbounds = match &self.outbounds {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::new(),
        };
        outbounds.extend(forward_outbounds);
        if !outbounds.is_empty() {
            config.insert("outbounds".into(), Value::Array(outbounds));
        }

        if forward_rules.is_empty() {
            insert_section(&mut config, "routing", &self.routing);
        } else {
            let mut routing = match &self.routing {
                Some(Value::Object(existing)) => existing.clone(),
                _ => Map::new(),
            };
            let rules = routing
                .entry("rules")
                .or_insert_with(|| Value::Array(Vec::new()));
            match rules {
                Value::Array(existing) => existing.extend(forward_rules),
                other => *other = Value::Array(forward_rules),
            }
            config.insert("routing".into(), Value::Object(routing));
        }

        insert_section(&mut config, "transport", &self.transport);
        insert_section(&mut config, "policy", &self.policy);
        insert_section(&mut config, "api", &self.api);
        insert_section(&mut config, "stats", &self.stats);
        insert_section(&mut config, "reverse", &self.reverse);
        insert_section(&mut config, "fakeDns", &self.fake_dns);

        Value::Object(config)
    }
}

fn insert_section(config: &mut Map<String, Value>, key: &str, section: &Option<Value>) {
    if let Some(value) = section {
        config.insert(key.to_string(), value.clone());
    }
}

/// Produces the shareable client link for one inbound (vmess://, vless://, ...).
pub trait LinkEncoder {
    fn encode(&self, inbound: &InboundConfig, address: &str, remark: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarded(protocol: &str) -> InboundConfig {
        InboundConfig {
            port: 10443,
            protocol: "vless".into(),
            tag: "inbound-10443".into(),
            secondary_forward_enable: true,
            secondary_forward_protocol: protocol.into(),
            secondary_forward_address: "10.0.0.5".into(),
            secondary_forward_port: 1080,
            ..Default::default()
        }
    }

    #[test]
    fn inbound_omits_empty_listen_and_forward_fields() {
        let inbound = forwarded(FORWARD_SOCKS);
        let value = inbound.to_xray_value();
        assert!(value.get("listen").is_none());
        assert!(value.get("secondaryForwardEnable").is_none());
        assert_eq!(value["port"], 10443);
        assert_eq!(value["settings"], json!({}));

        let bound = InboundConfig {
            listen: "127.0.0.1".into(),
            ..inbound
        };
        assert_eq!(bound.to_xray_value()["listen"], "127.0.0.1");
    }

    #[test]
    fn socks_forward_adds_outbound_and_rule() {
        let config = XrayConfig {
            outbounds: Some(json!([{"protocol": "freedom", "tag": "direct"}])),
            routing: Some(json!({"domainStrategy": "AsIs", "rules": [{"type": "field", "outboundTag": "blocked", "ip": ["geoip:private"]}]})),
            inbounds: vec![forwarded(FORWARD_SOCKS)],
            ..Default::default()
        };

        let built = config.build();
        let outbounds = built["outbounds"].as_array().unwrap();
        assert_eq!(outbounds.len(), 2);
        assert_eq!(outbounds[0]["tag"], "direct");
        assert_eq!(outbounds[1]["tag"], "socks-forward-10443");
        assert_eq!(outbounds[1]["protocol"], "socks");
        assert_eq!(outbounds[1]["settings"]["servers"][0]["address"], "10.0.0.5");
        assert!(outbounds[1]["settings"]["servers"][0].get("users").is_none());

        let rules = built["routing"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1]["inboundTag"], json!(["inbound-10443"]));
        assert_eq!(rules[1]["outboundTag"], "socks-forward-10443");
        assert_eq!(built["routing"]["domainStrategy"], "AsIs");
    }

    #[test]
    fn credentials_are_attached_only_as_a_pair() {
        let mut inbound = forwarded(FORWARD_HTTP);
        inbound.secondary_forward_username = "alice".into();
        assert!(inbound.forward_outbound().unwrap()["settings"]["servers"][0].get("users").is_none());

        inbound.secondary_forward_password = "s3cret".into();
        let outbound = inbound.forward_outbound().unwrap();
        assert_eq!(
            outbound["settings"]["servers"][0]["users"],
            json!([{"user": "alice", "pass": "s3cret"}])
        );
    }

    #[test]
    fn https_forward_dials_http_over_tls() {
        let outbound = forwarded(FORWARD_HTTPS).forward_outbound().unwrap();
        assert_eq!(outbound["protocol"], "http");
        assert_eq!(outbound["tag"], "https-forward-10443");
        assert_eq!(outbound["streamSettings"]["security"], "tls");
    }

    #[test]
    fn inactive_or_unknown_forward_is_ignored() {
        let mut disabled = forwarded(FORWARD_SOCKS);
        disabled.secondary_forward_enable = false;
        let none = forwarded(FORWARD_NONE);
        let unknown = forwarded("trojan");

        let config = XrayConfig {
            inbounds: vec![disabled, none, unknown],
            ..Default::default()
        };
        let built = config.build();
        assert_eq!(built["inbounds"].as_array().unwrap().len(), 3);
        assert!(built.get("outbounds").is_none());
        assert!(built.get("routing").is_none());
    }

    #[test]
    fn template_without_routing_gets_rules_section() {
        let mut config = XrayConfig::from_template(
            r#"{"log": {"loglevel": "warning"}, "outbounds": [{"protocol": "freedom"}], "fakeDns": [{"ipPool": "198.18.0.0/15"}]}"#,
        )
        .unwrap();
        config.inbounds.push(forwarded(FORWARD_SOCKS));

        let built = config.build();
        assert_eq!(built["log"]["loglevel"], "warning");
        assert_eq!(built["fakeDns"][0]["ipPool"], "198.18.0.0/15");
        assert_eq!(built["routing"]["rules"].as_array().unwrap().len(), 1);
        assert!(built.get("dns").is_none());
    }

    #[test]
    fn template_equality_tracks_inbound_changes() {
        let template = r#"{"log": {}, "inbounds": [{"port": 62789, "listen": "127.0.0.1", "protocol": "dokodemo-door", "tag": "api"}]}"#;
        let a = XrayConfig::from_template(template).unwrap();
        let mut b = XrayConfig::from_template(template).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.inbounds[0].tag, "api");

        b.inbounds.push(forwarded(FORWARD_SOCKS));
        assert_ne!(a, b);
    }
}
