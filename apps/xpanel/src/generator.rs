use anyhow::{Context, Result};
use tracing::{error, warn};
use xpanel_db::models::inbound::Inbound;
use xpanel_shared::xray::{InboundConfig, XrayConfig};

pub const DEFAULT_TEMPLATE: &str = include_str!("default_template.json");

pub struct ConfigGenerator;

impl ConfigGenerator {
    /// Builds the Xray configuration from a template and the stored inbounds.
    /// An empty template falls back to the bundled default.
    pub fn generate_config(template: &str, inbounds: &[Inbound]) -> Result<XrayConfig> {
        let template = if template.trim().is_empty() { DEFAULT_TEMPLATE } else { template };
        let mut config = XrayConfig::from_template(template)
            .context("Failed to parse Xray template config")?;
        if matches!(&config.outbounds, Some(v) if !v.is_array()) {
            warn!("Template outbounds is not an array and will be dropped");
        }

        config.inbounds.extend(Self::runtime_inbounds(inbounds));
        Ok(config)
    }

    /// Enabled inbounds that can be handed to Xray. Broken records are logged
    /// and left out.
    pub fn runtime_inbounds(inbounds: &[Inbound]) -> Vec<InboundConfig> {
        let mut generated = Vec::with_capacity(inbounds.len());

        for inbound in inbounds {
            if !inbound.enable {
                continue;
            }

            let check = inbound.validate_secondary_forward();
            if !check.valid {
                warn!("Skipping inbound {}: {}", inbound.tag, check.message);
                continue;
            }

            match inbound.to_inbound() {
                Ok(config) => {
                    if config.has_secondary_forward() && config.forward_outbound().is_none() {
                        warn!(
                            "Inbound {} forwards via unsupported protocol {:?}, no outbound emitted",
                            inbound.tag, inbound.secondary_forward_protocol
                        );
                    }
                    generated.push(config)
                }
                Err(e) => error!("Skipping inbound {}: {}", inbound.tag, e),
            }
        }

        generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inbound(port: i32, protocol: &str) -> Inbound {
        let mut inbound = Inbound {
            port,
            protocol: protocol.to_string(),
            settings: r#"{"clients": []}"#.to_string(),
            ..Default::default()
        };
        inbound.assign_tag();
        inbound
    }

    #[test]
    fn default_template_parses() {
        let config = ConfigGenerator::generate_config("", &[]).unwrap();
        assert_eq!(config.inbounds.len(), 1);
        assert_eq!(config.inbounds[0].tag, "api");
        assert!(config.stats.is_some());
    }

    #[test]
    fn disabled_and_broken_inbounds_are_skipped() {
        let mut disabled = inbound(1001, "vmess");
        disabled.enable = false;

        let mut malformed = inbound(1002, "vless");
        malformed.sniffing = "{oops".to_string();

        let mut bad_forward = inbound(1003, "trojan");
        bad_forward.secondary_forward_enable = true;
        bad_forward.secondary_forward_protocol = "socks".to_string();

        let good = inbound(1004, "shadowsocks");

        let configs = ConfigGenerator::runtime_inbounds(&[disabled, malformed, bad_forward, good]);
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].tag, "inbound-1004");
    }

    #[test]
    fn forwarded_inbound_reaches_the_final_document() {
        let mut forwarded = inbound(2001, "vless");
        forwarded.secondary_forward_enable = true;
        forwarded.secondary_forward_protocol = "http".to_string();
        forwarded.secondary_forward_address = "proxy.internal".to_string();
        forwarded.secondary_forward_port = 3128;

        let config = ConfigGenerator::generate_config("", &[forwarded]).unwrap();
        let built = config.build();

        let inbounds = built["inbounds"].as_array().unwrap();
        assert_eq!(inbounds.len(), 2);
        assert_eq!(inbounds[1]["settings"], json!({"clients": []}));

        let outbounds = built["outbounds"].as_array().unwrap();
        assert_eq!(outbounds.last().unwrap()["tag"], "http-forward-2001");

        let rules = built["routing"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[3]["inboundTag"], json!(["inbound-2001"]));
    }

    #[test]
    fn unsupported_forward_protocol_keeps_inbound_without_outbound() {
        let mut forwarded = inbound(2002, "vless");
        forwarded.secondary_forward_enable = true;
        forwarded.secondary_forward_protocol = "trojan".to_string();
        forwarded.secondary_forward_address = "proxy.internal".to_string();
        forwarded.secondary_forward_port = 443;

        let configs = ConfigGenerator::runtime_inbounds(std::slice::from_ref(&forwarded));
        assert_eq!(configs.len(), 1);
        assert!(configs[0].forward_outbound().is_none());

        let built = ConfigGenerator::generate_config("", &[forwarded]).unwrap().build();
        let outbounds = built["outbounds"].as_array().unwrap();
        assert!(outbounds.iter().all(|o| o["tag"] != "trojan-forward-2002"));
    }

    #[test]
    fn non_array_template_outbounds_are_dropped() {
        let config =
            ConfigGenerator::generate_config(r#"{"outbounds": {"protocol": "freedom"}}"#, &[]).unwrap();
        assert!(config.build().get("outbounds").is_none());
    }

    #[test]
    fn custom_template_must_be_json() {
        assert!(ConfigGenerator::generate_config("not json", &[]).is_err());

        let config = ConfigGenerator::generate_config(r#"{"log": {"loglevel": "debug"}}"#, &[]).unwrap();
        assert!(config.inbounds.is_empty());
        assert_eq!(config.build()["log"]["loglevel"], "debug");
    }
}
