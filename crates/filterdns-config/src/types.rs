//! Configuration type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use filterdns_core::defaults;

/// A split-DNS forwarder rule.
///
/// Queries whose name matches `domain` (exactly, or as a dot-separated
/// suffix) are sent to `server` instead of the upstream filtering service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forwarder {
    /// Domain pattern, e.g. `"ts.net"` or `"*.internal"`. Matching is
    /// case-insensitive and ignores a trailing dot; the `*.` prefix is
    /// accepted but carries the same semantics as a bare suffix.
    pub domain: String,
    /// Target resolver: an IP literal or `host:port`. Port 53 is assumed
    /// when omitted.
    pub server: String,
}

/// The client configuration, persisted as `FilterDNS/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// FilterDNS profile name, empty before onboarding.
    #[serde(default)]
    pub profile: String,

    /// Upstream filtering service URL (absolute http/https).
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Whether filtering is currently enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Start the daemon on login (consumed by the autostart installer).
    #[serde(default)]
    pub autostart: bool,

    /// Split-DNS forwarder rules. `null` in the file reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub forwarders: Vec<Forwarder>,

    /// Set on every save; absent in files written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            server_url: default_server_url(),
            enabled: false,
            autostart: false,
            forwarders: Vec::new(),
            last_modified: None,
        }
    }
}

fn default_server_url() -> String {
    defaults::DEFAULT_SERVER_URL.to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Forwarder>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<Vec<Forwarder>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server_url, defaults::DEFAULT_SERVER_URL);
        assert!(!config.enabled);
        assert!(config.forwarders.is_empty());
    }

    #[test]
    fn null_forwarders_read_as_empty() {
        let config: Config =
            serde_json::from_str(r#"{"profile":"home","forwarders":null}"#).unwrap();
        assert!(config.forwarders.is_empty());
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let config = Config {
            profile: "home".into(),
            server_url: "https://filterdns.example.com".into(),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""serverUrl":"https://filterdns.example.com""#));
        assert!(json.contains(r#""profile":"home""#));
        // Unset lastModified stays off the wire entirely.
        assert!(!json.contains("lastModified"));
    }

    #[test]
    fn round_trip_preserves_forwarders() {
        let config = Config {
            forwarders: vec![
                Forwarder {
                    domain: "ts.net".into(),
                    server: "100.100.100.100".into(),
                },
                Forwarder {
                    domain: "*.internal".into(),
                    server: "192.168.1.1:53".into(),
                },
            ],
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.forwarders, config.forwarders);
    }
}
