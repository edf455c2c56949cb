//! Configuration validation.

use url::Url;

use crate::error::ConfigError;
use crate::types::Config;

/// Validate a configuration before persisting or applying it.
///
/// `server_url` must be an absolute http/https URL with a host; forwarder
/// rules must carry a non-empty domain and server.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let url = Url::parse(&config.server_url)
        .map_err(|e| ConfigError::Validation(format!("serverUrl: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigError::Validation(format!(
                "serverUrl: unsupported scheme '{other}'"
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::Validation("serverUrl: missing host".into()));
    }

    for fwd in &config.forwarders {
        if fwd.domain.trim().is_empty() {
            return Err(ConfigError::Validation("forwarder domain is empty".into()));
        }
        if fwd.server.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "forwarder for '{}' has no server",
                fwd.domain
            )));
        }
    }

    Ok(())
}
