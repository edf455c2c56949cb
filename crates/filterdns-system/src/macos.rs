//! macOS DNS mutation via `networksetup`.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::backup::{BackupStore, DarwinBackup, DnsBackup};
use crate::error::SystemError;
use crate::process::{run_tool, run_tool_best_effort};

const PLATFORM: &str = "macos";

pub(crate) async fn set_dns(store: &BackupStore, server: &str) -> Result<(), SystemError> {
    let services = list_network_services().await?;

    let mut backup = DarwinBackup {
        services: BTreeMap::new(),
    };
    for service in &services {
        let current = dns_for_service(service).await.unwrap_or_default();
        if !current.is_empty() {
            backup.services.insert(service.clone(), current);
        }
    }
    store.save(&DnsBackup::darwin(backup))?;

    for service in &services {
        run_tool(PLATFORM, "networksetup", &["-setdnsservers", service, server]).await?;
    }

    flush_dns_cache().await;
    info!(services = services.len(), server, "dns set via networksetup");
    Ok(())
}

pub(crate) async fn reset_dns(store: &BackupStore) -> Result<(), SystemError> {
    let backup = store.load()?;
    let saved = backup.and_then(|b| b.darwin).map(|d| d.services);

    let services = list_network_services().await?;
    for service in &services {
        // Services we never captured go back to DHCP ("empty").
        let mut args: Vec<&str> = vec!["-setdnsservers", service];
        let original = saved.as_ref().and_then(|map| map.get(service));
        match original {
            Some(servers) if !servers.is_empty() => {
                args.extend(servers.iter().map(String::as_str));
            }
            _ => args.push("empty"),
        }
        run_tool_best_effort(PLATFORM, "networksetup", &args).await;
    }

    store.clear()?;
    flush_dns_cache().await;
    info!(services = services.len(), "dns restored via networksetup");
    Ok(())
}

pub(crate) async fn current_dns() -> Result<Vec<String>, SystemError> {
    let services = list_network_services().await?;

    let mut seen = Vec::new();
    for service in &services {
        match dns_for_service(service).await {
            Ok(servers) => {
                for server in servers {
                    if !seen.contains(&server) {
                        seen.push(server);
                    }
                }
            }
            Err(e) => warn!(service = %service, error = %e, "dns query failed"),
        }
    }
    Ok(seen)
}

async fn list_network_services() -> Result<Vec<String>, SystemError> {
    let output = run_tool(PLATFORM, "networksetup", &["-listallnetworkservices"]).await?;
    Ok(parse_service_list(&output))
}

async fn dns_for_service(service: &str) -> Result<Vec<String>, SystemError> {
    let output = run_tool(PLATFORM, "networksetup", &["-getdnsservers", service]).await?;
    Ok(parse_dns_servers(&output))
}

async fn flush_dns_cache() {
    run_tool_best_effort(PLATFORM, "dscacheutil", &["-flushcache"]).await;
    run_tool_best_effort(PLATFORM, "killall", &["-HUP", "mDNSResponder"]).await;
}

/// Active services: skip the disclaimer line and `*`-prefixed (disabled)
/// entries.
fn parse_service_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*') && !line.contains("denotes"))
        .map(str::to_string)
        .collect()
}

/// `-getdnsservers` output: one server per line, or a sentence when none
/// are configured.
fn parse_dns_servers(output: &str) -> Vec<String> {
    if output.contains("There aren't any DNS Servers") {
        return Vec::new();
    }
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_list_skips_disclaimer_and_disabled() {
        let output = "An asterisk (*) denotes that a network service is disabled.\n\
                      Wi-Fi\n\
                      *Thunderbolt Bridge\n\
                      Ethernet\n";
        assert_eq!(
            parse_service_list(output),
            vec!["Wi-Fi".to_string(), "Ethernet".to_string()]
        );
    }

    #[test]
    fn dns_servers_parse_one_per_line() {
        assert_eq!(
            parse_dns_servers("192.168.1.1\n8.8.8.8\n"),
            vec!["192.168.1.1".to_string(), "8.8.8.8".to_string()]
        );
    }

    #[test]
    fn unconfigured_service_has_no_servers() {
        let output = "There aren't any DNS Servers set on Wi-Fi.\n";
        assert!(parse_dns_servers(output).is_empty());
    }
}
