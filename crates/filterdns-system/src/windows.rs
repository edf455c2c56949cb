//! Windows DNS mutation via `netsh`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::{info, warn};

use crate::backup::{BackupStore, DnsBackup, WindowsBackup};
use crate::error::SystemError;
use crate::process::{run_tool, run_tool_best_effort};

const PLATFORM: &str = "windows";

pub(crate) async fn set_dns(store: &BackupStore, server: &str) -> Result<(), SystemError> {
    let interfaces = connected_interfaces().await?;

    let mut backup = WindowsBackup {
        interfaces: BTreeMap::new(),
    };
    for &index in &interfaces {
        let current = dns_for_interface(index).await.unwrap_or_default();
        if !current.is_empty() {
            backup.interfaces.insert(index, current);
        }
    }
    store.save(&DnsBackup::windows(backup))?;

    for &index in &interfaces {
        let name = format!("name={index}");
        let address = format!("address={server}");
        run_tool(
            PLATFORM,
            "netsh",
            &[
                "interface",
                "ipv4",
                "set",
                "dnsservers",
                &name,
                "source=static",
                &address,
                "validate=no",
            ],
        )
        .await?;
    }

    run_tool_best_effort(PLATFORM, "ipconfig", &["/flushdns"]).await;
    info!(interfaces = interfaces.len(), server, "dns set via netsh");
    Ok(())
}

pub(crate) async fn reset_dns(store: &BackupStore) -> Result<(), SystemError> {
    let backup = store.load()?;
    let saved = backup
        .and_then(|b| b.windows)
        .map(|w| w.interfaces)
        .unwrap_or_default();

    let interfaces = connected_interfaces().await?;

    // Interfaces recorded in the backup that have since vanished are
    // skipped; the rest of the restore proceeds.
    for (&index, servers) in &saved {
        if !interfaces.contains(&index) {
            warn!(index, "backed-up interface no longer exists, skipping");
            continue;
        }
        restore_interface(index, servers).await;
    }

    for &index in &interfaces {
        if !saved.contains_key(&index) {
            let name = format!("name={index}");
            run_tool_best_effort(
                PLATFORM,
                "netsh",
                &["interface", "ipv4", "set", "dnsservers", &name, "source=dhcp"],
            )
            .await;
        }
    }

    store.clear()?;
    run_tool_best_effort(PLATFORM, "ipconfig", &["/flushdns"]).await;
    info!(interfaces = interfaces.len(), "dns restored via netsh");
    Ok(())
}

pub(crate) async fn current_dns() -> Result<Vec<String>, SystemError> {
    let interfaces = connected_interfaces().await?;

    let mut seen = Vec::new();
    for &index in &interfaces {
        match dns_for_interface(index).await {
            Ok(servers) => {
                for server in servers {
                    if !seen.contains(&server) {
                        seen.push(server);
                    }
                }
            }
            Err(e) => warn!(index, error = %e, "dns query failed"),
        }
    }
    Ok(seen)
}

/// Set an interface's primary server, then append the remainder.
async fn restore_interface(index: u32, servers: &[String]) {
    let Some((primary, rest)) = servers.split_first() else {
        return;
    };

    let name = format!("name={index}");
    let address = format!("address={primary}");
    run_tool_best_effort(
        PLATFORM,
        "netsh",
        &[
            "interface",
            "ipv4",
            "set",
            "dnsservers",
            &name,
            "source=static",
            &address,
            "validate=no",
        ],
    )
    .await;

    for server in rest {
        let address = format!("address={server}");
        run_tool_best_effort(
            PLATFORM,
            "netsh",
            &[
                "interface",
                "ipv4",
                "add",
                "dnsservers",
                &name,
                &address,
                "validate=no",
            ],
        )
        .await;
    }
}

async fn connected_interfaces() -> Result<Vec<u32>, SystemError> {
    let output = run_tool(PLATFORM, "netsh", &["interface", "ipv4", "show", "interfaces"]).await?;
    Ok(parse_interfaces(&output))
}

async fn dns_for_interface(index: u32) -> Result<Vec<String>, SystemError> {
    let name = format!("name={index}");
    let output = run_tool(
        PLATFORM,
        "netsh",
        &["interface", "ipv4", "show", "dnsservers", &name],
    )
    .await?;
    Ok(parse_dns_servers(&output))
}

/// Indices of rows whose state column reads `connected`.
fn parse_interfaces(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[3] != "connected" {
                return None;
            }
            fields[0].parse().ok()
        })
        .collect()
}

/// IPv4 addresses appearing in `show dnsservers` output, first-seen order.
fn parse_dns_servers(output: &str) -> Vec<String> {
    let mut servers = Vec::new();
    for token in output.split_whitespace() {
        if token.parse::<Ipv4Addr>().is_ok() && !servers.contains(&token.to_string()) {
            servers.push(token.to_string());
        }
    }
    servers
}
