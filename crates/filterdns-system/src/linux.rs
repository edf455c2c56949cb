//! Linux DNS mutation.
//!
//! Three management systems are supported, detected in a fixed order:
//! systemd-resolved, then NetworkManager, then direct `/etc/resolv.conf`.
//! Restore dispatches on the system recorded in the backup so a fresh
//! process rolls back exactly what a previous one diverted.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::backup::{BackupStore, DnsBackup, LinuxBackup, LinuxDnsSystem};
use crate::error::SystemError;
use crate::process::{on_path, run_tool, run_tool_best_effort};

const PLATFORM: &str = "linux";

/// Paths touched by the resolvconf fallback; overridable for tests.
#[derive(Debug, Clone)]
pub struct ResolvConfPaths {
    pub resolv_conf: PathBuf,
    pub backup_copy: PathBuf,
}

impl Default for ResolvConfPaths {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            backup_copy: PathBuf::from("/etc/resolv.conf.filterdns.bak"),
        }
    }
}

pub(crate) async fn set_dns(
    store: &BackupStore,
    paths: &ResolvConfPaths,
    server: &str,
) -> Result<(), SystemError> {
    if is_systemd_resolved(paths) {
        set_systemd_resolved(store, server).await
    } else if is_network_manager().await {
        set_network_manager(store, server).await
    } else {
        set_resolv_conf(store, paths, server)
    }
}

pub(crate) async fn reset_dns(
    store: &BackupStore,
    paths: &ResolvConfPaths,
) -> Result<(), SystemError> {
    let Some(backup) = store.load()? else {
        debug!("no dns backup, nothing to restore");
        return Ok(());
    };

    let system = backup.linux.as_ref().map(|linux| linux.system);
    match system {
        Some(LinuxDnsSystem::SystemdResolved) => reset_systemd_resolved(store, &backup).await,
        Some(LinuxDnsSystem::NetworkManager) => reset_network_manager(store, &backup).await,
        Some(LinuxDnsSystem::ResolvConf) => reset_resolv_conf(store, paths),
        None => {
            // Backup written by another platform's build; nothing we can
            // apply here beyond dropping it.
            warn!("backup carries no linux payload, clearing");
            store.clear()
        }
    }
}

pub(crate) fn current_dns(paths: &ResolvConfPaths) -> Result<Vec<String>, SystemError> {
    let content = fs::read_to_string(&paths.resolv_conf)?;
    Ok(parse_nameservers(&content))
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// systemd-resolved owns `/etc/resolv.conf` when it is a symlink into the
/// resolved stub directory.
fn is_systemd_resolved(paths: &ResolvConfPaths) -> bool {
    match fs::read_link(&paths.resolv_conf) {
        Ok(target) => {
            let target = target.to_string_lossy().to_string();
            target.contains("systemd") || target.contains("resolved")
        }
        Err(_) => false,
    }
}

async fn is_network_manager() -> bool {
    if !on_path("nmcli") {
        return false;
    }
    match run_tool(PLATFORM, "systemctl", &["is-active", "NetworkManager"]).await {
        Ok(output) => output.trim() == "active",
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// systemd-resolved
// ---------------------------------------------------------------------------

async fn set_systemd_resolved(store: &BackupStore, server: &str) -> Result<(), SystemError> {
    let interface = default_interface()?;

    store.save(&DnsBackup::linux(LinuxBackup::systemd_resolved(
        interface.clone(),
    )))?;

    run_tool(PLATFORM, "resolvectl", &["dns", &interface, server]).await?;
    // Older resolvectl builds lack default-route.
    run_tool_best_effort(PLATFORM, "resolvectl", &["default-route", &interface, "true"]).await;

    info!(interface = %interface, server, "dns set via systemd-resolved");
    Ok(())
}

async fn reset_systemd_resolved(store: &BackupStore, backup: &DnsBackup) -> Result<(), SystemError> {
    let interface = match backup.linux.as_ref() {
        Some(linux) if !linux.interface.is_empty() => linux.interface.clone(),
        _ => default_interface()?,
    };

    run_tool(PLATFORM, "resolvectl", &["revert", &interface]).await?;
    store.clear()?;

    info!(interface = %interface, "dns restored via systemd-resolved");
    Ok(())
}

/// Default-route interface from the kernel routing table, with a fallback
/// over common interface names.
fn default_interface() -> Result<String, SystemError> {
    if let Ok(content) = fs::read_to_string("/proc/net/route")
        && let Some(interface) = parse_default_interface(&content)
    {
        return Ok(interface);
    }

    for name in ["eth0", "wlan0", "enp0s3", "ens33"] {
        if PathBuf::from("/sys/class/net").join(name).exists() {
            return Ok(name.to_string());
        }
    }

    Err(SystemError::NoDefaultInterface)
}

/// Interface of the route whose destination is 00000000.
fn parse_default_interface(route_table: &str) -> Option<String> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[1] == "00000000" {
            Some(fields[0].to_string())
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// NetworkManager
// ---------------------------------------------------------------------------

async fn set_network_manager(store: &BackupStore, server: &str) -> Result<(), SystemError> {
    let output = run_tool(
        PLATFORM,
        "nmcli",
        &["-t", "-f", "NAME,DEVICE,STATE", "connection", "show", "--active"],
    )
    .await?;
    let connection =
        parse_first_connection(&output).ok_or(SystemError::NoActiveConnection)?;

    let (original_dns, ignore_auto) = query_nm_dns(&connection).await;

    store.save(&DnsBackup::linux(LinuxBackup::network_manager(
        connection.clone(),
        original_dns,
        ignore_auto,
    )))?;

    run_tool(
        PLATFORM,
        "nmcli",
        &[
            "connection",
            "modify",
            &connection,
            "ipv4.dns",
            server,
            "ipv4.ignore-auto-dns",
            "yes",
        ],
    )
    .await?;
    run_tool(PLATFORM, "nmcli", &["connection", "up", &connection]).await?;

    info!(connection = %connection, server, "dns set via NetworkManager");
    Ok(())
}

async fn reset_network_manager(store: &BackupStore, backup: &DnsBackup) -> Result<(), SystemError> {
    let linux = backup.linux.as_ref();

    let connection = match linux.filter(|l| !l.connection_name.is_empty()) {
        Some(l) => l.connection_name.clone(),
        None => {
            // Nothing recorded; pick the live connection if there is one.
            let Ok(output) = run_tool(
                PLATFORM,
                "nmcli",
                &["-t", "-f", "NAME", "connection", "show", "--active"],
            )
            .await
            else {
                return store.clear();
            };
            match parse_first_connection(&output) {
                Some(connection) => connection,
                None => return store.clear(),
            }
        }
    };

    let original_dns = linux.map(|l| l.original_dns.clone()).unwrap_or_default();
    let ignore_auto = linux.map(|l| l.ignore_auto_dns).unwrap_or(false);

    // An empty value hands DNS selection back to DHCP.
    let dns_value = original_dns.join(",");
    let ignore_value = if !original_dns.is_empty() && ignore_auto {
        "yes"
    } else {
        "no"
    };

    run_tool(
        PLATFORM,
        "nmcli",
        &[
            "connection",
            "modify",
            &connection,
            "ipv4.dns",
            &dns_value,
            "ipv4.ignore-auto-dns",
            ignore_value,
        ],
    )
    .await?;
    run_tool_best_effort(PLATFORM, "nmcli", &["connection", "up", &connection]).await;

    store.clear()?;
    info!(connection = %connection, "dns restored via NetworkManager");
    Ok(())
}

/// Current `ipv4.dns` list and `ipv4.ignore-auto-dns` flag for a connection.
async fn query_nm_dns(connection: &str) -> (Vec<String>, bool) {
    let dns = match run_tool(
        PLATFORM,
        "nmcli",
        &["-t", "-f", "ipv4.dns", "connection", "show", connection],
    )
    .await
    {
        Ok(output) => parse_nm_dns_list(&output),
        Err(_) => Vec::new(),
    };

    let ignore_auto = match run_tool(
        PLATFORM,
        "nmcli",
        &["-t", "-f", "ipv4.ignore-auto-dns", "connection", "show", connection],
    )
    .await
    {
        Ok(output) => output.contains("yes"),
        Err(_) => false,
    };

    (dns, ignore_auto)
}

/// First `NAME` field of terse `nmcli connection show --active` output.
fn parse_first_connection(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split(':').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Parse terse `ipv4.dns:` output; `--` and empty mean "none".
fn parse_nm_dns_list(output: &str) -> Vec<String> {
    let line = output.trim();
    let Some(value) = line.strip_prefix("ipv4.dns:") else {
        return Vec::new();
    };
    if value.is_empty() || value == "--" {
        return Vec::new();
    }
    value.split(',').map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// resolv.conf fallback
// ---------------------------------------------------------------------------

fn set_resolv_conf(
    store: &BackupStore,
    paths: &ResolvConfPaths,
    server: &str,
) -> Result<(), SystemError> {
    // Keep the first pre-change copy; a repeated set must not clobber it.
    if !paths.backup_copy.exists() {
        let original = fs::read(&paths.resolv_conf)?;
        fs::write(&paths.backup_copy, original)?;
    }

    store.save(&DnsBackup::linux(LinuxBackup::resolv_conf()))?;

    let content = format!("# Generated by FilterDNS Client\nnameserver {server}\n");
    fs::write(&paths.resolv_conf, content)?;

    info!(path = %paths.resolv_conf.display(), server, "dns set via resolv.conf");
    Ok(())
}

fn reset_resolv_conf(store: &BackupStore, paths: &ResolvConfPaths) -> Result<(), SystemError> {
    if !paths.backup_copy.exists() {
        return store.clear();
    }

    let original = fs::read(&paths.backup_copy)?;
    fs::write(&paths.resolv_conf, original)?;
    fs::remove_file(&paths.backup_copy)?;
    store.clear()?;

    info!(path = %paths.resolv_conf.display(), "dns restored via resolv.conf");
    Ok(())
}

/// `nameserver` entries of a resolv.conf document.
fn parse_nameservers(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            line.trim()
                .strip_prefix("nameserver ")
                .map(|server| server.trim().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths(dir: &std::path::Path) -> ResolvConfPaths {
        ResolvConfPaths {
            resolv_conf: dir.join("resolv.conf"),
            backup_copy: dir.join("resolv.conf.filterdns.bak"),
        }
    }

    #[test]
    fn parses_default_interface_from_route_table() {
        let table = "Iface\tDestination\tGateway\tFlags\n\
                     wlp3s0\t00000000\t0102A8C0\t0003\n\
                     wlp3s0\t0002A8C0\t00000000\t0001\n";
        assert_eq!(parse_default_interface(table).as_deref(), Some("wlp3s0"));
    }

    #[test]
    fn no_default_route_yields_none() {
        let table = "Iface\tDestination\tGateway\tFlags\n\
                     eth0\t0002A8C0\t00000000\t0001\n";
        assert_eq!(parse_default_interface(table), None);
    }

    #[test]
    fn parses_nameservers_ignoring_comments() {
        let content = "# resolv.conf\nnameserver 192.168.1.1\nsearch lan\nnameserver 8.8.8.8\n";
        assert_eq!(
            parse_nameservers(content),
            vec!["192.168.1.1".to_string(), "8.8.8.8".to_string()]
        );
    }

    #[test]
    fn parses_first_active_connection() {
        let output = "Wired connection 1:enp0s31f6:activated\nvpn0:tun0:activated\n";
        assert_eq!(
            parse_first_connection(output).as_deref(),
            Some("Wired connection 1")
        );
        assert_eq!(parse_first_connection(""), None);
    }

    #[test]
    fn parses_nm_dns_values() {
        assert_eq!(
            parse_nm_dns_list("ipv4.dns:1.1.1.1,8.8.8.8\n"),
            vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]
        );
        assert!(parse_nm_dns_list("ipv4.dns:--\n").is_empty());
        assert!(parse_nm_dns_list("ipv4.dns:\n").is_empty());
        assert!(parse_nm_dns_list("garbage\n").is_empty());
    }

    #[test]
    fn resolv_conf_set_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(dir.path());
        let store = BackupStore::with_dir(dir.path());
        fs::write(&paths.resolv_conf, "nameserver 192.168.1.1\n").unwrap();

        set_resolv_conf(&store, &paths, "127.0.0.1").unwrap();
        assert!(store.exists());
        assert!(paths.backup_copy.exists());
        let diverted = fs::read_to_string(&paths.resolv_conf).unwrap();
        assert!(diverted.contains("nameserver 127.0.0.1"));

        // A fresh store on the same directory sees the pending backup;
        // this is the crash-recovery path.
        let fresh = BackupStore::with_dir(dir.path());
        let backup = fresh.load().unwrap().unwrap();
        assert_eq!(
            backup.linux.unwrap().system,
            LinuxDnsSystem::ResolvConf
        );

        reset_resolv_conf(&fresh, &paths).unwrap();
        assert_eq!(
            fs::read_to_string(&paths.resolv_conf).unwrap(),
            "nameserver 192.168.1.1\n"
        );
        assert!(!paths.backup_copy.exists());
        assert!(!fresh.exists());
    }

    #[test]
    fn repeated_set_keeps_first_backup_copy() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(dir.path());
        let store = BackupStore::with_dir(dir.path());
        fs::write(&paths.resolv_conf, "nameserver 192.168.1.1\n").unwrap();

        set_resolv_conf(&store, &paths, "127.0.0.1").unwrap();
        set_resolv_conf(&store, &paths, "127.0.0.1").unwrap();

        assert_eq!(
            fs::read_to_string(&paths.backup_copy).unwrap(),
            "nameserver 192.168.1.1\n"
        );
    }

    #[test]
    fn reset_without_copy_clears_backup() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(dir.path());
        let store = BackupStore::with_dir(dir.path());
        store
            .save(&DnsBackup::linux(LinuxBackup::resolv_conf()))
            .unwrap();

        reset_resolv_conf(&store, &paths).unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn current_dns_reads_resolv_conf() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(dir.path());
        fs::write(&paths.resolv_conf, "nameserver 10.0.0.1\n").unwrap();
        assert_eq!(current_dns(&paths).unwrap(), vec!["10.0.0.1".to_string()]);
    }
}
