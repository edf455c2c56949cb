//! The FilterDNS daemon: lifecycle, control socket and crash recovery.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use filterdns_config::{Config, ConfigStore, SecretStore, validate_config};
use filterdns_core::defaults;
use filterdns_dns::DnsProxy;
use filterdns_system::DnsMutator;

use crate::error::DaemonError;
use crate::protocol::{Request, Response, StatusInfo};

/// Address the system resolver is pointed at while filtering is enabled.
const LOOPBACK_DNS: &str = "127.0.0.1";

/// Daemon construction options.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Control socket path; the well-known default outside tests.
    pub socket_path: PathBuf,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(defaults::SOCKET_PATH),
        }
    }
}

struct DaemonState {
    config: Config,
    proxy: Option<DnsProxy>,
    running: bool,
}

/// The background service.
///
/// Owns the proxy, the system DNS mutator and the persisted configuration;
/// control clients observe and mutate state only through the socket. A
/// single mutex serializes every state transition.
pub struct Daemon {
    state: Mutex<DaemonState>,
    store: ConfigStore,
    mutator: DnsMutator,
    secrets: Arc<dyn SecretStore>,
    socket_path: PathBuf,
}

impl Daemon {
    pub fn new(
        store: ConfigStore,
        mutator: DnsMutator,
        secrets: Arc<dyn SecretStore>,
        options: DaemonOptions,
    ) -> Self {
        let config = store.load().unwrap_or_else(|e| {
            warn!(error = %e, "config load failed, starting with defaults");
            Config::default()
        });

        Self {
            state: Mutex::new(DaemonState {
                config,
                proxy: None,
                running: false,
            }),
            store,
            mutator,
            secrets,
            socket_path: options.socket_path,
        }
    }

    /// Run until `shutdown` fires: crash recovery, socket bind, optional
    /// auto-enable, then the accept loop. Shutdown performs a graceful
    /// disable so the host's DNS is restored.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), DaemonError> {
        info!("starting filterdns daemon");

        self.recover_from_crash().await;

        // A stale socket file from a dead process would make the bind fail.
        match fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(path = %self.socket_path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "could not remove stale socket"),
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        // Unprivileged CLI and tray clients must be able to connect.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                fs::set_permissions(&self.socket_path, fs::Permissions::from_mode(0o666))
            {
                warn!(error = %e, "could not chmod control socket");
            }
        }
        info!(path = %self.socket_path.display(), "control socket listening");

        self.auto_enable().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    let stream = match result {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let daemon = self.clone();
                    tokio::spawn(async move {
                        daemon.handle_connection(stream).await;
                    });
                }
            }
        }

        if let Err(e) = self.disable().await {
            warn!(error = %e, "graceful disable failed during shutdown");
        }
        drop(listener);
        let _ = fs::remove_file(&self.socket_path);
        info!("daemon stopped");
        Ok(())
    }

    /// A present backup means a previous process died while DNS was
    /// diverted; restore before serving. A corrupt backup is logged and
    /// left in place.
    async fn recover_from_crash(&self) {
        match self.mutator.backup_store().load() {
            Ok(None) => {}
            Ok(Some(_)) => {
                info!("orphaned dns backup found, restoring previous settings");
                match self.mutator.reset_dns().await {
                    Ok(()) => info!("recovered from previous crash, dns restored"),
                    Err(e) => warn!(error = %e, "crash recovery failed"),
                }
            }
            Err(e) => {
                warn!(error = %e, "dns backup unreadable, leaving it in place");
            }
        }
    }

    /// Re-enable filtering when the persisted config says it was on.
    async fn auto_enable(&self) {
        let wants_enable = {
            let state = self.state.lock().await;
            state.config.enabled && !state.config.profile.is_empty()
        };
        if !wants_enable {
            return;
        }

        info!("auto-enabling dns filtering (was enabled)");
        if let Err(e) = self.enable().await {
            warn!(error = %e, "auto-enable failed");
        }
    }

    async fn handle_connection(&self, stream: UnixStream) {
        let deadline = Duration::from_secs(defaults::SOCKET_DEADLINE_SECS);
        match timeout(deadline, self.serve_connection(stream)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "connection error"),
            Err(_) => debug!("connection deadline exceeded"),
        }
    }

    async fn serve_connection(&self, mut stream: UnixStream) -> std::io::Result<()> {
        let response = match read_request(&mut stream).await {
            Ok(request) => {
                debug!(action = %request.action, "control request");
                self.dispatch(request).await
            }
            Err(e) => Response::failure(DaemonError::Protocol(e).to_string()),
        };

        let payload = serde_json::to_vec(&response).unwrap_or_else(|_| {
            br#"{"success":false,"error":"internal encoding error"}"#.to_vec()
        });
        stream.write_all(&payload).await?;
        stream.shutdown().await
    }

    async fn dispatch(&self, request: Request) -> Response {
        match request.action.as_str() {
            "ping" => Response::ok(),
            "status" => Response::with_status(self.status().await),
            "get_config" => Response::with_config(self.config().await),
            "set_config" => match request.config {
                Some(config) => match self.set_config(config).await {
                    Ok(config) => Response::with_config(config),
                    Err(e) => Response::failure(e.to_string()),
                },
                None => Response::failure("no config provided"),
            },
            "enable" => match self.enable().await {
                Ok(status) => Response::with_status(status),
                Err(e) => Response::failure(e.to_string()),
            },
            "disable" => match self.disable().await {
                Ok(status) => Response::with_status(status),
                Err(e) => Response::failure(e.to_string()),
            },
            _ => Response::failure("unknown action"),
        }
    }

    /// Start the proxy and divert system DNS to it.
    pub async fn enable(&self) -> Result<StatusInfo, DaemonError> {
        let mut state = self.state.lock().await;

        if state.running {
            return Ok(status_of(&state));
        }
        if state.config.profile.is_empty() {
            return Err(DaemonError::NoProfileConfigured);
        }

        info!(profile = %state.config.profile, "enabling dns filtering");

        let proxy = DnsProxy::start(&state.config, self.secrets.clone()).await?;

        if let Err(e) = self.mutator.set_dns(LOOPBACK_DNS).await {
            proxy.stop().await;
            // Roll back a partial mutation so the host is not left
            // half-configured; on a further failure the backup stays for
            // the next disable or the startup guard.
            if let Err(reset_err) = self.mutator.reset_dns().await {
                warn!(error = %reset_err, "rollback after failed enable also failed");
            }
            return Err(e.into());
        }

        state.proxy = Some(proxy);
        state.running = true;
        state.config.enabled = true;
        if let Err(e) = self.store.save(&mut state.config) {
            warn!(error = %e, "could not persist enabled state");
        }

        info!("dns filtering enabled");
        Ok(status_of(&state))
    }

    /// Stop the proxy and restore the original system DNS.
    pub async fn disable(&self) -> Result<StatusInfo, DaemonError> {
        let mut state = self.state.lock().await;

        if !state.running {
            return Ok(status_of(&state));
        }

        info!("disabling dns filtering");

        if let Some(proxy) = state.proxy.take() {
            proxy.stop().await;
        }
        state.running = false;
        state.config.enabled = false;
        if let Err(e) = self.store.save(&mut state.config) {
            warn!(error = %e, "could not persist disabled state");
        }

        // Surface a restore failure; the backup stays on disk so a retry or
        // the next startup can finish the rollback.
        self.mutator.reset_dns().await?;

        info!("dns filtering disabled");
        Ok(status_of(&state))
    }

    /// Validate, persist and apply a new configuration.
    pub async fn set_config(&self, config: Config) -> Result<Config, DaemonError> {
        validate_config(&config)?;

        let mut state = self.state.lock().await;

        let upstream_changed = state.config.profile != config.profile
            || state.config.server_url != config.server_url;

        state.config = config;
        self.store.save(&mut state.config)?;

        if let Some(proxy) = &state.proxy {
            if upstream_changed {
                info!("profile or upstream changed, restarting proxy upstream");
                proxy.update_config(&state.config).await?;
            } else {
                proxy.update_forwarders(&state.config.forwarders);
            }
        }

        Ok(state.config.clone())
    }

    /// Current status snapshot.
    pub async fn status(&self) -> StatusInfo {
        let state = self.state.lock().await;
        status_of(&state)
    }

    /// Current configuration snapshot.
    pub async fn config(&self) -> Config {
        let state = self.state.lock().await;
        state.config.clone()
    }
}

fn status_of(state: &DaemonState) -> StatusInfo {
    let (queries_total, queries_blocked) = state
        .proxy
        .as_ref()
        .map(|proxy| proxy.stats())
        .unwrap_or((0, 0));

    StatusInfo {
        running: state.running,
        profile: state.config.profile.clone(),
        server_url: state.config.server_url.clone(),
        queries_total,
        queries_blocked,
    }
}

/// Read one JSON request document, parsing incrementally as bytes arrive.
async fn read_request(stream: &mut UnixStream) -> Result<Request, String> {
    let mut buf: Vec<u8> = Vec::with_capacity(512);
    let mut chunk = [0u8; 4096];

    loop {
        match serde_json::from_slice::<Request>(&buf) {
            Ok(request) => return Ok(request),
            // An EOF error means the document is a valid prefix; anything
            // else is garbage that more bytes cannot repair.
            Err(e) if e.is_eof() => {}
            Err(e) => return Err(format!("invalid request: {e}")),
        }
        if buf.len() > defaults::MAX_CONTROL_REQUEST_BYTES {
            return Err("request too large".to_string());
        }

        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| format!("read: {e}"))?;
        if n == 0 {
            return Err("connection closed before a complete request".to_string());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
