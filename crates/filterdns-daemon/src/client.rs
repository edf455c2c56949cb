//! Control-socket client.
//!
//! The interface the external CLI and tray adapters consume: one JSON
//! request per connection, one JSON response back.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;

use filterdns_config::Config;
use filterdns_core::defaults;

use crate::error::DaemonError;
use crate::protocol::{Request, Response, StatusInfo};

/// Client for the daemon's Unix control socket.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Client against the well-known socket path.
    pub fn new() -> Self {
        Self {
            socket_path: PathBuf::from(defaults::SOCKET_PATH),
        }
    }

    /// Client against an explicit socket path.
    pub fn with_path(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<(), DaemonError> {
        self.send(Request::action("ping")).await.map(|_| ())
    }

    /// Whether a daemon is reachable on the socket.
    pub async fn is_running(&self) -> bool {
        self.ping().await.is_ok()
    }

    pub async fn status(&self) -> Result<StatusInfo, DaemonError> {
        let response = self.send(Request::action("status")).await?;
        expect_status(response)
    }

    pub async fn enable(&self) -> Result<StatusInfo, DaemonError> {
        let response = self.send(Request::action("enable")).await?;
        expect_status(response)
    }

    pub async fn disable(&self) -> Result<StatusInfo, DaemonError> {
        let response = self.send(Request::action("disable")).await?;
        expect_status(response)
    }

    pub async fn get_config(&self) -> Result<Config, DaemonError> {
        let response = self.send(Request::action("get_config")).await?;
        expect_config(response)
    }

    pub async fn set_config(&self, config: Config) -> Result<Config, DaemonError> {
        let response = self.send(Request::set_config(config)).await?;
        expect_config(response)
    }

    /// One request/response exchange. A missing or unresponsive socket maps
    /// to `DaemonUnavailable`; a `success: false` reply surfaces the
    /// daemon's error string.
    async fn send(&self, request: Request) -> Result<Response, DaemonError> {
        let connect = Duration::from_secs(defaults::SOCKET_CONNECT_TIMEOUT_SECS);
        let stream = timeout(connect, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| DaemonError::Unavailable("connect timed out".to_string()))?
            .map_err(|e| DaemonError::Unavailable(format!("{e} (is the daemon running?)")))?;

        let deadline = Duration::from_secs(defaults::SOCKET_DEADLINE_SECS);
        let response = timeout(deadline, exchange(stream, &request))
            .await
            .map_err(|_| DaemonError::Unavailable("request timed out".to_string()))??;

        if response.success {
            Ok(response)
        } else {
            Err(DaemonError::Request(
                response
                    .error
                    .unwrap_or_else(|| "unknown daemon error".to_string()),
            ))
        }
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn exchange(mut stream: UnixStream, request: &Request) -> Result<Response, DaemonError> {
    let payload =
        serde_json::to_vec(request).map_err(|e| DaemonError::Protocol(e.to_string()))?;
    stream
        .write_all(&payload)
        .await
        .map_err(|e| DaemonError::Unavailable(format!("send: {e}")))?;
    // Half-close so the daemon sees the document end immediately.
    stream
        .shutdown()
        .await
        .map_err(|e| DaemonError::Unavailable(format!("send: {e}")))?;

    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .await
        .map_err(|e| DaemonError::Unavailable(format!("recv: {e}")))?;

    serde_json::from_slice(&buf).map_err(|e| DaemonError::Protocol(e.to_string()))
}

fn expect_status(response: Response) -> Result<StatusInfo, DaemonError> {
    response
        .status
        .ok_or_else(|| DaemonError::Protocol("response missing status".to_string()))
}

fn expect_config(response: Response) -> Result<Config, DaemonError> {
    response
        .config
        .ok_or_else(|| DaemonError::Protocol("response missing config".to_string()))
}
