//! Control-socket wire protocol.
//!
//! One JSON request document in, one JSON response document out, then the
//! connection closes. Actions travel as plain strings so an unknown action
//! gets an ordinary error response instead of a decode failure.

use serde::{Deserialize, Serialize};

use filterdns_config::Config;

/// A command from a control client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub action: String,

    /// Present only for `set_config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
}

impl Request {
    pub fn action(action: &str) -> Self {
        Self {
            action: action.to_string(),
            config: None,
        }
    }

    pub fn set_config(config: Config) -> Self {
        Self {
            action: "set_config".to_string(),
            config: Some(config),
        }
    }
}

/// The daemon's reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_status(status: StatusInfo) -> Self {
        Self {
            success: true,
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            success: true,
            config: Some(config),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Daemon status as reported over the socket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub running: bool,
    pub profile: String,
    pub server_url: String,
    pub queries_total: u64,
    pub queries_blocked: u64,
}
