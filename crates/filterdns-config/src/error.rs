//! Configuration errors.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no user config directory available")]
    NoConfigDir,

    #[error("validation: {0}")]
    Validation(String),

    #[error("keychain: {0}")]
    Keychain(String),
}
