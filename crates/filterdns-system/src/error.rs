//! System DNS mutation errors.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// An OS resolver tool exited non-zero or produced unusable output.
    #[error("resolver mutation failed on {platform}: {detail}")]
    MutationFailed {
        platform: &'static str,
        detail: String,
    },

    #[error("backup io: {0}")]
    BackupIo(String),

    /// The backup file exists but cannot be parsed. It is left on disk.
    #[error("backup file corrupt: {}", path.display())]
    BackupCorrupt { path: PathBuf },

    #[error("no default network interface found")]
    NoDefaultInterface,

    #[error("no active network connection")]
    NoActiveConnection,
}
