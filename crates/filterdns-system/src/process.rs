//! OS tool invocation helpers.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::SystemError;

/// Run an OS tool, mapping non-zero exit to `MutationFailed` with the
/// tool's combined output as detail.
pub(crate) async fn run_tool(
    platform: &'static str,
    program: &str,
    args: &[&str],
) -> Result<String, SystemError> {
    debug!(program, ?args, "running resolver tool");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| SystemError::MutationFailed {
            platform,
            detail: format!("{program}: {e}"),
        })?;

    if !output.status.success() {
        let mut detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if detail.is_empty() {
            detail = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        return Err(SystemError::MutationFailed {
            platform,
            detail: format!("{program} {}: {detail}", args.join(" ")),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a tool whose failure is tolerable; errors are logged and swallowed.
pub(crate) async fn run_tool_best_effort(platform: &'static str, program: &str, args: &[&str]) {
    if let Err(e) = run_tool(platform, program, args).await {
        debug!(error = %e, "best-effort tool invocation failed");
    }
}

/// Whether `program` is present on PATH.
pub(crate) fn on_path(program: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(program)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
