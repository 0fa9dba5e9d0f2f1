//! Target process spawner.
//!
//! Launches the supervised executable with no arguments and inherited
//! stdio. The returned child is never marked `kill_on_drop`: dropping the
//! handle releases supervision but leaves the process running.

use std::path::Path;

use tokio::process::{Child, Command};
use tracing::{info, info_span};

use crate::{AppError, Result};

/// Whether something exists at the target path.
pub async fn target_exists(target: &Path) -> bool {
    tokio::fs::metadata(target).await.is_ok()
}

/// Spawn one instance of the target executable.
///
/// # Errors
///
/// Returns `AppError::Spawn` if the OS refuses to start the process.
pub fn spawn_target(target: &Path) -> Result<Child> {
    let span = info_span!("spawn_target", target_path = %target.display());
    let _guard = span.enter();

    let child = Command::new(target)
        .kill_on_drop(false)
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn {}: {err}", target.display())))?;

    info!(pid = child.id().unwrap_or(0), "target process spawned");

    Ok(child)
}
