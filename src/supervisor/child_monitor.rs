//! Child liveness polling and the post-stop grace wait.
//!
//! The child is never awaited without a bound: each step waits on the child
//! for at most one poll interval, so an exit is seen as soon as it happens
//! and a stop request is noticed within one interval however long the child
//! has run.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::StopFlag;

/// Why [`watch_child`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Child exited with no stop pending. `None` when the status could not
    /// be read.
    Exited(Option<ExitStatus>),
    /// Stop was requested while the child was still running.
    StopRequested,
}

/// How the grace window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceOutcome {
    /// The child exited inside the window.
    Exited,
    /// The window closed with the child still running.
    Expired,
}

/// Non-blocking liveness probe. A failed probe counts as an exit so the
/// dead handle is not polled forever.
fn poll_exit(child: &mut Child) -> Option<Option<ExitStatus>> {
    match child.try_wait() {
        Ok(Some(status)) => Some(Some(status)),
        Ok(None) => None,
        Err(err) => {
            warn!(%err, "failed to poll child process status");
            Some(None)
        }
    }
}

/// Wait up to `slice` for `child` to exit, waking as soon as it does.
///
/// `Child::wait` is cancel-safe, so an elapsed slice leaves the handle
/// ready for the next call.
async fn wait_exit(child: &mut Child, slice: Duration) -> Option<Option<ExitStatus>> {
    match tokio::time::timeout(slice, child.wait()).await {
        Ok(Ok(status)) => Some(Some(status)),
        Ok(Err(err)) => {
            warn!(%err, "failed to wait on child process");
            Some(None)
        }
        Err(_) => None,
    }
}

/// Wait on `child` until it exits or a stop is requested.
///
/// An exit that is already visible wins over a pending stop. The child is
/// never signalled; after `StopRequested` the caller decides whether to
/// enter [`grace_wait`].
pub async fn watch_child(child: &mut Child, stop: &StopFlag, timing: &TimingConfig) -> WaitOutcome {
    loop {
        let exited = match poll_exit(child) {
            Some(status) => Some(status),
            None if stop.is_requested() => return WaitOutcome::StopRequested,
            None => wait_exit(child, timing.poll_interval()).await,
        };

        if let Some(status) = exited {
            match status {
                Some(status) => info!(%status, "target process exited"),
                None => info!("target process exited, status unknown"),
            }
            return WaitOutcome::Exited(status);
        }
    }
}

/// Wait up to the grace period for `child` to exit, re-arming the wait at
/// the finer grace interval.
pub async fn grace_wait(child: &mut Child, timing: &TimingConfig) -> GraceOutcome {
    let deadline = Instant::now() + timing.grace_period();

    if poll_exit(child).is_some() {
        info!("target process exited during grace period");
        return GraceOutcome::Exited;
    }

    loop {
        let now = Instant::now();
        if now >= deadline {
            return GraceOutcome::Expired;
        }

        let slice = timing.grace_poll_interval().min(deadline - now);
        debug!(remaining = ?(deadline - now), "target still running");
        if wait_exit(child, slice).await.is_some() {
            info!("target process exited during grace period");
            return GraceOutcome::Exited;
        }
    }
}
