//! Target process supervision.
//!
//! [`ProcessSupervisor`] launches the target, restarts it after every exit,
//! and stops supervising once the shared [`StopFlag`] is set. It never
//! terminates the child: after a stop it waits a bounded grace period and
//! then lets go of the handle.

pub mod child_monitor;
pub mod spawner;

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::TimingConfig;
use crate::StopFlag;

use self::child_monitor::{GraceOutcome, WaitOutcome};

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not yet started, or backing off before a launch check.
    Idle,
    /// Checking for and spawning the target.
    Launching,
    /// Target running, polled for exit.
    Running,
    /// Target exited; waiting out the restart delay.
    RestartPending,
    /// Stop observed while the target was running.
    StopRequested,
    /// Waiting for the target to exit on its own.
    GraceWait,
    /// Supervision finished. Terminal.
    Terminated,
}

impl Display for SupervisorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::RestartPending => "restart_pending",
            Self::StopRequested => "stop_requested",
            Self::GraceWait => "grace_wait",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Observable supervision milestones, for callers that want to follow the
/// loop without parsing logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The target path did not exist; no launch was attempted.
    TargetMissing,
    /// The OS refused to spawn the target.
    SpawnFailed(String),
    /// A new child is running.
    Launched {
        /// OS process id, when still available.
        pid: Option<u32>,
    },
    /// The child exited while no stop was pending.
    ChildExited,
    /// The stop flag was observed.
    StopObserved,
    /// The grace period ran out and the child was left running.
    GraceExpired {
        /// OS process id of the abandoned child.
        pid: Option<u32>,
    },
    /// The supervisor moved between lifecycle states.
    StateChanged {
        /// State being left.
        from: SupervisorState,
        /// State entered.
        to: SupervisorState,
    },
    /// Supervision ended.
    Terminated,
}

/// How supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownOutcome {
    /// Stop was observed while no child was running.
    #[default]
    NoChildRunning,
    /// The child exited within the grace period.
    ChildExited,
    /// The grace period expired; the child was left running.
    ChildAbandoned {
        /// OS process id of the abandoned child.
        pid: Option<u32>,
    },
}

/// Counters collected over the supervisor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Successful launches.
    pub launches: u32,
    /// Launch cycles skipped because the target was missing.
    pub missing_target_checks: u32,
    /// Launch cycles that failed to spawn.
    pub spawn_failures: u32,
    /// Final disposition of the child.
    pub outcome: ShutdownOutcome,
}

/// Keeps one target executable running until a stop is requested.
pub struct ProcessSupervisor {
    target: PathBuf,
    timing: TimingConfig,
    stop: StopFlag,
    state: SupervisorState,
    events: Option<UnboundedSender<SupervisorEvent>>,
}

impl ProcessSupervisor {
    /// Create a supervisor for `target`, which should already be resolved
    /// to an absolute path.
    #[must_use]
    pub fn new(target: PathBuf, timing: TimingConfig, stop: StopFlag) -> Self {
        Self {
            target,
            timing,
            stop,
            state: SupervisorState::Idle,
            events: None,
        }
    }

    /// Publish [`SupervisorEvent`]s on `tx` as the loop progresses.
    #[must_use]
    pub fn with_events(mut self, tx: UnboundedSender<SupervisorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run until the stop flag is observed and the child (if any) has been
    /// released.
    pub async fn run(mut self) -> SupervisorReport {
        let span = info_span!("supervisor", target_path = %self.target.display());
        async move {
            let mut report = SupervisorReport::default();
            report.outcome = self.supervise(&mut report).await;
            self.transition(SupervisorState::Terminated);
            self.emit(SupervisorEvent::Terminated);
            info!(
                launches = report.launches,
                missing_target_checks = report.missing_target_checks,
                spawn_failures = report.spawn_failures,
                outcome = ?report.outcome,
                "supervision ended"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn supervise(&mut self, report: &mut SupervisorReport) -> ShutdownOutcome {
        loop {
            if self.stop.is_requested() {
                self.emit(SupervisorEvent::StopObserved);
                return ShutdownOutcome::NoChildRunning;
            }

            self.transition(SupervisorState::Launching);

            if !spawner::target_exists(&self.target).await {
                report.missing_target_checks += 1;
                warn!(
                    attempt = report.missing_target_checks,
                    retry_ms = self.timing.missing_target_delay_ms,
                    "target executable not found"
                );
                self.emit(SupervisorEvent::TargetMissing);
                self.transition(SupervisorState::Idle);
                self.backoff(self.timing.missing_target_delay()).await;
                continue;
            }

            let mut child = match spawner::spawn_target(&self.target) {
                Ok(child) => child,
                Err(err) => {
                    report.spawn_failures += 1;
                    warn!(
                        %err,
                        attempt = report.spawn_failures,
                        retry_ms = self.timing.spawn_failure_delay_ms,
                        "target launch failed"
                    );
                    self.emit(SupervisorEvent::SpawnFailed(err.to_string()));
                    self.transition(SupervisorState::Idle);
                    self.backoff(self.timing.spawn_failure_delay()).await;
                    continue;
                }
            };

            let pid = child.id();
            report.launches += 1;
            self.transition(SupervisorState::Running);
            self.emit(SupervisorEvent::Launched { pid });

            match child_monitor::watch_child(&mut child, &self.stop, &self.timing).await {
                WaitOutcome::Exited(_) => {
                    drop(child);
                    self.emit(SupervisorEvent::ChildExited);
                    self.transition(SupervisorState::RestartPending);
                    self.backoff(self.timing.restart_delay()).await;
                }
                WaitOutcome::StopRequested => {
                    self.emit(SupervisorEvent::StopObserved);
                    self.transition(SupervisorState::StopRequested);
                    info!(
                        pid = pid.unwrap_or(0),
                        grace_ms = self.timing.grace_period_ms,
                        "stop observed, waiting for target to exit on its own"
                    );
                    self.transition(SupervisorState::GraceWait);

                    let grace = child_monitor::grace_wait(&mut child, &self.timing).await;
                    // Releases supervision only; the handle has no kill_on_drop.
                    drop(child);

                    return match grace {
                        GraceOutcome::Exited => ShutdownOutcome::ChildExited,
                        GraceOutcome::Expired => {
                            warn!(
                                pid = pid.unwrap_or(0),
                                "grace period expired, leaving target running"
                            );
                            self.emit(SupervisorEvent::GraceExpired { pid });
                            ShutdownOutcome::ChildAbandoned { pid }
                        }
                    };
                }
            }
        }
    }

    /// Sleep for `delay` in poll-sized slices, returning early once a stop
    /// is requested so no further launch is attempted.
    async fn backoff(&self, delay: Duration) {
        let step = self.timing.poll_interval();
        let mut remaining = delay;
        while !remaining.is_zero() {
            if self.stop.is_requested() {
                return;
            }
            let slice = step.min(remaining);
            tokio::time::sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "supervisor state transition");
            self.emit(SupervisorEvent::StateChanged {
                from: self.state,
                to: next,
            });
            self.state = next;
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }
}
