//! Command-driven power lifecycle of the host.
//!
//! The controller owns a single pending-shutdown slot. `SHUTDOWN` arms a
//! cancellable timer that runs the configured shutdown command once the delay
//! elapses, `RESUME` cancels it. All state lives behind one mutex so commands
//! arriving from several transports and the timer task observe it atomically.

mod state;

pub use state::{ApplyOutcome, HeartbeatRecord, LifecycleSnapshot};

use std::sync::Arc;
use std::time::Duration;

use protocol::{Command, LogEntry};
use system_utils::{ExternalCommand, ProcessRunner};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use self::state::{ControllerState, LifecycleState, PendingShutdown};

/// Longest delay a shutdown can be armed with; larger delays are clamped.
pub const MAX_SHUTDOWN_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

struct Inner {
    shutdown_delay: Duration,
    shutdown_command: ExternalCommand,
    runner: Arc<dyn ProcessRunner>,
    state: Mutex<ControllerState>,
}

impl LifecycleController {
    pub fn new(
        shutdown_delay: Duration,
        shutdown_command: ExternalCommand,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                shutdown_delay: shutdown_delay.min(MAX_SHUTDOWN_DELAY),
                shutdown_command,
                runner,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Applies one validated command. Returns as soon as the state is updated;
    /// the shutdown command itself only ever runs on the timer task.
    pub async fn apply(&self, command: Command) -> ApplyOutcome {
        tracing::debug!(
            event = "controller.command",
            command = %command.kind(),
            "processing command"
        );
        match command {
            Command::Shutdown => self.request_shutdown().await,
            Command::Resume => self.resume().await,
            Command::Heartbeat { version } => self.record_heartbeat(version).await,
            Command::Log { entries } => forward_log_entries(&entries),
        }
    }

    pub async fn snapshot(&self) -> LifecycleSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn last_heartbeat(&self) -> Option<HeartbeatRecord> {
        self.inner.state.lock().await.last_heartbeat.clone()
    }

    async fn request_shutdown(&self) -> ApplyOutcome {
        let mut state = self.inner.state.lock().await;
        if let LifecycleState::ShutdownPending(pending) = &state.lifecycle {
            tracing::warn!(
                event = "controller.shutdown.duplicate",
                remaining_s = pending.deadline.saturating_duration_since(Instant::now()).as_secs(),
                executing = pending.executing,
                "shutdown already pending, ignoring duplicate request"
            );
            return ApplyOutcome::DuplicateShutdown {
                deadline: pending.deadline,
            };
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let deadline = Instant::now() + self.inner.shutdown_delay;
        let cancel = CancellationToken::new();
        state.lifecycle = LifecycleState::ShutdownPending(PendingShutdown {
            generation,
            deadline,
            cancel: cancel.clone(),
            executing: false,
        });
        tokio::spawn(run_shutdown_timer(
            Arc::clone(&self.inner),
            generation,
            deadline,
            cancel,
        ));
        tracing::info!(
            event = "controller.shutdown.scheduled",
            delay_s = self.inner.shutdown_delay.as_secs(),
            command = %self.inner.shutdown_command,
            "shutdown scheduled"
        );
        ApplyOutcome::ShutdownScheduled { deadline }
    }

    async fn resume(&self) -> ApplyOutcome {
        let mut state = self.inner.state.lock().await;
        match std::mem::take(&mut state.lifecycle) {
            LifecycleState::ShutdownPending(pending) => {
                pending.cancel.cancel();
                if pending.executing {
                    tracing::warn!(
                        event = "controller.resume.in_flight",
                        "shutdown command already running and cannot be aborted"
                    );
                } else {
                    tracing::info!(
                        event = "controller.resume",
                        "pending shutdown cancelled, resuming normal operation"
                    );
                }
                ApplyOutcome::Resumed
            }
            LifecycleState::Normal => {
                tracing::warn!(
                    event = "controller.resume.nothing_pending",
                    "resume received but no shutdown is pending"
                );
                ApplyOutcome::NothingToResume
            }
        }
    }

    async fn record_heartbeat(&self, version: Option<String>) -> ApplyOutcome {
        tracing::info!(
            event = "controller.heartbeat",
            version = version.as_deref().unwrap_or("-"),
            "heartbeat received"
        );
        self.inner.state.lock().await.last_heartbeat = Some(HeartbeatRecord {
            version,
            received_at: Instant::now(),
        });
        ApplyOutcome::HeartbeatRecorded
    }
}

fn forward_log_entries(entries: &[LogEntry]) -> ApplyOutcome {
    for entry in entries {
        tracing::info!(
            event = "controller.remote_log",
            remote_timestamp = entry.timestamp.as_deref().unwrap_or("-"),
            remote_level = entry.level.as_deref().unwrap_or("-"),
            message = %entry.message,
            "remote log entry"
        );
    }
    ApplyOutcome::LogForwarded {
        entries: entries.len(),
    }
}

async fn run_shutdown_timer(
    inner: Arc<Inner>,
    generation: u64,
    deadline: Instant,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(event = "controller.shutdown.timer_cancelled", generation);
            return;
        }
        _ = sleep_until(deadline) => {}
    }
    inner.on_shutdown_due(generation).await;
}

impl Inner {
    async fn on_shutdown_due(&self, generation: u64) {
        {
            let mut state = self.state.lock().await;
            match &mut state.lifecycle {
                LifecycleState::ShutdownPending(pending)
                    if pending.generation == generation && !pending.cancel.is_cancelled() =>
                {
                    pending.executing = true;
                }
                _ => {
                    tracing::debug!(
                        event = "controller.shutdown.stale_timer",
                        generation,
                        "shutdown timer fired after cancellation"
                    );
                    return;
                }
            }
        }

        tracing::info!(
            event = "controller.shutdown.executing",
            command = %self.shutdown_command,
            "running shutdown command"
        );
        match self.runner.run(&self.shutdown_command).await {
            Ok(output) if output.success() => {
                tracing::info!(
                    event = "controller.shutdown.completed",
                    "shutdown command succeeded, waiting for power off"
                );
            }
            Ok(output) => {
                tracing::error!(
                    event = "controller.shutdown.failed",
                    command = %self.shutdown_command,
                    exit_code = ?output.exit_code,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "shutdown command failed"
                );
            }
            Err(err) => {
                tracing::error!(
                    event = "controller.shutdown.failed",
                    command = %self.shutdown_command,
                    error = %format!("{err:#}"),
                    "shutdown command could not be run"
                );
            }
        }

        // Only clear the slot this timer armed; a resume plus a new shutdown
        // may have replaced it while the command was running.
        let mut state = self.state.lock().await;
        if state.is_pending(generation) {
            state.lifecycle = LifecycleState::Normal;
        }
    }
}
