use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Power intent owned by the controller. At most one shutdown is ever pending.
#[derive(Debug, Default)]
pub(super) enum LifecycleState {
    #[default]
    Normal,
    ShutdownPending(PendingShutdown),
}

#[derive(Debug)]
pub(super) struct PendingShutdown {
    /// Identifies the timer task that armed this slot.
    pub(super) generation: u64,
    pub(super) deadline: Instant,
    pub(super) cancel: CancellationToken,
    /// Set once the shutdown command has been started; it can no longer be aborted.
    pub(super) executing: bool,
}

#[derive(Debug, Default)]
pub(super) struct ControllerState {
    pub(super) lifecycle: LifecycleState,
    pub(super) next_generation: u64,
    pub(super) last_heartbeat: Option<HeartbeatRecord>,
}

impl ControllerState {
    pub(super) fn snapshot(&self) -> LifecycleSnapshot {
        match &self.lifecycle {
            LifecycleState::Normal => LifecycleSnapshot::Normal,
            LifecycleState::ShutdownPending(pending) => LifecycleSnapshot::ShutdownPending {
                deadline: pending.deadline,
                executing: pending.executing,
            },
        }
    }

    pub(super) fn is_pending(&self, generation: u64) -> bool {
        matches!(
            &self.lifecycle,
            LifecycleState::ShutdownPending(pending) if pending.generation == generation
        )
    }
}

/// Read-only view of the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSnapshot {
    Normal,
    ShutdownPending { deadline: Instant, executing: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRecord {
    pub version: Option<String>,
    pub received_at: Instant,
}

/// What [`super::LifecycleController::apply`] did with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    ShutdownScheduled { deadline: Instant },
    DuplicateShutdown { deadline: Instant },
    Resumed,
    NothingToResume,
    HeartbeatRecorded,
    LogForwarded { entries: usize },
}
