use std::sync::Arc;
use std::time::Duration;

use system_utils::{ExternalCommand, ProcessOutput, ProcessRunner};
use tokio_util::sync::CancellationToken;

use crate::config::UplinkSettings;

use super::commands::{probe_command, restore_command};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub up: bool,
    pub output: ProcessOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Up,
    Restored,
    RestoreFailed,
}

/// Best-effort connectivity watchdog: probe, restore on failure, sleep, repeat.
pub struct UplinkMonitor {
    probe: ExternalCommand,
    restore: ExternalCommand,
    check_interval: Duration,
    runner: Arc<dyn ProcessRunner>,
}

impl UplinkMonitor {
    pub fn new(settings: &UplinkSettings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self::with_commands(
            probe_command(settings),
            restore_command(settings),
            settings.check_interval,
            runner,
        )
    }

    pub fn with_commands(
        probe: ExternalCommand,
        restore: ExternalCommand,
        check_interval: Duration,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            probe,
            restore,
            check_interval,
            runner,
        }
    }

    /// Runs until `shutdown` is cancelled. A cancelled token also drops an
    /// in-flight probe or restore, which kills the child process.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            event = "uplink.started",
            probe = %self.probe,
            interval_s = self.check_interval.as_secs(),
            "uplink monitor started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.check_once() => {
                    if let Err(err) = result {
                        tracing::error!(
                            event = "uplink.check.error",
                            error = %format!("{err:#}"),
                            "unexpected error during uplink check"
                        );
                    }
                }
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }
        tracing::info!(event = "uplink.stopped", "uplink monitor stopped");
    }

    /// One probe and, if the uplink is down, one restore attempt.
    ///
    /// A failed restore is an outcome, not an error; `Err` only reports that
    /// the probe itself could not be run.
    pub async fn check_once(&self) -> anyhow::Result<CheckOutcome> {
        let probe = self.probe().await?;
        if probe.up {
            tracing::debug!(event = "uplink.status", status = "up", "connection status: up");
            return Ok(CheckOutcome::Up);
        }

        tracing::error!(
            event = "uplink.probe.failed",
            command = %self.probe,
            exit_code = ?probe.output.exit_code,
            stdout = %probe.output.stdout,
            stderr = %probe.output.stderr,
            "connection check failed"
        );
        tracing::warn!(
            event = "uplink.restore.started",
            command = %self.restore,
            "connection is down, attempting to restore"
        );

        match self.runner.run(&self.restore).await {
            Ok(output) if output.success() => {
                tracing::info!(event = "uplink.restore.succeeded", "connection restored");
                Ok(CheckOutcome::Restored)
            }
            Ok(output) => {
                tracing::error!(
                    event = "uplink.restore.failed",
                    command = %self.restore,
                    exit_code = ?output.exit_code,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "failed to restore connection"
                );
                Ok(CheckOutcome::RestoreFailed)
            }
            Err(err) => {
                tracing::error!(
                    event = "uplink.restore.failed",
                    command = %self.restore,
                    error = %format!("{err:#}"),
                    "failed to run restore command"
                );
                Ok(CheckOutcome::RestoreFailed)
            }
        }
    }

    async fn probe(&self) -> anyhow::Result<ProbeOutcome> {
        let output = self.runner.run(&self.probe).await?;
        Ok(ProbeOutcome {
            up: output.success(),
            output,
        })
    }
}
