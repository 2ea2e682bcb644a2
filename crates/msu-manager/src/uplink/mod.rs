//! Uplink watchdog: keeps the WWAN connection alive by pinging a target and
//! running the restore command whenever the ping fails.

mod commands;
mod monitor;

pub use commands::{probe_command, restore_command};
pub use monitor::{CheckOutcome, ProbeOutcome, UplinkMonitor};
