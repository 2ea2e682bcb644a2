use anyhow::Context;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use system_utils::ExternalCommand;

use crate::controller::MAX_SHUTDOWN_DELAY;

const DEFAULT_UDP_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_UDP_LISTEN_PORT: u16 = 8001;
const DEFAULT_SHUTDOWN_DELAY_S: u64 = 180;
const DEFAULT_CHECK_INTERVAL_S: u64 = 10;
const DEFAULT_CHECK_TIMEOUT_MS: u64 = 500;
const DEFAULT_RESTORE_TIMEOUT_S: u64 = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "CRITICAL", alias = "critical", alias = "ERROR")]
    Error,
    #[serde(alias = "WARNING", alias = "warning", alias = "WARN")]
    Warn,
    #[default]
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "DEBUG")]
    Debug,
    #[serde(alias = "TRACE")]
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Settings file as written on disk. Both features are disabled unless their
/// section sets `enabled = true`.
#[derive(Debug, Deserialize, Default)]
pub struct MsuManagerConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub msu_controller: ControllerConfig,
    #[serde(default)]
    pub uplink_monitor: UplinkMonitorConfig,
}

#[derive(Debug, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_udp_bind_address")]
    pub udp_bind_address: String,
    #[serde(default = "default_udp_listen_port")]
    pub udp_listen_port: u16,
    #[serde(default = "default_shutdown_delay_s")]
    pub shutdown_delay_s: u64,
    pub shutdown_command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UplinkMonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    pub restore_connection_cmd: Option<Vec<String>>,
    pub wwan_device: Option<String>,
    pub wwan_usb_id: Option<String>,
    pub wwan_apn: Option<String>,
    pub check_connection_target: Option<String>,
    pub check_connection_device: Option<String>,
    #[serde(default = "default_check_timeout_ms")]
    pub check_connection_timeout_ms: u64,
    #[serde(default = "default_check_interval_s")]
    pub check_interval_s: u64,
    #[serde(default = "default_restore_timeout_s")]
    pub restore_timeout_s: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            udp_bind_address: default_udp_bind_address(),
            udp_listen_port: DEFAULT_UDP_LISTEN_PORT,
            shutdown_delay_s: DEFAULT_SHUTDOWN_DELAY_S,
            shutdown_command: None,
        }
    }
}

impl Default for UplinkMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            restore_connection_cmd: None,
            wwan_device: None,
            wwan_usb_id: None,
            wwan_apn: None,
            check_connection_target: None,
            check_connection_device: None,
            check_connection_timeout_ms: DEFAULT_CHECK_TIMEOUT_MS,
            check_interval_s: DEFAULT_CHECK_INTERVAL_S,
            restore_timeout_s: DEFAULT_RESTORE_TIMEOUT_S,
        }
    }
}

/// Validated configuration; a feature is `None` when disabled.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: LogLevel,
    pub controller: Option<ControllerSettings>,
    pub uplink: Option<UplinkSettings>,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub udp_bind_addr: SocketAddr,
    pub shutdown_delay: Duration,
    pub shutdown_command: ExternalCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkSettings {
    pub restore_connection_cmd: Vec<String>,
    pub wwan_device: String,
    pub wwan_usb_id: String,
    pub wwan_apn: String,
    pub check_connection_target: String,
    pub check_connection_device: Option<String>,
    pub check_timeout: Duration,
    pub check_interval: Duration,
    pub restore_timeout: Duration,
}

pub fn load_config(path: &Path) -> anyhow::Result<MsuManagerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_config(path)?
        .resolve()
        .with_context(|| format!("invalid config {}", path.display()))
}

impl MsuManagerConfig {
    pub fn resolve(self) -> anyhow::Result<Settings> {
        let controller = if self.msu_controller.enabled {
            Some(self.msu_controller.resolve().context("msu_controller")?)
        } else {
            None
        };
        let uplink = if self.uplink_monitor.enabled {
            Some(self.uplink_monitor.resolve().context("uplink_monitor")?)
        } else {
            None
        };
        Ok(Settings {
            log_level: self.log_level,
            controller,
            uplink,
        })
    }
}

impl ControllerConfig {
    fn resolve(self) -> anyhow::Result<ControllerSettings> {
        let ip: IpAddr = self
            .udp_bind_address
            .parse()
            .with_context(|| format!("invalid udp_bind_address {}", self.udp_bind_address))?;
        if self.shutdown_delay_s > MAX_SHUTDOWN_DELAY.as_secs() {
            anyhow::bail!(
                "shutdown_delay_s must be at most {}",
                MAX_SHUTDOWN_DELAY.as_secs()
            );
        }
        let shutdown_command = required_argv(self.shutdown_command, "shutdown_command")?;
        Ok(ControllerSettings {
            udp_bind_addr: SocketAddr::new(ip, self.udp_listen_port),
            shutdown_delay: Duration::from_secs(self.shutdown_delay_s),
            shutdown_command: ExternalCommand::new(shutdown_command),
        })
    }
}

impl UplinkMonitorConfig {
    fn resolve(self) -> anyhow::Result<UplinkSettings> {
        if self.check_interval_s == 0 {
            anyhow::bail!("check_interval_s must be greater than zero");
        }
        Ok(UplinkSettings {
            restore_connection_cmd: required_argv(
                self.restore_connection_cmd,
                "restore_connection_cmd",
            )?,
            wwan_device: required(self.wwan_device, "wwan_device")?,
            wwan_usb_id: required(self.wwan_usb_id, "wwan_usb_id")?,
            wwan_apn: required(self.wwan_apn, "wwan_apn")?,
            check_connection_target: required(
                self.check_connection_target,
                "check_connection_target",
            )?,
            check_connection_device: self
                .check_connection_device
                .filter(|device| !device.trim().is_empty()),
            check_timeout: Duration::from_millis(self.check_connection_timeout_ms),
            check_interval: Duration::from_secs(self.check_interval_s),
            restore_timeout: Duration::from_secs(self.restore_timeout_s),
        })
    }
}

fn required(value: Option<String>, field: &str) -> anyhow::Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => anyhow::bail!("{field} is required"),
    }
}

fn required_argv(value: Option<Vec<String>>, field: &str) -> anyhow::Result<Vec<String>> {
    match value {
        Some(argv) if argv.first().is_some_and(|program| !program.trim().is_empty()) => Ok(argv),
        Some(_) => anyhow::bail!("{field} must not be empty"),
        None => anyhow::bail!("{field} is required"),
    }
}

fn default_udp_bind_address() -> String {
    DEFAULT_UDP_BIND_ADDRESS.to_string()
}

fn default_udp_listen_port() -> u16 {
    DEFAULT_UDP_LISTEN_PORT
}

fn default_shutdown_delay_s() -> u64 {
    DEFAULT_SHUTDOWN_DELAY_S
}

fn default_check_timeout_ms() -> u64 {
    DEFAULT_CHECK_TIMEOUT_MS
}

fn default_check_interval_s() -> u64 {
    DEFAULT_CHECK_INTERVAL_S
}

fn default_restore_timeout_s() -> u64 {
    DEFAULT_RESTORE_TIMEOUT_S
}
