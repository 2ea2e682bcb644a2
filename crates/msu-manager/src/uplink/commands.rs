use std::time::Duration;

use system_utils::ExternalCommand;

use crate::config::UplinkSettings;

/// Extra time the probe process gets beyond ping's own reply timeout.
const PROBE_GRACE: Duration = Duration::from_secs(2);

/// `ping -c 1 -W <secs> [-I <device>] <target>`
pub fn probe_command(settings: &UplinkSettings) -> ExternalCommand {
    let mut argv = vec![
        "ping".to_string(),
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        format_seconds(settings.check_timeout),
    ];
    if let Some(device) = &settings.check_connection_device {
        argv.push("-I".to_string());
        argv.push(device.clone());
    }
    argv.push(settings.check_connection_target.clone());
    ExternalCommand::new(argv).with_timeout(settings.check_timeout + PROBE_GRACE)
}

pub fn restore_command(settings: &UplinkSettings) -> ExternalCommand {
    ExternalCommand::new(settings.restore_connection_cmd.iter().cloned())
        .with_env("WWAN_IFACE", settings.wwan_device.as_str())
        .with_env("DEVICE_ID", settings.wwan_usb_id.as_str())
        .with_env("APN", settings.wwan_apn.as_str())
        .with_timeout(settings.restore_timeout)
}

fn format_seconds(duration: Duration) -> String {
    format!("{}", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn settings(device: Option<&str>) -> UplinkSettings {
        UplinkSettings {
            restore_connection_cmd: vec!["./restore.sh".to_string(), "--hard".to_string()],
            wwan_device: "wwan0".to_string(),
            wwan_usb_id: "1e0e:9001".to_string(),
            wwan_apn: "internet.apn".to_string(),
            check_connection_target: "8.8.8.8".to_string(),
            check_connection_device: device.map(str::to_string),
            check_timeout: Duration::from_millis(500),
            check_interval: Duration::from_secs(10),
            restore_timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn probe_pings_target_once() {
        let probe = probe_command(&settings(None));
        assert_eq!(probe.argv, vec!["ping", "-c", "1", "-W", "0.5", "8.8.8.8"]);
        assert!(probe.env.is_empty());
        assert_eq!(probe.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn probe_binds_optional_device() {
        let probe = probe_command(&settings(Some("wwan0")));
        assert_eq!(
            probe.argv,
            vec!["ping", "-c", "1", "-W", "0.5", "-I", "wwan0", "8.8.8.8"]
        );
    }

    #[test]
    fn restore_carries_modem_bindings() {
        let restore = restore_command(&settings(None));
        assert_eq!(restore.argv, vec!["./restore.sh", "--hard"]);
        assert_eq!(
            restore.env,
            BTreeMap::from([
                ("APN".to_string(), "internet.apn".to_string()),
                ("DEVICE_ID".to_string(), "1e0e:9001".to_string()),
                ("WWAN_IFACE".to_string(), "wwan0".to_string()),
            ])
        );
        assert_eq!(restore.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn whole_seconds_have_no_fraction() {
        assert_eq!(format_seconds(Duration::from_secs(1)), "1");
        assert_eq!(format_seconds(Duration::from_millis(1500)), "1.5");
    }
}
