//! Point-in-time system status: port liveness, uptime and battery.
//!
//! The three probes run concurrently. None of them can fail the snapshot;
//! a probe that cannot produce data leaves its section `null`.

pub mod battery;
pub mod ports;
pub mod uptime;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use battery::{BatteryInfo, BatteryProbe};
pub use ports::{check_port, PortMonitor, PortStatus};
pub use uptime::{parse_load_average, ProbeError, UptimeInfo, UptimeProbe, UptimeVariant};

use crate::config::KioskConfig;

/// Body of `GET /api/system/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub uptime: Option<UptimeInfo>,
    pub ports: Vec<PortStatus>,
    pub battery: Option<BatteryInfo>,
    pub generated_at: DateTime<Utc>,
}

/// All status probes, built once per process.
#[derive(Debug)]
pub struct SystemProbe {
    pub ports: PortMonitor,
    pub uptime: UptimeProbe,
    pub battery: BatteryProbe,
}

impl SystemProbe {
    pub fn new(ports: PortMonitor, uptime: UptimeProbe, battery: BatteryProbe) -> Self {
        Self {
            ports,
            uptime,
            battery,
        }
    }

    pub fn from_config(config: &KioskConfig) -> Self {
        Self::new(
            PortMonitor::new(
                config.probe_host,
                config.monitored_ports.clone(),
                config.port_probe_timeout,
            ),
            UptimeProbe::new(config.uptime_program.clone(), config.uptime_timeout),
            BatteryProbe::new(config.battery_dir.clone()),
        )
    }

    pub async fn snapshot(&self) -> SystemStatus {
        let (uptime, ports, battery) = tokio::join!(
            self.uptime.probe(),
            self.ports.probe(),
            self.battery.read(),
        );
        SystemStatus {
            uptime,
            ports,
            battery,
            generated_at: Utc::now(),
        }
    }
}
