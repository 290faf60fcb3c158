//! Service configuration
//!
//! Plain structs with defaults for every port, directory and timing
//! constant the kiosk service uses. The binary fills these from CLI flags
//! and environment variables; tests construct them directly.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP content/API port.
pub const DEFAULT_HTTP_PORT: u16 = 5000;
/// Default port of the remote dialer listener.
pub const DEFAULT_DIALER_PORT: u16 = 5001;
/// Default port of the fan-out relay server.
pub const DEFAULT_RELAY_PORT: u16 = 6001;

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1_000_000;

/// TCP connect budget for a single port probe.
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(750);
/// Budget for a single `uptime` invocation.
pub const UPTIME_TIMEOUT: Duration = Duration::from_millis(2000);
/// Quiet period before a burst of cookie changes is written to disk.
pub const COOKIE_DEBOUNCE: Duration = Duration::from_millis(300);
/// Delay between a relay client disconnect and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5000);
/// Default heartbeat period of the dialer listener.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);
/// Longest a single dial dispatch may take before it is reported as failed.
pub const DIAL_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Period of the relay client's application-level keep-alive ping.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(30_000);

/// File names inside the data directory.
pub const TASKS_FILE: &str = "tasks.json";
pub const COOKIES_FILE: &str = "cookies.json";
pub const SEED_FILE: &str = "login-seed.json";

/// Configuration for the kiosk-side service (`serve`).
#[derive(Debug, Clone)]
pub struct KioskConfig {
    /// Address the HTTP server and relay server bind to
    pub bind: IpAddr,
    /// Port for the content/API server
    pub http_port: u16,
    /// Port for the fan-out relay server
    pub relay_port: u16,
    /// Main content root (UI pages and scripts)
    pub content_root: PathBuf,
    /// Named auxiliary roots selected by the first path segment
    pub aux_roots: Vec<(String, PathBuf)>,
    /// Application-private data directory
    pub data_dir: PathBuf,
    /// Remote dialer WebSocket URL; `None` disables the relay client
    pub dialer_url: Option<String>,
    /// Ports checked by the status probe
    pub monitored_ports: Vec<u16>,
    /// Host the port probe connects to
    pub probe_host: IpAddr,
    /// Directory holding the battery `capacity` and `status` files
    pub battery_dir: PathBuf,
    /// Program invoked for uptime information
    pub uptime_program: String,
    pub port_probe_timeout: Duration,
    pub uptime_timeout: Duration,
    pub cookie_debounce: Duration,
    pub reconnect_delay: Duration,
    pub keepalive_interval: Duration,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_port: DEFAULT_HTTP_PORT,
            relay_port: DEFAULT_RELAY_PORT,
            content_root: PathBuf::from("renderer"),
            aux_roots: vec![
                ("icon".to_string(), PathBuf::from("assets/icons")),
                ("contact".to_string(), PathBuf::from("assets/contact")),
            ],
            data_dir: PathBuf::from("data"),
            dialer_url: Some("ws://192.168.1.60:5001".to_string()),
            monitored_ports: vec![DEFAULT_HTTP_PORT, DEFAULT_DIALER_PORT, DEFAULT_RELAY_PORT],
            probe_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            battery_dir: PathBuf::from("/sys/class/power_supply/BAT0"),
            uptime_program: "uptime".to_string(),
            port_probe_timeout: PORT_PROBE_TIMEOUT,
            uptime_timeout: UPTIME_TIMEOUT,
            cookie_debounce: COOKIE_DEBOUNCE,
            reconnect_delay: RECONNECT_DELAY,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

impl KioskConfig {
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.http_port)
    }

    pub fn relay_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.relay_port)
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join(TASKS_FILE)
    }

    pub fn cookies_path(&self) -> PathBuf {
        self.data_dir.join(COOKIES_FILE)
    }

    /// Point every on-disk location at `root`, keeping the default layout.
    pub fn rooted_at(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            content_root: root.join(&defaults.content_root),
            aux_roots: defaults
                .aux_roots
                .iter()
                .map(|(name, dir)| (name.clone(), root.join(dir)))
                .collect(),
            data_dir: root.join(&defaults.data_dir),
            ..defaults
        }
    }
}

/// Configuration for the remote dialer listener (`dialer`).
#[derive(Debug, Clone)]
pub struct DialerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Period between heartbeat pings; a peer silent for a full period is dropped
    pub ping_interval: Duration,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_DIALER_PORT,
            ping_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl DialerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
