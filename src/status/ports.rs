//! TCP port liveness with transition tracking.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::info;

/// One liveness observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortStatus {
    pub port: u16,
    pub up: bool,
    /// When `up` last changed
    pub since: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    up: bool,
    since: DateTime<Utc>,
}

/// Try a TCP connection within `timeout`. The stream, if any, is dropped
/// (closed) before returning.
pub async fn check_port(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Probes a fixed port set and remembers when each port last flipped.
#[derive(Debug)]
pub struct PortMonitor {
    host: IpAddr,
    ports: Vec<u16>,
    timeout: Duration,
    transitions: Mutex<HashMap<u16, Transition>>,
}

impl PortMonitor {
    pub fn new(host: IpAddr, ports: Vec<u16>, timeout: Duration) -> Self {
        Self {
            host,
            ports,
            timeout,
            transitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Probe every port in order, each within its own timeout.
    pub async fn probe(&self) -> Vec<PortStatus> {
        let mut statuses = Vec::with_capacity(self.ports.len());
        for &port in &self.ports {
            let up = check_port(SocketAddr::new(self.host, port), self.timeout).await;
            statuses.push(self.record(port, up, Utc::now()));
        }
        statuses
    }

    /// Fold one observation into the transition map. `since` moves only when
    /// `up` differs from the previous observation.
    pub fn record(&self, port: u16, up: bool, now: DateTime<Utc>) -> PortStatus {
        let mut transitions = self.transitions.lock();
        let transition = transitions
            .entry(port)
            .and_modify(|previous| {
                if previous.up != up {
                    info!(port, up, "Port state changed");
                    *previous = Transition { up, since: now };
                }
            })
            .or_insert(Transition { up, since: now });
        PortStatus {
            port,
            up,
            since: transition.since,
            checked_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn since_moves_only_on_transition() {
        let monitor = PortMonitor::new(LOCALHOST, vec![5000], Duration::from_millis(50));
        let t0 = Utc::now();
        let t1 = t0 + ChronoDuration::seconds(1);
        let t2 = t0 + ChronoDuration::seconds(2);
        let t3 = t0 + ChronoDuration::seconds(3);

        let down = monitor.record(5000, false, t0);
        assert_eq!(down.since, t0);
        let up = monitor.record(5000, true, t1);
        assert_eq!(up.since, t1);
        let still_up = monitor.record(5000, true, t2);
        assert_eq!(still_up.since, t1);
        assert_eq!(still_up.checked_at, t2);
        let again = monitor.record(5000, true, t3);
        assert_eq!(again.since, t1);
    }

    #[tokio::test]
    async fn open_port_is_up_and_closed_port_is_down() {
        let listener = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let open = listener.local_addr().unwrap();

        let closed = {
            let spare = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
            spare.local_addr().unwrap()
        };

        assert!(check_port(open, Duration::from_millis(750)).await);
        assert!(!check_port(closed, Duration::from_millis(750)).await);
    }

    #[tokio::test]
    async fn probe_reports_every_monitored_port() {
        let listener = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let monitor = PortMonitor::new(LOCALHOST, vec![open], Duration::from_millis(750));

        let first = monitor.probe().await;
        assert_eq!(first.len(), 1);
        assert!(first[0].up);

        let second = monitor.probe().await;
        assert_eq!(second[0].since, first[0].since);
    }
}
