//! OS uptime and load average via the `uptime` command.
//!
//! Three invocations run concurrently: `uptime -p` (pretty), `uptime -s`
//! (boot time) and plain `uptime` (raw, parsed for load averages). Each is
//! time-boxed on its own; a failed one leaves its field `None`. A variant's
//! failure is logged once, then suppressed until that same variant succeeds
//! again, so a host that only supports plain `uptime` logs each unsupported
//! variant a single time.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

static LOAD_AVERAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"load averages?:\s*(.+)$").expect("static pattern"));

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Uptime section of the status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeInfo {
    /// `uptime -p`, e.g. "up 3 hours, 2 minutes"
    pub pretty: Option<String>,
    /// `uptime -s`, the boot timestamp
    pub since: Option<String>,
    /// Plain `uptime` output
    pub raw: Option<String>,
    /// 1/5/15 minute load averages parsed from `raw`
    pub load_average: Option<Vec<f64>>,
}

impl UptimeInfo {
    fn is_empty(&self) -> bool {
        self.pretty.is_none() && self.since.is_none() && self.raw.is_none()
    }
}

/// One of the three `uptime` invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UptimeVariant {
    Pretty,
    Since,
    Raw,
}

impl UptimeVariant {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Pretty => &["-p"],
            Self::Since => &["-s"],
            Self::Raw => &[],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Runs the uptime command and remembers, per variant, whether a failure was
/// already logged.
#[derive(Debug)]
pub struct UptimeProbe {
    program: String,
    timeout: Duration,
    failure_logged: [AtomicBool; 3],
}

impl UptimeProbe {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            failure_logged: Default::default(),
        }
    }

    /// Gather all three variants. `None` when every invocation failed.
    pub async fn probe(&self) -> Option<UptimeInfo> {
        let (pretty, since, raw) = tokio::join!(
            self.invoke(UptimeVariant::Pretty),
            self.invoke(UptimeVariant::Since),
            self.invoke(UptimeVariant::Raw),
        );
        let load_average = raw.as_deref().and_then(parse_load_average);
        let info = UptimeInfo {
            pretty,
            since,
            raw,
            load_average,
        };
        (!info.is_empty()).then_some(info)
    }

    /// Whether `variant` has a logged failure that has not yet been cleared.
    pub fn is_suppressing(&self, variant: UptimeVariant) -> bool {
        self.failure_logged[variant.index()].load(Ordering::Relaxed)
    }

    async fn invoke(&self, variant: UptimeVariant) -> Option<String> {
        let logged = &self.failure_logged[variant.index()];
        match self.run(variant.args()).await {
            Ok(output) => {
                logged.store(false, Ordering::Relaxed);
                Some(output)
            },
            Err(e) => {
                if !logged.swap(true, Ordering::Relaxed) {
                    warn!(?variant, error = %e, "Uptime probe failed; further failures suppressed until it recovers");
                }
                None
            },
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ProbeError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ProbeError::Timeout {
                program: self.program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ProbeError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Extract the load averages from raw `uptime` output. Handles both
/// `load average: 0.10, 0.20, 0.30` and `load averages: 1.10 1.20 1.30`.
pub fn parse_load_average(raw: &str) -> Option<Vec<f64>> {
    let clause = LOAD_AVERAGE.captures(raw.trim())?.get(1)?.as_str();
    let values: Vec<f64> = clause
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    (!values.is_empty()).then_some(values)
}
