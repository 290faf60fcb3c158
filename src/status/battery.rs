//! Best-effort battery reading from sysfs.

use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatteryInfo {
    /// Charge percentage, 0-100
    pub capacity: u8,
    /// Kernel-reported state, e.g. "Charging" or "Discharging"
    pub status: String,
}

/// Reads `capacity` and `status` from a power-supply directory.
#[derive(Debug, Clone)]
pub struct BatteryProbe {
    dir: PathBuf,
}

impl BatteryProbe {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` when either file is missing or the capacity does not parse.
    pub async fn read(&self) -> Option<BatteryInfo> {
        let (capacity, status) = tokio::join!(
            tokio::fs::read_to_string(self.dir.join("capacity")),
            tokio::fs::read_to_string(self.dir.join("status")),
        );
        let capacity = capacity.ok()?.trim().parse::<u8>().ok()?.min(100);
        let status = status.ok()?.trim().to_string();
        Some(BatteryInfo { capacity, status })
    }
}
