//! Debounced cookie snapshot persistence.
//!
//! [`CookiePersistence::mark_dirty`] (re)arms a single timer; only a timer
//! that runs out without being re-armed takes a snapshot of the jar and
//! writes it. [`CookiePersistence::flush_now`] cancels any armed timer and
//! writes immediately, which is what shutdown uses so the last observed
//! state is never lost inside a debounce window.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::record::CookieRecord;
use super::store::{CookieChange, CookieError, CookieStore};

/// Outcome of a startup restore.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Records replayed into the jar
    pub restored: usize,
    /// Entries dropped for lacking `url`/`name` or being malformed
    pub skipped: usize,
    /// Records the jar refused
    pub failed: usize,
}

/// Owns the cookie snapshot file and the debounce timer.
pub struct CookiePersistence {
    store: Arc<dyn CookieStore>,
    path: PathBuf,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    write_lock: tokio::sync::Mutex<()>,
    writes: AtomicU64,
}

impl std::fmt::Debug for CookiePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookiePersistence")
            .field("path", &self.path)
            .field("debounce", &self.debounce)
            .field("writes", &self.writes())
            .finish_non_exhaustive()
    }
}

impl CookiePersistence {
    pub fn new(store: Arc<dyn CookieStore>, path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            store,
            path: path.into(),
            debounce,
            pending: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            writes: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of snapshots written so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Whether a debounce timer is currently armed.
    pub fn is_dirty(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Replay the snapshot file into the jar.
    ///
    /// A missing file is a no-op and an unreadable or malformed file is
    /// logged and ignored. Each record is replayed on its own; a refused
    /// record is logged and the rest continue.
    pub async fn restore(&self) -> RestoreSummary {
        let mut summary = RestoreSummary::default();
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return summary,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read cookie snapshot");
                return summary;
            },
        };
        let entries: Vec<Value> = match serde_json::from_slice(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed cookie snapshot");
                return summary;
            },
        };

        for entry in entries {
            let Some(record) = CookieRecord::from_snapshot_entry(entry) else {
                summary.skipped += 1;
                continue;
            };
            match self.store.set(&record).await {
                Ok(()) => summary.restored += 1,
                Err(e) => {
                    warn!(name = %record.name, url = %record.url, error = %e, "Failed to restore cookie");
                    summary.failed += 1;
                },
            }
        }
        info!(
            restored = summary.restored,
            skipped = summary.skipped,
            failed = summary.failed,
            "Cookie session restored"
        );
        summary
    }

    /// Arm (or re-arm) the debounce timer.
    pub fn mark_dirty(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            if let Err(e) = this.persist().await {
                warn!(error = %e, "Debounced cookie persist failed");
            }
        }));
    }

    /// Cancel any armed timer and write a snapshot now.
    pub async fn flush_now(&self) -> Result<(), CookieError> {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
        self.persist().await
    }

    /// Re-arm the timer for every change announced on `changes` until the
    /// channel closes.
    pub fn watch(self: &Arc<Self>, mut changes: broadcast::Receiver<CookieChange>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        debug!(name = %change.cookie.name, removed = change.removed, "Cookie changed");
                        this.mark_dirty();
                    },
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "Cookie change listener lagged");
                        this.mark_dirty();
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Snapshot the jar and rewrite the file.
    async fn persist(&self) -> Result<(), CookieError> {
        let _guard = self.write_lock.lock().await;
        let cookies = self.store.get_all().await?;
        let records: Vec<CookieRecord> = cookies
            .iter()
            .filter_map(|cookie| match CookieRecord::try_from(cookie) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(name = %cookie.name, domain = %cookie.domain, error = %e, "Leaving cookie out of snapshot");
                    None
                },
            })
            .collect();
        let body = serde_json::to_vec_pretty(&records)?;

        let io_error = |action, source| CookieError::Io {
            action,
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory for", e))?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, &body)
            .await
            .map_err(|e| io_error("write", e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| io_error("replace", e))?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(count = records.len(), path = %self.path.display(), "Cookie snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::record::SameSite;
    use crate::cookies::store::MemoryCookieStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(name: &str, value: &str) -> CookieRecord {
        CookieRecord {
            url: "http://kiosk.local/".to_string(),
            name: name.to_string(),
            value: value.to_string(),
            domain: "kiosk.local".to_string(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: SameSite::Lax,
            expiration_date: None,
            priority: None,
        }
    }

    fn read_snapshot(path: &Path) -> Vec<CookieRecord> {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn missing_or_malformed_snapshot_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryCookieStore::new());
        let path = dir.path().join("cookies.json");
        let persistence = CookiePersistence::new(store.clone(), &path, Duration::from_millis(10));

        assert_eq!(persistence.restore().await, RestoreSummary::default());
        std::fs::write(&path, "[{ broken").unwrap();
        assert_eq!(persistence.restore().await, RestoreSummary::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn restore_skips_partial_entries_and_survives_refusals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&json!([
                { "url": "http://kiosk.local/", "name": "sid", "value": "1", "domain": "kiosk.local" },
                { "name": "no-url", "value": "x" },
                { "url": "http://kiosk.local/", "name": "bad", "domain": "other.example" },
                { "url": "https://kiosk.local/", "name": "lang", "value": "fr", "domain": ".kiosk.local", "secure": true }
            ]))
            .unwrap(),
        )
        .unwrap();

        let store = Arc::new(MemoryCookieStore::new());
        let persistence = CookiePersistence::new(store.clone(), &path, Duration::from_millis(10));
        let summary = persistence.restore().await;

        assert_eq!(
            summary,
            RestoreSummary {
                restored: 2,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(store.len(), 2);
    }

    /// Let the paused clock run until `count` snapshots have been written.
    async fn wait_for_writes(persistence: &CookiePersistence, count: u64) {
        for _ in 0..1_000 {
            if persistence.writes() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} snapshot writes, saw {}", persistence.writes());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_coalesce_into_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let store = Arc::new(MemoryCookieStore::new());
        let persistence = Arc::new(CookiePersistence::new(
            store.clone(),
            &path,
            Duration::from_millis(300),
        ));

        // Ten changes over 500ms, each closer to the last than the debounce.
        for n in 0..10 {
            store.set(&record("counter", &n.to_string())).await.unwrap();
            persistence.mark_dirty();
            tokio::time::advance(Duration::from_millis(50)).await;
        }
        assert!(persistence.is_dirty());
        assert_eq!(persistence.writes(), 0);

        wait_for_writes(&persistence, 1).await;
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(persistence.writes(), 1);
        let snapshot = read_snapshot(&path);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value, "9");
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_turns_jar_changes_into_a_debounced_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let store = Arc::new(MemoryCookieStore::new());
        let persistence = Arc::new(CookiePersistence::new(
            store.clone(),
            &path,
            Duration::from_millis(300),
        ));
        let watcher = persistence.watch(store.subscribe());

        store.set(&record("a", "1")).await.unwrap();
        store.set(&record("b", "2")).await.unwrap();
        wait_for_writes(&persistence, 1).await;
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(persistence.writes(), 1);
        assert_eq!(read_snapshot(&path).len(), 2);
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn flush_now_cancels_the_pending_timer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cookies.json");
        let store = Arc::new(MemoryCookieStore::new());
        let persistence = Arc::new(CookiePersistence::new(
            store.clone(),
            &path,
            Duration::from_millis(300),
        ));

        store.set(&record("sid", "final")).await.unwrap();
        persistence.mark_dirty();
        persistence.flush_now().await.unwrap();
        assert!(!persistence.is_dirty());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(persistence.writes(), 1);
        assert_eq!(read_snapshot(&path)[0].value, "final");
        assert_eq!(read_snapshot(&path)[0].url, "http://kiosk.local/");
    }

    #[tokio::test]
    async fn ipv6_cookie_survives_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let first = Arc::new(MemoryCookieStore::new());
        let mut local = record("sid", "v6");
        local.url = "http://[::1]:5000/".to_string();
        local.domain = String::new();
        first.set(&local).await.unwrap();
        CookiePersistence::new(first, &path, Duration::from_millis(10))
            .flush_now()
            .await
            .unwrap();

        let snapshot = read_snapshot(&path);
        assert_eq!(snapshot[0].domain, "[::1]");
        assert_eq!(snapshot[0].url, "http://[::1]/");

        let second = Arc::new(MemoryCookieStore::new());
        let summary = CookiePersistence::new(second.clone(), &path, Duration::from_millis(10))
            .restore()
            .await;
        assert_eq!(summary.restored, 1);
        assert_eq!(second.get_all().await.unwrap()[0].value, "v6");
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let first = Arc::new(MemoryCookieStore::new());
        first.set(&record("sid", "abc")).await.unwrap();
        CookiePersistence::new(first, &path, Duration::from_millis(10))
            .flush_now()
            .await
            .unwrap();

        let second = Arc::new(MemoryCookieStore::new());
        let summary = CookiePersistence::new(second.clone(), &path, Duration::from_millis(10))
            .restore()
            .await;
        assert_eq!(summary.restored, 1);
        assert_eq!(second.get_all().await.unwrap()[0].value, "abc");
    }
}
