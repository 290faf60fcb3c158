//! The live cookie jar seen by the embedded browser view.
//!
//! [`CookieStore`] is the seam between persistence and whatever holds the
//! session's cookies. [`MemoryCookieStore`] is the in-process jar the
//! service uses; the GUI shell feeds it change events over HTTP and reads
//! it back at launch. Every change is announced on a broadcast channel.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

use super::record::{Cookie, CookieRecord};

/// Capacity of the change-notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum CookieError {
    /// The jar refused a cookie.
    #[error("cookie '{name}' rejected: {reason}")]
    Rejected { name: String, reason: String },

    #[error("failed to {action} cookie file '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode cookie snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A change observed in the live jar.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieChange {
    pub cookie: Cookie,
    pub removed: bool,
}

/// Access to the live cookie jar.
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// Every cookie currently held.
    async fn get_all(&self) -> Result<Vec<Cookie>, CookieError>;

    /// Insert or replace the cookie described by `record`.
    async fn set(&self, record: &CookieRecord) -> Result<(), CookieError>;

    /// Drop the cookie with the same domain, path and name as `record`.
    async fn remove(&self, record: &CookieRecord) -> Result<(), CookieError>;
}

/// In-process cookie jar keyed by (domain, path, name).
#[derive(Debug)]
pub struct MemoryCookieStore {
    cookies: Mutex<BTreeMap<(String, String, String), Cookie>>,
    changes: broadcast::Sender<CookieChange>,
}

impl Default for MemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            cookies: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    /// Subscribe to jar changes.
    pub fn subscribe(&self) -> broadcast::Receiver<CookieChange> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }

    fn announce(&self, cookie: Cookie, removed: bool) {
        // No subscribers is not an error.
        let _ = self.changes.send(CookieChange { cookie, removed });
    }
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn get_all(&self) -> Result<Vec<Cookie>, CookieError> {
        Ok(self.cookies.lock().values().cloned().collect())
    }

    async fn set(&self, record: &CookieRecord) -> Result<(), CookieError> {
        let cookie = to_cookie(record)?;
        let now = Utc::now().timestamp() as f64;
        if cookie.is_expired_at(now) {
            // Setting an already-expired cookie deletes it, as browsers do.
            return self.remove(record).await;
        }
        self.cookies.lock().insert(cookie.key(), cookie.clone());
        self.announce(cookie, false);
        Ok(())
    }

    async fn remove(&self, record: &CookieRecord) -> Result<(), CookieError> {
        let cookie = to_cookie(record)?;
        let removed = self.cookies.lock().remove(&cookie.key());
        if let Some(removed) = removed {
            self.announce(removed, true);
        }
        Ok(())
    }
}

/// Validate a record and turn it into a jar entry. A record without its own
/// `domain` takes the host of its `url`.
fn to_cookie(record: &CookieRecord) -> Result<Cookie, CookieError> {
    let reject = |reason: &str| CookieError::Rejected {
        name: record.name.clone(),
        reason: reason.to_string(),
    };
    if record.name.is_empty() {
        return Err(reject("empty name"));
    }
    let host = url_host(&record.url).ok_or_else(|| reject("url must be http(s) with a host"))?;
    let domain = if record.domain.is_empty() {
        host.clone()
    } else {
        record.domain.clone()
    };
    let bare = domain.trim_start_matches('.').to_ascii_lowercase();
    if host != bare && !host.ends_with(&format!(".{bare}")) {
        return Err(reject("domain does not match url"));
    }
    Ok(Cookie {
        name: record.name.clone(),
        value: record.value.clone(),
        domain,
        path: record.path.clone(),
        secure: record.secure,
        http_only: record.http_only,
        same_site: record.same_site,
        expiration_date: record.expiration_date,
        priority: record.priority.clone(),
    })
}

/// Host of an http(s) URL, lowercased by the parser. IPv6 hosts keep their
/// brackets.
fn url_host(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str().map(str::to_string)
}
