//! Cookie shapes: the live [`Cookie`] held by the jar and the
//! [`CookieRecord`] written to disk.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Browser `SameSite` policy, spelled the way the embedded view reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    #[default]
    Unspecified,
    NoRestriction,
    Lax,
    Strict,
}

/// A cookie as the live jar holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
    /// Expiry in epoch seconds; `None` for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl Cookie {
    /// Identity of a cookie inside the jar.
    pub fn key(&self) -> (String, String, String) {
        (
            self.domain.trim_start_matches('.').to_ascii_lowercase(),
            self.path.clone(),
            self.name.clone(),
        )
    }

    /// URL the cookie can be replayed against: scheme from `secure`, host
    /// from `domain`, and the cookie's own path.
    pub fn restore_url(&self) -> Result<Url, url::ParseError> {
        let base = if self.secure {
            "https://localhost/"
        } else {
            "http://localhost/"
        };
        let mut url = Url::parse(base)?;
        url.set_host(Some(self.domain.trim_start_matches('.')))?;
        if self.path.starts_with('/') {
            url.set_path(&self.path);
        }
        Ok(url)
    }

    pub fn is_expired_at(&self, epoch_seconds: f64) -> bool {
        self.expiration_date
            .is_some_and(|expires| expires <= epoch_seconds)
    }
}

/// A cookie as persisted in the snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    /// Reconstructed from domain, `secure` and path; not the request URL
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl TryFrom<&Cookie> for CookieRecord {
    type Error = url::ParseError;

    fn try_from(cookie: &Cookie) -> Result<Self, Self::Error> {
        Ok(Self {
            url: cookie.restore_url()?.into(),
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
            same_site: cookie.same_site,
            expiration_date: cookie.expiration_date,
            priority: cookie.priority.clone(),
        })
    }
}

impl CookieRecord {
    /// Decode one snapshot entry. Entries without a non-empty `url` and
    /// `name`, or that do not match the record shape, yield `None`.
    pub fn from_snapshot_entry(entry: Value) -> Option<Self> {
        let has_text = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .is_some_and(|text| !text.is_empty())
        };
        if !has_text("url") || !has_text("name") {
            return None;
        }
        serde_json::from_value(entry).ok()
    }
}

fn default_path() -> String {
    "/".to_string()
}
