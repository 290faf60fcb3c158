//! Local login seed file.
//!
//! `login-seed.json` lists the kiosk's local users. Preparing it creates a
//! default administrator when the file is missing and replaces every
//! plaintext `password` with a salted `password_hash`, so the file never
//! keeps a cleartext credential after the first run.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "change-me-now";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to {action} seed file {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("seed file {} is not valid: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Seed file must contain a \"users\" array.")]
    MissingUsers,

    #[error("User {username} is missing a \"password\" or \"password_hash\" field.")]
    MissingPassword { username: String },
}

#[derive(Debug, Clone, Deserialize)]
struct SeedEntry {
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    password_hash: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

/// A user as written back to the seed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub password_hash: String,
    pub metadata: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeedFile<'a> {
    users: &'a [SeedUser],
    last_synchronized_at: String,
}

/// What [`prepare`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    /// The file did not exist and the default seed was written
    pub created: bool,
    /// Users whose plaintext password was replaced by a hash
    pub hashed: usize,
    pub users: Vec<SeedUser>,
}

/// Create the seed file if needed, hash plaintext passwords and rewrite it.
pub async fn prepare(path: &Path) -> Result<SeedReport, SeedError> {
    let io_err = |action: &'static str| {
        move |source| SeedError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    };

    let created = !tokio::fs::try_exists(path).await.map_err(io_err("inspect"))?;
    if created {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_err("create directory for"))?;
        }
        write_pretty(path, &default_seed()).await?;
        info!(path = %path.display(), "Created seed file");
    }

    let raw = tokio::fs::read_to_string(path).await.map_err(io_err("read"))?;
    let parsed: Value = serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(entries) = parsed.get("users").filter(|users| users.is_array()) else {
        return Err(SeedError::MissingUsers);
    };
    let entries: Vec<SeedEntry> =
        serde_json::from_value(entries.clone()).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut hashed = 0;
    let mut users = Vec::with_capacity(entries.len());
    for entry in entries {
        let password_hash = match (entry.password_hash, entry.password) {
            (Some(hash), _) if !hash.is_empty() => hash,
            (_, Some(password)) if !password.is_empty() => {
                hashed += 1;
                hash_password(&password)
            },
            _ => {
                return Err(SeedError::MissingPassword {
                    username: entry.username,
                })
            },
        };
        users.push(SeedUser {
            username: entry.username,
            password_hash,
            metadata: entry.metadata.unwrap_or_else(|| json!({})),
        });
    }

    let file = SeedFile {
        users: &users,
        last_synchronized_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    write_pretty(path, &file).await?;
    info!(path = %path.display(), users = users.len(), hashed, "Seed file updated with password hashes");

    Ok(SeedReport {
        created,
        hashed,
        users,
    })
}

/// `"<salt>:<sha256(salt:password)>"`, both halves lowercase hex.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = digest_hex(&salt, password);
    format!("{salt}:{digest}")
}

/// Check `candidate` against a stored `salt:hash` pair.
pub fn verify_password(candidate: &str, stored: &str) -> bool {
    match stored.split_once(':') {
        Some((salt, hash)) => digest_hex(salt, candidate) == hash,
        None => false,
    }
}

fn digest_hex(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn default_seed() -> Value {
    json!({
        "users": [{
            "username": DEFAULT_USERNAME,
            "password": DEFAULT_PASSWORD,
            "metadata": {
                "role": "administrator",
                "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        }],
        "notes": "Update the default credentials immediately after installation.",
    })
}

async fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), SeedError> {
    let mut body = serde_json::to_string_pretty(value).map_err(|source| SeedError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    body.push('\n');
    tokio::fs::write(path, body)
        .await
        .map_err(|source| SeedError::Io {
            action: "write",
            path: path.to_path_buf(),
            source,
        })
}
