//! Request path resolution
//!
//! Maps an HTTP request path onto a file inside one of the configured
//! roots. Resolution is lexical: `..` segments are refused outright, a
//! handful of first-segment prefixes switch to auxiliary roots, and bare
//! routes in the main root get an `.html` extension. [`PathResolver::confine`]
//! repeats the containment check on the real (symlink-resolved) path before
//! anything is read.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Page served for `/`.
const ROOT_PAGE: &str = "menu.html";
/// Page served for any other path ending in `/`.
const DIRECTORY_PAGE: &str = "index.html";

/// Why a request path was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The path tries to leave its root.
    #[error("path escapes the content root: {0}")]
    Traversal(String),

    /// The path is not valid percent-encoded UTF-8 or contains a NUL byte.
    #[error("malformed request path: {0}")]
    Malformed(String),

    /// An auxiliary prefix without a file name after it.
    #[error("no file named under auxiliary root '{0}'")]
    EmptyAuxiliary(String),
}

/// Which root a resolved path belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootKind {
    Content,
    Auxiliary(String),
}

/// A request path mapped into a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub root: PathBuf,
    pub kind: RootKind,
}

/// Sandboxed mapping from request paths to files.
#[derive(Debug, Clone)]
pub struct PathResolver {
    content_root: PathBuf,
    aux_roots: BTreeMap<String, PathBuf>,
}

impl PathResolver {
    /// Create a resolver over `content_root`. Relative roots are anchored at
    /// the current working directory.
    pub fn new(content_root: impl AsRef<Path>) -> Self {
        Self {
            content_root: absolutize(content_root.as_ref()),
            aux_roots: BTreeMap::new(),
        }
    }

    /// Route requests whose first segment is `prefix` to `root`.
    pub fn with_aux_root(mut self, prefix: impl Into<String>, root: impl AsRef<Path>) -> Self {
        self.aux_roots
            .insert(prefix.into(), absolutize(root.as_ref()));
        self
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Resolve a raw (possibly percent-encoded) request path.
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedPath, ResolveError> {
        let decoded = urlencoding::decode(request_path)
            .map_err(|_| ResolveError::Malformed(request_path.to_string()))?;
        if decoded.contains('\0') {
            return Err(ResolveError::Malformed(request_path.to_string()));
        }
        // Backslashes count as separators so `..\\` cannot slip through.
        let unified = decoded.replace('\\', "/");

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {},
                ".." => return Err(ResolveError::Traversal(request_path.to_string())),
                other => segments.push(other),
            }
        }

        let wants_directory = unified.is_empty() || unified.ends_with('/');
        let implied_page = if segments.is_empty() {
            Some(ROOT_PAGE)
        } else if wants_directory {
            Some(DIRECTORY_PAGE)
        } else {
            None
        };

        let (root, kind, rest) = match segments.split_first() {
            Some((first, rest)) if self.aux_roots.contains_key(*first) => {
                if rest.is_empty() {
                    return Err(ResolveError::EmptyAuxiliary((*first).to_string()));
                }
                (
                    self.aux_roots[*first].clone(),
                    RootKind::Auxiliary((*first).to_string()),
                    rest,
                )
            },
            _ => (self.content_root.clone(), RootKind::Content, segments.as_slice()),
        };

        let mut path = root.clone();
        for segment in rest {
            path.push(segment);
        }
        if let Some(page) = implied_page {
            path.push(page);
        }

        if !is_within(&path, &root) {
            return Err(ResolveError::Traversal(request_path.to_string()));
        }

        if kind == RootKind::Content && path.extension().is_none() {
            path.set_extension("html");
        }

        Ok(ResolvedPath { path, root, kind })
    }

    /// Check that the real location of `resolved` is still inside its root
    /// once symlinks are followed.
    ///
    /// Returns the canonical path, the underlying I/O error when the file
    /// cannot be canonicalized (missing file included), or `Ok(None)` when the
    /// real path escapes.
    pub async fn confine(&self, resolved: &ResolvedPath) -> std::io::Result<Option<PathBuf>> {
        let real = tokio::fs::canonicalize(&resolved.path).await?;
        let real_root = tokio::fs::canonicalize(&resolved.root).await?;
        Ok(real.starts_with(&real_root).then_some(real))
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lexical containment: every component of `root` prefixes `path` and no
/// component after it is a parent reference.
fn is_within(path: &Path, root: &Path) -> bool {
    match path.strip_prefix(root) {
        Ok(rest) => rest
            .components()
            .all(|component| matches!(component, Component::Normal(_))),
        Err(_) => false,
    }
}
