/*!
 * Path and UNC utilities
 *
 * All relative paths inside the engine use forward slashes; UNC roots come
 * in as `\\server\share\path` or `//server/share/path` and may mix
 * separators freely.
 */

use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Parsed UNC remote root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncPath {
    pub server: String,
    pub share: String,
    /// Share-relative base, forward-slashed, empty for the share root
    pub path: String,
}

impl UncPath {
    /// Parse `\\server\share\path` (either separator, extra leading slashes
    /// tolerated)
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize_separators(raw);
        let trimmed = normalized.trim_start_matches('/');

        let mut parts = trimmed.splitn(3, '/');
        let server = parts.next().unwrap_or_default();
        let share = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        if server.is_empty() || share.is_empty() {
            return Err(SyncError::InvalidPath(format!(
                "UNC path must name a server and share: {raw}"
            )));
        }

        Ok(UncPath {
            server: server.to_string(),
            share: share.to_string(),
            path: rest.trim_matches('/').to_string(),
        })
    }

    /// Re-join a file path relative to this UNC base into a share-relative
    /// path for the remote client
    pub fn join(&self, rel: &str) -> String {
        join_remote(&self.path, rel)
    }
}

impl std::fmt::Display for UncPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, r"\\{}\{}", self.server, self.share)?;
        if !self.path.is_empty() {
            write!(f, r"\{}", self.path.replace('/', r"\"))?;
        }
        Ok(())
    }
}

/// Normalize separators to forward slashes and collapse runs
///
/// Idempotent: `normalize_separators(normalize_separators(p)) ==
/// normalize_separators(p)`. A UNC-style leading double slash is preserved.
pub fn normalize_separators(path: &str) -> String {
    let swapped = path.replace('\\', "/");
    let leading = swapped.len() - swapped.trim_start_matches('/').len();

    let mut out = String::with_capacity(swapped.len());
    // keep at most two leading slashes so `\\server` survives
    out.push_str(&"/".repeat(leading.min(2)));

    let mut prev_slash = false;
    for c in swapped.trim_start_matches('/').chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Produce the forward-slashed path of `path` relative to `base`
///
/// Returns `None` when `path` does not live under `base`.
pub fn relativize(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            std::path::Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            std::path::Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Join a forward-slashed relative path under a base, skipping empty parts
pub fn join_remote(base: &str, rel: &str) -> String {
    let base = base.trim_matches('/');
    let rel = rel.trim_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (true, true) => String::new(),
        (true, false) => rel.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rel}"),
    }
}

/// Resolve a forward-slashed relative path under a local root directory
pub fn to_local(root: &Path, rel: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for part in rel.split('/').filter(|p| !p.is_empty()) {
        out.push(part);
    }
    out
}

/// Whether a stored relative path carries drive-letter corruption
///
/// Rows like `C:\Users\...` or `C:/...` in `files_state` are remnants of a
/// pre-relativization schema and are purged at startup.
pub fn is_corrupt_relative(path: &str) -> bool {
    path.contains(":\\") || path.contains(":/")
}
