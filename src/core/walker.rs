/*!
 * Local directory traversal
 *
 * Depth-first walk over a job's local tree. Exclusion decisions are taken
 * inside the walk so an excluded directory prunes its whole subtree.
 * Symlinks are skipped unless following is enabled; per-entry stat and
 * permission failures are recorded and the walk continues.
 */

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::core::exclusion::ExclusionMatcher;
use crate::core::paths::relativize;
use crate::error::{Result, SyncError};

/// Metadata for one walked entry, from a single stat
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Forward-slashed path relative to the walk root
    pub rel_path: String,
    pub size: u64,
    pub mtime: SystemTime,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub mode: u32,
}

/// Counters accumulated over one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkerStats {
    pub files: u64,
    pub dirs: u64,
    pub excluded: u64,
    pub symlinks_skipped: u64,
    pub placeholders_skipped: u64,
    pub errors: u64,
}

/// A per-entry failure the walk recorded and stepped over
#[derive(Debug, Clone)]
pub struct WalkEntryError {
    pub path: Option<PathBuf>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct WalkerOptions {
    /// Follow symlinks into their targets (loops are detected and reported
    /// as entry errors)
    pub follow_symlinks: bool,
    /// Skip files the OS keeps as cloud placeholders, so a scan does not
    /// force hydration
    pub skip_placeholders: bool,
}

/// Result of one walk: counters plus the errors stepped over
#[derive(Debug, Default)]
pub struct WalkReport {
    pub stats: WalkerStats,
    pub errors: Vec<WalkEntryError>,
}

pub struct Walker<'a> {
    root: &'a Path,
    matcher: &'a ExclusionMatcher,
    options: WalkerOptions,
}

impl<'a> Walker<'a> {
    pub fn new(root: &'a Path, matcher: &'a ExclusionMatcher, options: WalkerOptions) -> Self {
        Self {
            root,
            matcher,
            options,
        }
    }

    /// Walk the tree, invoking `on_file` for every regular file kept
    ///
    /// Fails fast when the root itself is unreadable or the token is
    /// cancelled; everything below the root is error-tolerant.
    pub fn walk(
        &self,
        cancel: &CancelToken,
        mut on_file: impl FnMut(FileMetadata),
    ) -> Result<WalkReport> {
        fs::metadata(self.root).map_err(|e| SyncError::from_io(e, self.root))?;

        let mut report = WalkReport::default();
        let excluded = Cell::new(0u64);

        let root = self.root;
        let matcher = self.matcher;
        let iter = WalkDir::new(root)
            .follow_links(self.options.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let Some(rel) = relativize(entry.path(), root) else {
                    return true;
                };
                let is_dir = entry.file_type().is_dir();
                if matcher.is_excluded(&rel, &entry.path().to_string_lossy(), is_dir) {
                    excluded.set(excluded.get() + 1);
                    false
                } else {
                    true
                }
            });

        for entry in iter {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    report.stats.errors += 1;
                    report.errors.push(WalkEntryError {
                        path: err.path().map(Path::to_path_buf),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            if entry.file_type().is_symlink() {
                // reached only when follow_symlinks is off
                report.stats.symlinks_skipped += 1;
                continue;
            }

            if entry.file_type().is_dir() {
                report.stats.dirs += 1;
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    report.stats.errors += 1;
                    report.errors.push(WalkEntryError {
                        path: Some(entry.path().to_path_buf()),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            if self.options.skip_placeholders && is_cloud_placeholder(&metadata) {
                report.stats.placeholders_skipped += 1;
                continue;
            }

            let Some(rel_path) = relativize(entry.path(), root) else {
                continue;
            };

            report.stats.files += 1;
            on_file(FileMetadata {
                path: entry.path().to_path_buf(),
                rel_path,
                size: metadata.len(),
                mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                is_dir: false,
                is_symlink: false,
                mode: unix_mode(&metadata),
            });
        }

        report.stats.excluded = excluded.get();
        Ok(report)
    }
}

/// Whether this file is a cloud-files placeholder ("recall on data access")
///
/// Reading such a file would force the OS to hydrate it from the provider.
#[cfg(windows)]
pub fn is_cloud_placeholder(metadata: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS: u32 = 0x0040_0000;
    metadata.file_attributes() & FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS != 0
}

#[cfg(not(windows))]
pub fn is_cloud_placeholder(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn unix_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &fs::Metadata) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn collect(root: &Path, matcher: &ExclusionMatcher) -> (Vec<String>, WalkReport) {
        let walker = Walker::new(root, matcher, WalkerOptions::default());
        let mut seen = Vec::new();
        let report = walker
            .walk(&CancelToken::new(), |meta| seen.push(meta.rel_path))
            .unwrap();
        seen.sort();
        (seen, report)
    }

    #[test]
    fn emits_regular_files_with_relative_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/deep")).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("sub/b.txt"), "bb").unwrap();
        fs::write(dir.path().join("sub/deep/c.txt"), "ccc").unwrap();

        let (seen, report) = collect(dir.path(), &ExclusionMatcher::empty());
        assert_eq!(seen, vec!["a.txt", "sub/b.txt", "sub/deep/c.txt"]);
        assert_eq!(report.stats.files, 3);
        assert_eq!(report.stats.dirs, 2);
        assert_eq!(report.stats.errors, 0);
    }

    #[test]
    fn excluded_directory_prunes_subtree() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join("keep.js"), "x").unwrap();

        let matcher = ExclusionMatcher::with_defaults().unwrap();
        let (seen, report) = collect(dir.path(), &matcher);

        assert_eq!(seen, vec!["keep.js"]);
        assert_eq!(report.stats.excluded, 1);
    }

    #[test]
    fn excluded_files_are_counted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("work.txt"), "x").unwrap();
        fs::write(dir.path().join("junk.tmp"), "x").unwrap();

        let matcher = ExclusionMatcher::with_defaults().unwrap();
        let (seen, report) = collect(dir.path(), &matcher);

        assert_eq!(seen, vec!["work.txt"]);
        assert_eq!(report.stats.excluded, 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_skipped_by_default() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let (seen, report) = collect(dir.path(), &ExclusionMatcher::empty());
        assert_eq!(seen, vec!["real.txt"]);
        assert_eq!(report.stats.symlinks_skipped, 1);
    }

    #[cfg(unix)]
    #[test]
    fn followed_symlink_dir_is_traversed() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/inner.txt"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("alias")).unwrap();

        let matcher = ExclusionMatcher::empty();
        let walker = Walker::new(
            dir.path(),
            &matcher,
            WalkerOptions {
                follow_symlinks: true,
                ..Default::default()
            },
        );
        let mut seen = Vec::new();
        walker
            .walk(&CancelToken::new(), |meta| seen.push(meta.rel_path))
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec!["alias/inner.txt", "target/inner.txt"]);
    }

    #[test]
    fn missing_root_fails_walk() {
        let matcher = ExclusionMatcher::empty();
        let walker = Walker::new(Path::new("/nonexistent/anemone-walk"), &matcher, WalkerOptions::default());
        let err = walker.walk(&CancelToken::new(), |_| {}).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn cancellation_aborts_walk() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let matcher = ExclusionMatcher::empty();
        let walker = Walker::new(dir.path(), &matcher, WalkerOptions::default());
        let err = walker.walk(&cancel, |_| {}).unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
    }
}
