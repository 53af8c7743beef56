/*!
 * Remote tree scanning
 *
 * Two paths to the same result: read the share's manifest when one exists,
 * otherwise walk the share recursively. Manifest mode reconciles against
 * the cache, because a manifest regenerated on a schedule can miss files
 * the engine itself uploaded moments ago.
 */

use std::collections::HashMap;

use tracing::debug;

use super::manifest::{Manifest, MANIFEST_PATH};
use super::RemoteFs;
use crate::cancel::CancelToken;
use crate::core::paths::join_remote;
use crate::error::{Result, SyncError};
use crate::model::FileInfo;

/// Directory the share keeps its own bookkeeping in; never synced
const SHARE_META_DIR: &str = ".anemone";

/// Per-directory failure the walk stepped over
#[derive(Debug, Clone)]
pub struct RemoteScanError {
    pub path: String,
    pub message: String,
}

/// Remote map plus how it was obtained
#[derive(Debug, Default)]
pub struct RemoteScanResult {
    /// Keyed by path relative to the scanned base
    pub files: HashMap<String, FileInfo>,
    pub used_manifest: bool,
    /// Cache entries the manifest had gone stale on and a wire stat revived
    pub reconciled: u64,
    pub dirs_scanned: u64,
    pub errors: Vec<RemoteScanError>,
}

/// Throttled progress: invoked every 100 files or 10 directories
pub type RemoteScanProgress<'a> = &'a dyn Fn(u64, u64);

pub struct RemoteScanner<'a> {
    remote: &'a dyn RemoteFs,
    cancel: &'a CancelToken,
}

impl<'a> RemoteScanner<'a> {
    pub fn new(remote: &'a dyn RemoteFs, cancel: &'a CancelToken) -> Self {
        Self { remote, cancel }
    }

    /// Scan the subtree under `base` (share-relative, possibly empty)
    ///
    /// `cached` drives the reconciliation step in manifest mode.
    pub fn scan(
        &self,
        base: &str,
        cached: &HashMap<String, FileInfo>,
        progress: Option<RemoteScanProgress<'_>>,
    ) -> Result<RemoteScanResult> {
        match self.try_manifest(base) {
            Some(manifest) => {
                let mut result = RemoteScanResult {
                    files: manifest.to_file_map(),
                    used_manifest: true,
                    ..Default::default()
                };
                self.reconcile(base, cached, &mut result)?;
                Ok(result)
            }
            None => self.walk(base, progress),
        }
    }

    fn try_manifest(&self, base: &str) -> Option<Manifest> {
        let manifest_path = join_remote(base, MANIFEST_PATH);
        let bytes = match self.remote.read_file(&manifest_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %manifest_path, error = %err, "no usable manifest, walking share");
                return None;
            }
        };
        match Manifest::parse(&bytes) {
            Ok(manifest) => {
                debug!(
                    files = manifest.file_count,
                    generated_at = %manifest.generated_at,
                    "using share manifest"
                );
                Some(manifest)
            }
            Err(err) => {
                debug!(path = %manifest_path, error = %err, "manifest unparseable, walking share");
                None
            }
        }
    }

    /// Stat cached paths the manifest does not mention
    ///
    /// A hit means the manifest is stale (typically after our own recent
    /// upload) and the file still exists; a miss is a genuine deletion.
    fn reconcile(
        &self,
        base: &str,
        cached: &HashMap<String, FileInfo>,
        result: &mut RemoteScanResult,
    ) -> Result<()> {
        for (path, _) in cached.iter() {
            if result.files.contains_key(path) {
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.remote.stat(&join_remote(base, path)) {
                Ok(stat) if !stat.is_dir => {
                    result.reconciled += 1;
                    result.files.insert(
                        path.clone(),
                        FileInfo {
                            path: path.clone(),
                            size: stat.size,
                            mtime: stat.mtime,
                            hash: String::new(),
                        },
                    );
                }
                Ok(_) => {}
                Err(SyncError::NotFound(_)) => {}
                Err(err) => {
                    result.errors.push(RemoteScanError {
                        path: path.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Recursive listing fallback; per-directory errors are recorded and
    /// the walk continues
    fn walk(
        &self,
        base: &str,
        progress: Option<RemoteScanProgress<'_>>,
    ) -> Result<RemoteScanResult> {
        let mut result = RemoteScanResult::default();
        let mut pending = vec![base.to_string()];
        let mut files_at_last_report = 0u64;

        while let Some(dir) = pending.pop() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let entries = match self.remote.list(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    result.errors.push(RemoteScanError {
                        path: dir,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            result.dirs_scanned += 1;

            for entry in entries {
                let Some(rel) = base_relative(base, &entry.path) else {
                    continue;
                };
                if rel == SHARE_META_DIR || rel.starts_with(".anemone/") {
                    continue;
                }

                if entry.is_dir {
                    pending.push(entry.path);
                } else {
                    result.files.insert(
                        rel.clone(),
                        FileInfo {
                            path: rel,
                            size: entry.size,
                            mtime: entry.mtime,
                            hash: String::new(),
                        },
                    );
                }
            }

            if let Some(report) = progress {
                let files = result.files.len() as u64;
                if files >= files_at_last_report + 100 || result.dirs_scanned % 10 == 0 {
                    files_at_last_report = files;
                    report(files, result.dirs_scanned);
                }
            }
        }

        Ok(result)
    }
}

fn base_relative(base: &str, share_path: &str) -> Option<String> {
    if base.is_empty() {
        return Some(share_path.to_string());
    }
    share_path
        .strip_prefix(base)
        .filter(|rest| rest.starts_with('/'))
        .map(|rest| rest.trim_start_matches('/').to_string())
        .filter(|rest| !rest.is_empty())
}
