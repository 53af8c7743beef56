/*!
 * Remote share manifest
 *
 * Shares maintained by an anemone server publish an index at
 * `.anemone/manifest.json`. Reading it replaces a full recursive walk of
 * the share, which is orders of magnitude faster over SMB.
 */

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::paths::normalize_separators;
use crate::error::{Result, SyncError};
use crate::model::FileInfo;

/// Share-relative location of the manifest
pub const MANIFEST_PATH: &str = ".anemone/manifest.json";

const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareType {
    Backup,
    Data,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    /// Unix seconds; manifests carry no sub-second resolution
    pub mtime: i64,
    /// `sha256:<hex>` (the algorithm prefix is stripped on conversion)
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub share_name: String,
    pub share_type: ShareType,
    pub username: String,
    pub file_count: u64,
    pub total_size: u64,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::Remote {
                operation: "manifest".into(),
                message: format!("unparseable manifest: {e}"),
                transient: false,
            })?;
        if manifest.version > SUPPORTED_VERSION {
            return Err(SyncError::Remote {
                operation: "manifest".into(),
                message: format!("unsupported manifest version {}", manifest.version),
                transient: false,
            });
        }
        Ok(manifest)
    }

    /// Convert to the remote file map used by the 3-way merge
    ///
    /// Paths are normalized to forward slashes; hash prefixes are stripped.
    pub fn to_file_map(&self) -> HashMap<String, FileInfo> {
        self.files
            .iter()
            .map(|entry| {
                let path = normalize_separators(&entry.path)
                    .trim_start_matches('/')
                    .to_string();
                let hash = entry
                    .hash
                    .split_once(':')
                    .map(|(_, hex)| hex)
                    .unwrap_or(&entry.hash)
                    .to_lowercase();
                let mtime = Utc
                    .timestamp_opt(entry.mtime, 0)
                    .single()
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                (
                    path.clone(),
                    FileInfo {
                        path,
                        size: entry.size,
                        mtime,
                        hash,
                    },
                )
            })
            .collect()
    }
}
