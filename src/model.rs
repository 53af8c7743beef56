/*!
 * Domain model for Anemone sync jobs and per-file state
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Snapshot of one file on one side of a sync
///
/// `path` is relative to the tree root and uses forward slashes. `hash` is
/// either empty (not yet computed) or a lowercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub hash: String,
}

impl FileInfo {
    pub fn new(path: impl Into<String>, size: u64, mtime: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
            hash: String::new(),
        }
    }

    /// Modification time truncated to whole seconds
    ///
    /// All mtime comparisons in the engine run at one-second resolution;
    /// manifests and FAT-era filesystems do not carry more.
    pub fn mtime_secs(&self) -> i64 {
        self.mtime.timestamp()
    }

    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// Per-file sync status as persisted in `files_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Queued,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
            SyncStatus::Queued => "queued",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(SyncStatus::Idle),
            "syncing" => Ok(SyncStatus::Syncing),
            "error" => Ok(SyncStatus::Error),
            "queued" => Ok(SyncStatus::Queued),
            other => Err(SyncError::Database(format!("unknown sync status: {other}"))),
        }
    }
}

/// Persisted last-synced state of one file, unique by `(job_id, local_path)`
///
/// This row is the common ancestor in the 3-way merge.
#[derive(Debug, Clone)]
pub struct FileState {
    pub job_id: i64,
    pub local_path: String,
    pub remote_path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub hash: String,
    pub sync_status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileState {
    pub fn to_file_info(&self) -> FileInfo {
        FileInfo {
            path: self.local_path.clone(),
            size: self.size,
            mtime: self.mtime,
            hash: self.hash.clone(),
        }
    }
}

/// Direction constraints for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full two-way mirror
    Mirror,
    /// Local wins; only uploads and remote deletions
    Upload,
    /// Remote wins; only downloads and local deletions
    Download,
    /// Two-way mirror where conflicts resolve without stalling
    MirrorPriority,
}

impl SyncMode {
    pub fn is_bidirectional(&self) -> bool {
        matches!(self, SyncMode::Mirror | SyncMode::MirrorPriority)
    }

    pub fn allows_upload(&self) -> bool {
        !matches!(self, SyncMode::Download)
    }

    pub fn allows_download(&self) -> bool {
        !matches!(self, SyncMode::Upload)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Mirror => "mirror",
            SyncMode::Upload => "upload",
            SyncMode::Download => "download",
            SyncMode::MirrorPriority => "mirror_priority",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "mirror" => Ok(SyncMode::Mirror),
            "upload" => Ok(SyncMode::Upload),
            "download" => Ok(SyncMode::Download),
            "mirror_priority" => Ok(SyncMode::MirrorPriority),
            other => Err(SyncError::Config(format!("unknown sync mode: {other}"))),
        }
    }
}

/// Policy applied when the 3-way merge reports a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Later mtime wins; size breaks ties
    Recent,
    /// Local side always wins
    Local,
    /// Remote side always wins
    Remote,
    /// Leave unresolved for the caller
    Ask,
    /// Keep the local file, download the remote into a `.server` sibling
    KeepBoth,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Recent => "recent",
            ConflictPolicy::Local => "local",
            ConflictPolicy::Remote => "remote",
            ConflictPolicy::Ask => "ask",
            ConflictPolicy::KeepBoth => "keep_both",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "recent" => Ok(ConflictPolicy::Recent),
            "local" => Ok(ConflictPolicy::Local),
            "remote" => Ok(ConflictPolicy::Remote),
            "ask" => Ok(ConflictPolicy::Ask),
            "keep_both" => Ok(ConflictPolicy::KeepBoth),
            other => Err(SyncError::Config(format!("unknown conflict policy: {other}"))),
        }
    }
}

/// A named sync configuration binding one local tree to one remote UNC path
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub local_path: String,
    pub remote_path: String,
    pub server_credential_id: Option<i64>,
    pub sync_mode: SyncMode,
    pub trigger_mode: String,
    pub trigger_params: Option<String>,
    pub conflict_resolution: ConflictPolicy,
    pub enabled: bool,
    pub status: SyncStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New-job parameters; ids and timestamps are assigned by the store
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub local_path: String,
    pub remote_path: String,
    pub server_credential_id: Option<i64>,
    pub sync_mode: SyncMode,
    pub trigger_mode: String,
    pub trigger_params: Option<String>,
    pub conflict_resolution: ConflictPolicy,
    pub enabled: bool,
}

/// Priority layer an exclusion belongs to
///
/// Individual exclusions beat job exclusions, which beat global ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionLevel {
    Global,
    Job,
    Individual,
}

impl ExclusionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionLevel::Global => "global",
            ExclusionLevel::Job => "job",
            ExclusionLevel::Individual => "individual",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(ExclusionLevel::Global),
            "job" => Ok(ExclusionLevel::Job),
            "individual" => Ok(ExclusionLevel::Individual),
            other => Err(SyncError::Database(format!("unknown exclusion level: {other}"))),
        }
    }
}

/// One exclusion row; `job_id` is set for job and individual levels
#[derive(Debug, Clone)]
pub struct Exclusion {
    pub id: i64,
    pub level: ExclusionLevel,
    pub pattern: String,
    pub job_id: Option<i64>,
    pub reason: Option<String>,
}

/// Outcome grade of one finished sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    #[default]
    Success,
    Partial,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Success => "success",
            HistoryStatus::Partial => "partial",
            HistoryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(HistoryStatus::Success),
            "partial" => Ok(HistoryStatus::Partial),
            "failed" => Ok(HistoryStatus::Failed),
            other => Err(SyncError::Database(format!("unknown history status: {other}"))),
        }
    }
}

/// One finished sync as recorded in `sync_history`
#[derive(Debug, Clone)]
pub struct SyncHistoryEntry {
    pub id: i64,
    pub job_id: i64,
    pub timestamp: DateTime<Utc>,
    pub files_synced: u64,
    pub files_failed: u64,
    pub bytes_transferred: u64,
    pub duration_seconds: f64,
    pub status: HistoryStatus,
    pub error_summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn mode_predicates() {
        assert!(SyncMode::Mirror.is_bidirectional());
        assert!(SyncMode::MirrorPriority.is_bidirectional());
        assert!(!SyncMode::Upload.is_bidirectional());

        assert!(SyncMode::Upload.allows_upload());
        assert!(!SyncMode::Upload.allows_download());
        assert!(SyncMode::Download.allows_download());
        assert!(!SyncMode::Download.allows_upload());
        assert!(SyncMode::Mirror.allows_upload() && SyncMode::Mirror.allows_download());
    }

    #[test]
    fn mode_round_trips() {
        for mode in [
            SyncMode::Mirror,
            SyncMode::Upload,
            SyncMode::Download,
            SyncMode::MirrorPriority,
        ] {
            assert_eq!(SyncMode::parse(mode.as_str()).unwrap(), mode);
        }
        assert!(SyncMode::parse("bidirectional").is_err());
    }

    #[test]
    fn policy_round_trips() {
        for policy in [
            ConflictPolicy::Recent,
            ConflictPolicy::Local,
            ConflictPolicy::Remote,
            ConflictPolicy::Ask,
            ConflictPolicy::KeepBoth,
        ] {
            assert_eq!(ConflictPolicy::parse(policy.as_str()).unwrap(), policy);
        }
    }

    #[test]
    fn mtime_truncates_to_seconds() {
        let precise = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        let blunt = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let a = FileInfo::new("a.txt", 1, precise);
        let b = FileInfo::new("a.txt", 1, blunt);
        assert_eq!(a.mtime_secs(), b.mtime_secs());
    }

    #[test]
    fn exclusion_priority_ordering() {
        assert!(ExclusionLevel::Individual > ExclusionLevel::Job);
        assert!(ExclusionLevel::Job > ExclusionLevel::Global);
    }
}
