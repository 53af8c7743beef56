/*!
 * 3-way change detection
 *
 * Compares a file's local, remote, and last-synced (cached) states and
 * decides the minimal action. The cached row is the common ancestor: a side
 * that differs from it has changed, a side that matches it has not.
 */

use std::collections::{BTreeSet, HashMap};

use crate::model::FileInfo;

/// How both sides diverged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Created independently on both sides with differing content
    BothCreated,
    /// Modified on both sides since the last sync
    BothModified,
    /// Locally modified, remotely deleted
    LocalModifiedRemoteDeleted,
    /// Locally deleted, remotely modified
    LocalDeletedRemoteModified,
}

/// Action the 3-way merge settled on for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    None,
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
    Conflict(ConflictKind),
}

impl ChangeAction {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ChangeAction::Conflict(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ChangeAction::None)
    }
}

/// One path's merge outcome, carrying the three states it was derived from
#[derive(Debug, Clone)]
pub struct SyncDecision {
    pub path: String,
    pub action: ChangeAction,
    pub local: Option<FileInfo>,
    pub remote: Option<FileInfo>,
    pub cached: Option<FileInfo>,
    /// Alternative local target for keep-both downloads
    pub download_as: Option<String>,
}

impl SyncDecision {
    fn new(
        path: &str,
        action: ChangeAction,
        local: Option<&FileInfo>,
        remote: Option<&FileInfo>,
        cached: Option<&FileInfo>,
    ) -> Self {
        Self {
            path: path.to_string(),
            action,
            local: local.cloned(),
            remote: remote.cloned(),
            cached: cached.cloned(),
            download_as: None,
        }
    }
}

/// Content-equality predicate over optional states
///
/// Size must match; hashes decide when both are known, second-truncated
/// mtimes otherwise.
pub fn same(a: Option<&FileInfo>, b: Option<&FileInfo>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if a.size != b.size {
                return false;
            }
            if a.has_hash() && b.has_hash() {
                a.hash == b.hash
            } else {
                a.mtime_secs() == b.mtime_secs()
            }
        }
        _ => false,
    }
}

/// Apply the 3-way decision table to one path
pub fn decide(
    path: &str,
    local: Option<&FileInfo>,
    remote: Option<&FileInfo>,
    cached: Option<&FileInfo>,
) -> SyncDecision {
    let action = match (local, remote, cached) {
        (None, None, _) => ChangeAction::None,

        (Some(_), None, None) => ChangeAction::Upload,
        (None, Some(_), None) => ChangeAction::Download,

        (Some(l), Some(r), None) => {
            if same(Some(l), Some(r)) {
                ChangeAction::None
            } else {
                ChangeAction::Conflict(ConflictKind::BothCreated)
            }
        }

        (None, Some(r), Some(c)) => {
            if same(Some(r), Some(c)) {
                ChangeAction::DeleteRemote
            } else {
                ChangeAction::Conflict(ConflictKind::LocalDeletedRemoteModified)
            }
        }

        (Some(l), None, Some(c)) => {
            if same(Some(l), Some(c)) {
                ChangeAction::DeleteLocal
            } else {
                ChangeAction::Conflict(ConflictKind::LocalModifiedRemoteDeleted)
            }
        }

        (Some(l), Some(r), Some(c)) => {
            let local_clean = same(Some(l), Some(c));
            let remote_clean = same(Some(r), Some(c));
            match (local_clean, remote_clean) {
                (true, true) => ChangeAction::None,
                (true, false) => ChangeAction::Download,
                (false, true) => ChangeAction::Upload,
                (false, false) => {
                    if same(Some(l), Some(r)) {
                        // both sides converged on the same content
                        ChangeAction::None
                    } else {
                        ChangeAction::Conflict(ConflictKind::BothModified)
                    }
                }
            }
        }
    };

    SyncDecision::new(path, action, local, remote, cached)
}

/// Run the decision table over the union of all known paths
///
/// `None` decisions are suppressed from the output.
pub fn detect_changes(
    local: &HashMap<String, FileInfo>,
    remote: &HashMap<String, FileInfo>,
    cached: &HashMap<String, FileInfo>,
) -> Vec<SyncDecision> {
    let paths: BTreeSet<&String> = local.keys().chain(remote.keys()).chain(cached.keys()).collect();

    paths
        .into_iter()
        .map(|path| decide(path, local.get(path), remote.get(path), cached.get(path)))
        .filter(|decision| !decision.action.is_none())
        .collect()
}
