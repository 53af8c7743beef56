/*!
 * Conflict resolution
 *
 * Maps 3-way conflicts to concrete actions under the job's policy. `ask`
 * leaves the conflict for the caller; every other policy produces an
 * executable decision (possibly `None` on a perfect tie).
 */

use std::cmp::Ordering;

use crate::core::detector::{ChangeAction, ConflictKind, SyncDecision};
use crate::model::{ConflictPolicy, FileInfo};

/// Outcome of running one conflict through a policy
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Policy settled on an action
    Resolved(SyncDecision),
    /// Policy `ask`: surface to the caller untouched
    Unresolved(SyncDecision),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Resolve one conflict decision under `policy`
///
/// Non-conflict decisions pass through unchanged.
pub fn resolve(decision: SyncDecision, policy: ConflictPolicy) -> Resolution {
    let ChangeAction::Conflict(kind) = decision.action else {
        return Resolution::Resolved(decision);
    };

    if policy == ConflictPolicy::Ask {
        return Resolution::Unresolved(decision);
    }

    let action = match kind {
        ConflictKind::BothCreated | ConflictKind::BothModified => {
            resolve_both_present(&decision, policy)
        }
        ConflictKind::LocalModifiedRemoteDeleted => match policy {
            // the modification is the newer event; keep_both keeps the
            // surviving side
            ConflictPolicy::Recent | ConflictPolicy::Local | ConflictPolicy::KeepBoth => {
                ChangeAction::Upload
            }
            ConflictPolicy::Remote => ChangeAction::DeleteLocal,
            ConflictPolicy::Ask => unreachable!(),
        },
        ConflictKind::LocalDeletedRemoteModified => match policy {
            ConflictPolicy::Recent | ConflictPolicy::Remote | ConflictPolicy::KeepBoth => {
                ChangeAction::Download
            }
            ConflictPolicy::Local => ChangeAction::DeleteRemote,
            ConflictPolicy::Ask => unreachable!(),
        },
    };

    let mut resolved = decision;
    resolved.action = action;
    if policy == ConflictPolicy::KeepBoth && action == ChangeAction::Download {
        if matches!(kind, ConflictKind::BothCreated | ConflictKind::BothModified) {
            resolved.download_as = Some(server_sibling(&resolved.path));
        }
    }
    Resolution::Resolved(resolved)
}

fn resolve_both_present(decision: &SyncDecision, policy: ConflictPolicy) -> ChangeAction {
    match policy {
        ConflictPolicy::Local => ChangeAction::Upload,
        ConflictPolicy::Remote => ChangeAction::Download,
        ConflictPolicy::KeepBoth => ChangeAction::Download,
        ConflictPolicy::Recent => {
            let (Some(local), Some(remote)) = (&decision.local, &decision.remote) else {
                return ChangeAction::None;
            };
            pick_recent(local, remote)
        }
        ConflictPolicy::Ask => unreachable!(),
    }
}

/// Later mtime wins; on a tie the larger side wins; on a full tie, nothing
fn pick_recent(local: &FileInfo, remote: &FileInfo) -> ChangeAction {
    match local
        .mtime_secs()
        .cmp(&remote.mtime_secs())
        .then(local.size.cmp(&remote.size))
    {
        Ordering::Greater => ChangeAction::Upload,
        Ordering::Less => ChangeAction::Download,
        Ordering::Equal => ChangeAction::None,
    }
}

/// Sibling path for keep-both downloads: `dir/a.txt` -> `dir/a.server.txt`
fn server_sibling(path: &str) -> String {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, path),
    };
    let renamed = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.server.{ext}"),
        _ => format!("{name}.server"),
    };
    match dir {
        Some(dir) => format!("{dir}/{renamed}"),
        None => renamed,
    }
}

/// Resolve a batch, splitting it into executable and still-unresolved lists
pub fn resolve_all(
    conflicts: Vec<SyncDecision>,
    policy: ConflictPolicy,
) -> (Vec<SyncDecision>, Vec<SyncDecision>) {
    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();
    for conflict in conflicts {
        match resolve(conflict, policy) {
            Resolution::Resolved(decision) => {
                if !decision.action.is_none() {
                    resolved.push(decision);
                }
            }
            Resolution::Unresolved(decision) => unresolved.push(decision),
        }
    }
    (resolved, unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const T: i64 = 1_700_000_000;

    fn info(size: u64, secs: i64) -> FileInfo {
        FileInfo {
            path: "a.txt".into(),
            size,
            mtime: Utc.timestamp_opt(secs, 0).unwrap(),
            hash: String::new(),
        }
    }

    fn conflict(kind: ConflictKind, local: Option<FileInfo>, remote: Option<FileInfo>) -> SyncDecision {
        SyncDecision {
            path: "docs/a.txt".into(),
            action: ChangeAction::Conflict(kind),
            local,
            remote,
            cached: Some(info(1, T - 100)),
            download_as: None,
        }
    }

    fn resolved_action(resolution: Resolution) -> ChangeAction {
        match resolution {
            Resolution::Resolved(d) => d.action,
            Resolution::Unresolved(_) => panic!("expected resolution"),
        }
    }

    #[test]
    fn recent_prefers_later_mtime() {
        let d = conflict(
            ConflictKind::BothModified,
            Some(info(5, T + 2)),
            Some(info(5, T + 1)),
        );
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Recent)),
            ChangeAction::Upload
        );

        let d = conflict(
            ConflictKind::BothModified,
            Some(info(5, T + 1)),
            Some(info(5, T + 2)),
        );
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Recent)),
            ChangeAction::Download
        );
    }

    #[test]
    fn recent_breaks_mtime_tie_on_size() {
        let d = conflict(
            ConflictKind::BothModified,
            Some(info(9, T)),
            Some(info(5, T)),
        );
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Recent)),
            ChangeAction::Upload
        );
    }

    #[test]
    fn recent_full_tie_is_none() {
        let d = conflict(
            ConflictKind::BothModified,
            Some(info(5, T)),
            Some(info(5, T)),
        );
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Recent)),
            ChangeAction::None
        );
    }

    #[test]
    fn local_always_uploads() {
        let d = conflict(
            ConflictKind::BothModified,
            Some(info(5, T)),
            Some(info(9, T + 100)),
        );
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Local)),
            ChangeAction::Upload
        );
    }

    #[test]
    fn remote_always_downloads() {
        let d = conflict(
            ConflictKind::BothModified,
            Some(info(9, T + 100)),
            Some(info(5, T)),
        );
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Remote)),
            ChangeAction::Download
        );
    }

    #[test]
    fn ask_stays_unresolved() {
        let d = conflict(
            ConflictKind::BothModified,
            Some(info(5, T)),
            Some(info(9, T)),
        );
        assert!(!resolve(d, ConflictPolicy::Ask).is_resolved());
    }

    #[test]
    fn keep_both_downloads_into_server_sibling() {
        let d = conflict(
            ConflictKind::BothModified,
            Some(info(5, T)),
            Some(info(9, T)),
        );
        match resolve(d, ConflictPolicy::KeepBoth) {
            Resolution::Resolved(decision) => {
                assert_eq!(decision.action, ChangeAction::Download);
                assert_eq!(decision.download_as.as_deref(), Some("docs/a.server.txt"));
            }
            Resolution::Unresolved(_) => panic!("keep_both must resolve"),
        }
    }

    #[test]
    fn sibling_naming_edge_cases() {
        assert_eq!(server_sibling("a.txt"), "a.server.txt");
        assert_eq!(server_sibling("dir/sub/a.tar.gz"), "dir/sub/a.tar.server.gz");
        assert_eq!(server_sibling("README"), "README.server");
        assert_eq!(server_sibling("dir/.env"), "dir/.env.server");
    }

    #[test]
    fn modify_vs_delete_recent_keeps_modification() {
        let d = conflict(ConflictKind::LocalModifiedRemoteDeleted, Some(info(5, T + 5)), None);
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Recent)),
            ChangeAction::Upload
        );

        let d = conflict(ConflictKind::LocalDeletedRemoteModified, None, Some(info(5, T + 5)));
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Recent)),
            ChangeAction::Download
        );
    }

    #[test]
    fn modify_vs_delete_side_policies_propagate_deletion() {
        let d = conflict(ConflictKind::LocalModifiedRemoteDeleted, Some(info(5, T)), None);
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Remote)),
            ChangeAction::DeleteLocal
        );

        let d = conflict(ConflictKind::LocalDeletedRemoteModified, None, Some(info(5, T)));
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Local)),
            ChangeAction::DeleteRemote
        );
    }

    #[test]
    fn modify_vs_delete_keep_both_keeps_survivor() {
        let d = conflict(ConflictKind::LocalModifiedRemoteDeleted, Some(info(5, T)), None);
        match resolve(d, ConflictPolicy::KeepBoth) {
            Resolution::Resolved(decision) => {
                assert_eq!(decision.action, ChangeAction::Upload);
                assert!(decision.download_as.is_none());
            }
            Resolution::Unresolved(_) => panic!(),
        }
    }

    #[test]
    fn non_conflicts_pass_through() {
        let mut d = conflict(ConflictKind::BothModified, Some(info(1, T)), Some(info(1, T)));
        d.action = ChangeAction::Upload;
        assert_eq!(
            resolved_action(resolve(d, ConflictPolicy::Ask)),
            ChangeAction::Upload
        );
    }

    #[test]
    fn resolve_all_splits_and_drops_none() {
        let tie = conflict(
            ConflictKind::BothModified,
            Some(info(5, T)),
            Some(info(5, T)),
        );
        let upload = conflict(
            ConflictKind::BothModified,
            Some(info(5, T + 9)),
            Some(info(5, T)),
        );
        let (resolved, unresolved) = resolve_all(vec![tie, upload], ConflictPolicy::Recent);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].action, ChangeAction::Upload);
        assert!(unresolved.is_empty());
    }
}
