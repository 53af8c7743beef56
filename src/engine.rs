/*!
 * Sync orchestration
 *
 * `SyncEngine::sync` drives one job through five phases: preparation
 * (credentials, remote connection), scanning (local walk + remote
 * manifest/walk + cache load), detection (3-way merge and conflict
 * resolution), execution (prioritized, retried actions), and finalization
 * (cache and history updates). One sync per job at a time; everything is
 * cancellable through the request token.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::config::AppConfig;
use crate::core::detector::{self, ChangeAction, SyncDecision};
use crate::core::exclusion::ExclusionMatcher;
use crate::core::executor::{
    ActionKind, ActionOutcome, ActionStatus, ExecutableAction, Executor,
};
use crate::core::hasher::Hasher;
use crate::core::paths::{to_local, UncPath};
use crate::core::progress::{ProgressCallback, ProgressTracker, SyncPhase};
use crate::core::resolver;
use crate::core::retry::RetryPolicy;
use crate::core::scanner::LocalScanner;
use crate::core::walker::WalkerOptions;
use crate::error::{Result, SyncError};
use crate::keystore::Keystore;
use crate::model::{ConflictPolicy, FileInfo, HistoryStatus, Job, SyncMode, SyncStatus};
use crate::remote::scanner::RemoteScanner;
use crate::remote::{RemoteFs, RemoteFsFactory};
use crate::store::file_state::FileStateUpsert;
use crate::store::history::{EngineStatistics, NewHistoryEntry};
use crate::store::Database;

/// Placeholder creation request handed to the Files-On-Demand callback
#[derive(Debug, Clone)]
pub struct PlaceholderSpec {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

/// Creates an OS-level placeholder with the remote file's size and mtime
pub type PlaceholderCallback = Arc<dyn Fn(&PlaceholderSpec) -> Result<()> + Send + Sync>;

/// One sync invocation
#[derive(Clone)]
pub struct SyncRequest {
    pub job_id: i64,
    pub dry_run: bool,
    /// Divert downloads to the placeholder callback instead of transferring
    /// content
    pub files_on_demand: bool,
    pub cancel: CancelToken,
    pub progress: Option<ProgressCallback>,
    pub placeholder: Option<PlaceholderCallback>,
}

impl SyncRequest {
    pub fn new(job_id: i64) -> Self {
        Self {
            job_id,
            dry_run: false,
            files_on_demand: false,
            cancel: CancelToken::new(),
            progress: None,
            placeholder: None,
        }
    }
}

/// One failed action, compactly
#[derive(Debug, Clone)]
pub struct ActionError {
    pub path: String,
    pub operation: String,
    pub message: String,
}

/// Outcome of one sync
#[derive(Debug, Default)]
pub struct SyncResult {
    pub job_id: i64,
    pub status: HistoryStatus,
    pub dry_run: bool,
    pub files_uploaded: u64,
    pub files_downloaded: u64,
    pub files_deleted_local: u64,
    pub files_deleted_remote: u64,
    pub placeholders_created: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub conflicts_found: u64,
    /// Conflicts the policy left for the caller (`ask`)
    pub unresolved_conflicts: Vec<SyncDecision>,
    pub bytes_transferred: u64,
    pub duration: Duration,
    pub errors: Vec<ActionError>,
    /// Dry run only: the actions that would have executed
    pub planned: Vec<SyncDecision>,
    pub used_manifest: bool,
    pub cancelled: bool,
}

impl SyncResult {
    pub fn files_synced(&self) -> u64 {
        self.files_uploaded
            + self.files_downloaded
            + self.files_deleted_local
            + self.files_deleted_remote
    }

    /// Up to three `"path (operation)"` entries plus a remainder note
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let mut parts: Vec<String> = self
            .errors
            .iter()
            .take(3)
            .map(|e| format!("{} ({})", e.path, e.operation))
            .collect();
        if self.errors.len() > 3 {
            parts.push(format!("and {} more", self.errors.len() - 3));
        }
        Some(parts.join("; "))
    }
}

pub struct SyncEngine {
    db: Arc<Database>,
    config: AppConfig,
    keystore: Arc<dyn Keystore>,
    remote_factory: Arc<dyn RemoteFsFactory>,
    scanner: LocalScanner,
    /// Cancel handle per running job; doubles as the re-entrance guard
    active: Mutex<HashMap<i64, CancelToken>>,
    closed: AtomicBool,
}

struct JobGuard<'a> {
    engine: &'a SyncEngine,
    job_id: i64,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.engine.active.lock().unwrap().remove(&self.job_id);
    }
}

impl SyncEngine {
    pub fn new(
        db: Arc<Database>,
        config: AppConfig,
        keystore: Arc<dyn Keystore>,
        remote_factory: Arc<dyn RemoteFsFactory>,
    ) -> Self {
        let hasher = Hasher::new(
            config.performance.hash_algorithm,
            config.performance.buffer_size_mb,
        );
        let scanner = LocalScanner::new(db.clone(), hasher, config.batching.clone());
        Self {
            db,
            config,
            keystore,
            remote_factory,
            scanner,
            active: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Run one sync to completion
    pub fn sync(&self, request: SyncRequest) -> Result<SyncResult> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::EngineClosed);
        }
        if request.job_id <= 0 {
            return Err(SyncError::InvalidRequest(format!(
                "job id must be positive, got {}",
                request.job_id
            )));
        }

        let _guard = self.acquire(request.job_id, request.cancel.clone())?;
        let job = self.db.get_job(request.job_id)?;

        info!(job_id = job.id, name = %job.name, dry_run = request.dry_run, "sync starting");
        let started = Instant::now();

        let outcome = self.run_phases(&job, &request, started);
        match &outcome {
            Ok(result) => {
                info!(
                    job_id = job.id,
                    status = result.status.as_str(),
                    synced = result.files_synced(),
                    failed = result.files_failed,
                    bytes = result.bytes_transferred,
                    "sync finished"
                );
            }
            Err(err) => {
                error!(job_id = job.id, category = %err.category(), error = %err, "sync failed");
                if !request.dry_run {
                    self.record_failure(&job, err, started);
                }
            }
        }
        outcome
    }

    /// Cancel a running sync; `false` when the job is not running
    pub fn cancel(&self, job_id: i64) -> bool {
        match self.active.lock().unwrap().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop accepting syncs and cancel everything in flight
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for token in self.active.lock().unwrap().values() {
            token.cancel();
        }
    }

    pub fn statistics(&self) -> Result<EngineStatistics> {
        self.db.statistics()
    }

    fn acquire(&self, job_id: i64, cancel: CancelToken) -> Result<JobGuard<'_>> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(&job_id) {
            return Err(SyncError::SyncInProgress(job_id));
        }
        active.insert(job_id, cancel);
        Ok(JobGuard {
            engine: self,
            job_id,
        })
    }

    fn run_phases(
        &self,
        job: &Job,
        request: &SyncRequest,
        started: Instant,
    ) -> Result<SyncResult> {
        let tracker = Arc::new(ProgressTracker::new(
            job.id,
            request.progress.clone(),
            Duration::from_millis(self.config.progress.min_update_interval_ms),
        ));

        // phase 1: preparation
        tracker.set_phase(SyncPhase::Preparation);
        let unc = UncPath::parse(&job.remote_path)?;
        let credentials = self.keystore.get(&unc.server)?;
        let remote: Arc<dyn RemoteFs> =
            Arc::from(self.remote_factory.create(&unc, &credentials)?);
        remote.connect()?;
        if !request.dry_run {
            self.db.set_job_status(job.id, SyncStatus::Syncing)?;
        }

        // phase 2: scanning
        tracker.set_phase(SyncPhase::Scanning);
        let matcher = self.build_matcher(job)?;
        let walker_options = WalkerOptions {
            follow_symlinks: false,
            skip_placeholders: request.files_on_demand,
        };
        let scan_tracker = tracker.clone();
        let scan_progress = move |_seen: u64, path: &str| {
            scan_tracker.advance(1, 0, Some(path));
        };
        let scan = self.scanner.scan(
            job,
            &matcher,
            walker_options,
            &request.cancel,
            Some(&scan_progress),
        )?;
        let local_files = scan.local_file_map();

        // the cache map is loaded after the local scan so metadata
        // refreshes are already visible
        let cached = self.db.cached_file_map(job.id)?;

        // the remote side is scanned even in upload-only mode; deletion
        // detection needs it
        let remote_progress = {
            let tracker = tracker.clone();
            move |_files: u64, _dirs: u64| {
                tracker.advance(0, 0, None);
            }
        };
        let remote_scan = RemoteScanner::new(remote.as_ref(), &request.cancel).scan(
            &unc.path,
            &cached,
            Some(&remote_progress),
        )?;
        let remote_files = remote_scan.files;

        // phase 3: detection
        tracker.set_phase(SyncPhase::Detection);
        let decisions = detector::detect_changes(&local_files, &remote_files, &cached);
        let (conflicts, mut executable): (Vec<_>, Vec<_>) = decisions
            .into_iter()
            .partition(|d| d.action.is_conflict());
        let conflicts_found = conflicts.len() as u64;

        let policy = self.effective_policy(job);
        let (resolved, unresolved) = resolver::resolve_all(conflicts, policy);
        executable.extend(resolved);

        // filter by sync mode; scanning was unrestricted, actions are not
        executable.retain(|d| mode_allows(job.sync_mode, &d.action));

        debug!(
            job_id = job.id,
            actions = executable.len(),
            conflicts = conflicts_found,
            unresolved = unresolved.len(),
            manifest = remote_scan.used_manifest,
            "detection finished"
        );

        let mut result = SyncResult {
            job_id: job.id,
            dry_run: request.dry_run,
            conflicts_found,
            used_manifest: remote_scan.used_manifest,
            ..Default::default()
        };
        for err in &scan.errors {
            result.errors.push(ActionError {
                path: err.path.clone(),
                operation: "scan".into(),
                message: err.message.clone(),
            });
        }
        result.files_failed += scan.errors.len() as u64;

        // phase 4: execution (skipped entirely in dry-run)
        if request.dry_run {
            result.planned = executable;
            result.unresolved_conflicts = unresolved;
            result.status = if result.errors.is_empty() && result.conflicts_found == 0 {
                HistoryStatus::Success
            } else {
                HistoryStatus::Partial
            };
            result.duration = started.elapsed();
            return Ok(result);
        }

        tracker.set_phase(SyncPhase::Execution);
        let local_root = PathBuf::from(&job.local_path);
        let (placeholder_specs, actions) =
            self.split_actions(&executable, &local_root, &unc, request);
        tracker.set_totals(
            actions.len() as u64,
            actions.iter().map(|a| a.size_hint).sum(),
        );

        self.create_placeholders(&placeholder_specs, request, &mut result);

        let executor = Executor::new(
            remote.clone(),
            RetryPolicy::from_config(&self.config.retry),
            self.config.performance.parallel_transfers,
        );
        let outcomes = executor.execute(actions, &request.cancel, Some(tracker.clone()));

        // phase 5: finalization — runs even after cancellation so the cache
        // reflects the actions that did complete
        tracker.set_phase(SyncPhase::Finalization);
        self.finalize(
            job,
            &unc,
            &local_files,
            &remote_files,
            &cached,
            &executable,
            &outcomes,
            &mut result,
        );
        result.unresolved_conflicts = unresolved;
        result.cancelled = request.cancel.is_cancelled();
        result.duration = started.elapsed();
        let failed_actions = outcomes
            .iter()
            .filter(|o| o.status == ActionStatus::Failed)
            .count() as u64;
        result.status = final_status(&result, outcomes.len() as u64, failed_actions);

        self.append_history(job, &result);
        let job_status = if result.status == HistoryStatus::Failed {
            SyncStatus::Error
        } else {
            SyncStatus::Idle
        };
        if let Err(err) = self.db.set_job_status(job.id, job_status) {
            warn!(job_id = job.id, error = %err, "failed to update job status");
        }
        if let Err(err) = self.db.set_job_last_run(job.id, Utc::now()) {
            warn!(job_id = job.id, error = %err, "failed to update last run");
        }
        tracker.report(true);

        Ok(result)
    }

    fn build_matcher(&self, job: &Job) -> Result<ExclusionMatcher> {
        let rows = self.db.list_exclusions_for_job(job.id)?;
        ExclusionMatcher::for_job(&rows).map_err(|e| SyncError::Exclusion(e.to_string()))
    }

    /// `mirror_priority` keeps conflicts from stalling: an `ask` policy is
    /// promoted to `recent`
    fn effective_policy(&self, job: &Job) -> ConflictPolicy {
        match (job.sync_mode, job.conflict_resolution) {
            (SyncMode::MirrorPriority, ConflictPolicy::Ask) => ConflictPolicy::Recent,
            (_, policy) => policy,
        }
    }

    /// Convert decisions to actionable paths; in Files-On-Demand mode,
    /// downloads divert to placeholder creation
    fn split_actions(
        &self,
        decisions: &[SyncDecision],
        local_root: &Path,
        unc: &UncPath,
        request: &SyncRequest,
    ) -> (Vec<PlaceholderSpec>, Vec<ExecutableAction>) {
        let divert_downloads = request.files_on_demand && request.placeholder.is_some();
        let mut placeholders = Vec::new();
        let mut actions = Vec::new();

        for decision in decisions {
            let kind = match decision.action {
                ChangeAction::Upload => ActionKind::Upload,
                ChangeAction::Download => ActionKind::Download,
                ChangeAction::DeleteLocal => ActionKind::DeleteLocal,
                ChangeAction::DeleteRemote => ActionKind::DeleteRemote,
                ChangeAction::None | ChangeAction::Conflict(_) => continue,
            };

            let local_rel = decision.download_as.as_deref().unwrap_or(&decision.path);
            let local_path = to_local(local_root, local_rel);
            let remote_path = unc.join(&decision.path);

            if kind == ActionKind::Download && divert_downloads {
                let remote_info = decision.remote.as_ref();
                placeholders.push(PlaceholderSpec {
                    local_path,
                    remote_path,
                    size: remote_info.map(|r| r.size).unwrap_or(0),
                    mtime: remote_info.map(|r| r.mtime).unwrap_or_else(Utc::now),
                });
                continue;
            }

            let size_hint = match kind {
                ActionKind::Upload => decision.local.as_ref().map(|l| l.size).unwrap_or(0),
                ActionKind::Download => decision.remote.as_ref().map(|r| r.size).unwrap_or(0),
                _ => 0,
            };
            actions.push(ExecutableAction {
                path: decision.path.clone(),
                kind,
                local_path,
                remote_path,
                size_hint,
                remote_mtime: decision.remote.as_ref().map(|r| r.mtime),
            });
        }

        (placeholders, actions)
    }

    fn create_placeholders(
        &self,
        specs: &[PlaceholderSpec],
        request: &SyncRequest,
        result: &mut SyncResult,
    ) {
        let Some(callback) = &request.placeholder else {
            return;
        };
        for spec in specs {
            if request.cancel.is_cancelled() {
                break;
            }
            match callback(spec) {
                Ok(()) => result.placeholders_created += 1,
                Err(err) => {
                    result.files_failed += 1;
                    result.errors.push(ActionError {
                        path: spec.local_path.display().to_string(),
                        operation: "placeholder".into(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        job: &Job,
        unc: &UncPath,
        local_files: &HashMap<String, FileInfo>,
        remote_files: &HashMap<String, FileInfo>,
        cached: &HashMap<String, FileInfo>,
        executed: &[SyncDecision],
        outcomes: &[ActionOutcome],
        result: &mut SyncResult,
    ) {
        let now = Utc::now();
        let decisions: HashMap<&str, &SyncDecision> =
            executed.iter().map(|d| (d.path.as_str(), d)).collect();
        let mut upserts = Vec::new();

        for outcome in outcomes {
            match outcome.status {
                ActionStatus::Success => {}
                ActionStatus::Skipped => {
                    result.files_skipped += 1;
                    continue;
                }
                ActionStatus::Failed => {
                    result.files_failed += 1;
                    result.errors.push(ActionError {
                        path: outcome.path.clone(),
                        operation: outcome.kind.as_str().into(),
                        message: outcome.error.clone().unwrap_or_default(),
                    });
                    if let Err(err) = self.db.set_sync_status(
                        job.id,
                        &outcome.path,
                        SyncStatus::Error,
                        outcome.error.as_deref(),
                    ) {
                        warn!(path = %outcome.path, error = %err, "failed to record file error");
                    }
                    continue;
                }
            }

            result.bytes_transferred += outcome.bytes_transferred;
            match outcome.kind {
                ActionKind::Upload => result.files_uploaded += 1,
                ActionKind::Download => result.files_downloaded += 1,
                ActionKind::DeleteLocal => result.files_deleted_local += 1,
                ActionKind::DeleteRemote => result.files_deleted_remote += 1,
            }

            match outcome.kind {
                ActionKind::Upload | ActionKind::Download => {
                    // a keep-both sibling is a brand-new local file, not a
                    // synced one; the row tracks the original path so the
                    // next run uploads the surviving local version
                    let decision = decisions.get(outcome.path.as_str());
                    // uploads carry the digest the scanner computed;
                    // downloads carry the manifest's, when there was one.
                    // an empty digest is filled in by the next scan.
                    // the row records the mtime both trees now carry
                    // (transfers preserve timestamps), so deletion
                    // detection can match against either side
                    let (hash, mtime) = match outcome.kind {
                        ActionKind::Upload => {
                            let local = decision.and_then(|d| d.local.as_ref());
                            (
                                local.map(|l| l.hash.clone()).unwrap_or_default(),
                                local.map(|l| l.mtime).unwrap_or(now),
                            )
                        }
                        _ => {
                            let remote = decision.and_then(|d| d.remote.as_ref());
                            (
                                remote.map(|r| r.hash.clone()).unwrap_or_default(),
                                remote.map(|r| r.mtime).unwrap_or(now),
                            )
                        }
                    };
                    upserts.push(FileStateUpsert {
                        job_id: job.id,
                        local_path: outcome.path.clone(),
                        remote_path: unc.join(&outcome.path),
                        size: outcome.bytes_transferred,
                        mtime,
                        hash,
                        sync_status: SyncStatus::Idle,
                        last_sync: Some(now),
                    });
                }
                ActionKind::DeleteLocal | ActionKind::DeleteRemote => {
                    if let Err(err) = self.db.delete_file_state(job.id, &outcome.path) {
                        warn!(path = %outcome.path, error = %err, "failed to drop cache row");
                    }
                }
            }
        }

        // initialize (or refresh) rows for files already in agreement on
        // both sides; without this, a later one-sided deletion would look
        // like a creation on the other side
        for (path, local) in local_files {
            let Some(remote) = remote_files.get(path) else {
                continue;
            };
            if !detector::same(Some(local), Some(remote)) {
                continue;
            }
            let needs_row = match cached.get(path) {
                None => true,
                Some(existing) => !detector::same(Some(local), Some(existing)),
            };
            if needs_row {
                upserts.push(FileStateUpsert {
                    job_id: job.id,
                    local_path: path.clone(),
                    remote_path: unc.join(path),
                    size: local.size,
                    mtime: local.mtime,
                    hash: local.hash.clone(),
                    sync_status: SyncStatus::Idle,
                    last_sync: Some(now),
                });
            }
        }

        // transfers already happened; a persistence hiccup here must not
        // fail the sync
        if let Err(err) = self.db.bulk_upsert_file_states(&upserts) {
            warn!(job_id = job.id, error = %err, "finalization cache update failed");
        }
    }

    fn append_history(&self, job: &Job, result: &SyncResult) {
        let entry = NewHistoryEntry {
            job_id: job.id,
            timestamp: Utc::now(),
            files_synced: result.files_synced(),
            files_failed: result.files_failed,
            bytes_transferred: result.bytes_transferred,
            duration_seconds: result.duration.as_secs_f64(),
            status: result.status,
            error_summary: if result.cancelled {
                Some(
                    result
                        .error_summary()
                        .map(|s| format!("cancelled; {s}"))
                        .unwrap_or_else(|| "cancelled".into()),
                )
            } else {
                result.error_summary()
            },
        };
        if let Err(err) = self.db.append_history(&entry) {
            warn!(job_id = job.id, error = %err, "failed to append history");
        }
    }

    /// Record a sync that died in preparation or scanning
    fn record_failure(&self, job: &Job, err: &SyncError, started: Instant) {
        let status = if matches!(err, SyncError::Cancelled | SyncError::ScanAborted) {
            SyncStatus::Idle
        } else {
            SyncStatus::Error
        };
        if let Err(e) = self.db.set_job_status(job.id, status) {
            warn!(job_id = job.id, error = %e, "failed to update job status");
        }
        let entry = NewHistoryEntry {
            job_id: job.id,
            timestamp: Utc::now(),
            files_synced: 0,
            files_failed: 0,
            bytes_transferred: 0,
            duration_seconds: started.elapsed().as_secs_f64(),
            status: HistoryStatus::Failed,
            error_summary: Some(err.to_string()),
        };
        if let Err(e) = self.db.append_history(&entry) {
            warn!(job_id = job.id, error = %e, "failed to append history");
        }
    }
}

fn mode_allows(mode: SyncMode, action: &ChangeAction) -> bool {
    match action {
        ChangeAction::Upload | ChangeAction::DeleteRemote => mode.allows_upload(),
        ChangeAction::Download | ChangeAction::DeleteLocal => mode.allows_download(),
        ChangeAction::None | ChangeAction::Conflict(_) => false,
    }
}

fn final_status(result: &SyncResult, attempted: u64, failed_actions: u64) -> HistoryStatus {
    if attempted > 0 && failed_actions == attempted {
        return HistoryStatus::Failed;
    }
    // success demands a clean run: no errors AND no conflicts found, even
    // ones a policy went on to resolve
    if result.files_failed == 0 && result.conflicts_found == 0 && !result.cancelled {
        HistoryStatus::Success
    } else {
        HistoryStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(path: &str, size: u64, secs: i64, hash: &str) -> FileInfo {
        FileInfo {
            path: path.into(),
            size,
            mtime: Utc.timestamp_opt(secs, 0).unwrap(),
            hash: hash.into(),
        }
    }

    fn decision(action: ChangeAction) -> SyncDecision {
        SyncDecision {
            path: "a.txt".into(),
            action,
            local: Some(info("a.txt", 1, 0, "h")),
            remote: Some(info("a.txt", 1, 0, "h")),
            cached: None,
            download_as: None,
        }
    }

    #[test]
    fn mode_filter_gates_actions() {
        assert!(mode_allows(SyncMode::Mirror, &ChangeAction::Upload));
        assert!(mode_allows(SyncMode::Mirror, &ChangeAction::DeleteLocal));
        assert!(mode_allows(SyncMode::MirrorPriority, &ChangeAction::Download));

        assert!(mode_allows(SyncMode::Upload, &ChangeAction::Upload));
        assert!(mode_allows(SyncMode::Upload, &ChangeAction::DeleteRemote));
        assert!(!mode_allows(SyncMode::Upload, &ChangeAction::Download));
        assert!(!mode_allows(SyncMode::Upload, &ChangeAction::DeleteLocal));

        assert!(mode_allows(SyncMode::Download, &ChangeAction::Download));
        assert!(mode_allows(SyncMode::Download, &ChangeAction::DeleteLocal));
        assert!(!mode_allows(SyncMode::Download, &ChangeAction::Upload));

        assert!(!mode_allows(SyncMode::Mirror, &ChangeAction::None));
    }

    #[test]
    fn error_summary_caps_at_three() {
        let mut result = SyncResult::default();
        assert_eq!(result.error_summary(), None);

        for i in 0..5 {
            result.errors.push(ActionError {
                path: format!("f{i}.txt"),
                operation: "upload".into(),
                message: "boom".into(),
            });
        }
        assert_eq!(
            result.error_summary().unwrap(),
            "f0.txt (upload); f1.txt (upload); f2.txt (upload); and 2 more"
        );
    }

    #[test]
    fn final_status_grades() {
        let mut result = SyncResult::default();
        assert_eq!(final_status(&result, 0, 0), HistoryStatus::Success);

        result.files_uploaded = 3;
        assert_eq!(final_status(&result, 3, 0), HistoryStatus::Success);

        result.files_failed = 1;
        assert_eq!(final_status(&result, 4, 1), HistoryStatus::Partial);

        let all_failed = SyncResult {
            files_failed: 2,
            ..Default::default()
        };
        assert_eq!(final_status(&all_failed, 2, 2), HistoryStatus::Failed);
    }

    #[test]
    fn resolved_conflicts_still_demote_to_partial() {
        // a conflict the policy resolved and executed cleanly counts
        // against success: ConflictsFound must be zero for that grade
        let mut result = SyncResult {
            files_uploaded: 1,
            conflicts_found: 1,
            ..Default::default()
        };
        assert_eq!(final_status(&result, 1, 0), HistoryStatus::Partial);

        result
            .unresolved_conflicts
            .push(decision(ChangeAction::Conflict(
                crate::core::detector::ConflictKind::BothModified,
            )));
        assert_eq!(final_status(&result, 1, 0), HistoryStatus::Partial);
    }
}
