/*!
 * Local scanning with 3-step change detection
 *
 * For every file the walker emits, the scanner classifies it as new,
 * modified, or unchanged without rehashing anything whose size and
 * second-truncated mtime match the cache. Content is only hashed for new
 * files, quick-compare misses, and rows whose cached hash is still empty.
 */

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::BatchingConfig;
use crate::core::exclusion::ExclusionMatcher;
use crate::core::hasher::Hasher;
use crate::core::walker::{Walker, WalkerOptions, WalkerStats};
use crate::error::{Result, SyncError};
use crate::model::{FileInfo, FileState, Job};
use crate::store::file_state::FileStateUpsert;
use crate::store::Database;

/// Per-file failure recorded during a scan
#[derive(Debug, Clone)]
pub struct ScanEntryError {
    pub path: String,
    pub message: String,
}

/// Disjoint classification of everything the scan saw
#[derive(Debug, Default)]
pub struct ScanResult {
    pub new: Vec<FileInfo>,
    pub modified: Vec<FileInfo>,
    pub unchanged: Vec<FileInfo>,
    /// Cached paths that no longer exist on disk; not purged here
    pub deleted: Vec<String>,
    pub errors: Vec<ScanEntryError>,
    pub stats: WalkerStats,
    pub duration: Duration,
}

impl ScanResult {
    /// All present files keyed by relative path, for the 3-way merge
    pub fn local_file_map(&self) -> HashMap<String, FileInfo> {
        self.new
            .iter()
            .chain(self.modified.iter())
            .chain(self.unchanged.iter())
            .map(|info| (info.path.clone(), info.clone()))
            .collect()
    }

    pub fn files_seen(&self) -> u64 {
        (self.new.len() + self.modified.len() + self.unchanged.len()) as u64
    }
}

/// Callback invoked per scanned file with (files_seen, rel_path)
pub type ScanProgress<'a> = &'a (dyn Fn(u64, &str) + Sync);

pub struct LocalScanner {
    db: Arc<Database>,
    hasher: Hasher,
    batching: BatchingConfig,
    active: Mutex<HashSet<i64>>,
}

struct ScanGuard<'a> {
    scanner: &'a LocalScanner,
    job_id: i64,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.scanner.active.lock().unwrap().remove(&self.job_id);
    }
}

/// Batches metadata-refresh writes so the transaction rate stays low
struct WriteBatch<'a> {
    db: &'a Database,
    pending: Vec<FileStateUpsert>,
    batch_size: usize,
    max_delay: Duration,
    last_flush: Instant,
}

impl<'a> WriteBatch<'a> {
    fn new(db: &'a Database, batching: &BatchingConfig) -> Self {
        Self {
            db,
            pending: Vec::new(),
            batch_size: batching.cache_batch_size.max(1),
            max_delay: Duration::from_secs(batching.cache_batch_delay_seconds),
            last_flush: Instant::now(),
        }
    }

    fn push(&mut self, upsert: FileStateUpsert) -> Result<()> {
        self.pending.push(upsert);
        if self.pending.len() >= self.batch_size || self.last_flush.elapsed() >= self.max_delay {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.db.bulk_upsert_file_states(&self.pending)?;
            self.pending.clear();
        }
        self.last_flush = Instant::now();
        Ok(())
    }
}

impl LocalScanner {
    pub fn new(db: Arc<Database>, hasher: Hasher, batching: BatchingConfig) -> Self {
        Self {
            db,
            hasher,
            batching,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Scan one job's local tree
    ///
    /// Rejects a second concurrent scan of the same job. Cancellation
    /// aborts the walk and surfaces as `ScanAborted`.
    pub fn scan(
        &self,
        job: &Job,
        matcher: &ExclusionMatcher,
        options: WalkerOptions,
        cancel: &CancelToken,
        progress: Option<ScanProgress<'_>>,
    ) -> Result<ScanResult> {
        let _guard = self.acquire(job.id)?;
        let started = Instant::now();

        let cached: HashMap<String, FileState> = self
            .db
            .list_file_states(job.id)?
            .into_iter()
            .map(|state| (state.local_path.clone(), state))
            .collect();

        let mut result = ScanResult::default();
        let mut batch = WriteBatch::new(&self.db, &self.batching);
        let mut seen = HashSet::new();

        let root = Path::new(&job.local_path);
        let walker = Walker::new(root, matcher, options);
        let walk = walker.walk(cancel, |meta| {
            seen.insert(meta.rel_path.clone());
            let mtime = DateTime::<Utc>::from(meta.mtime);
            let info = FileInfo {
                path: meta.rel_path.clone(),
                size: meta.size,
                mtime,
                hash: String::new(),
            };
            self.classify(job, info, &meta.path, cached.get(&meta.rel_path), &mut result, &mut batch);

            if let Some(report) = progress {
                report(result.files_seen(), &meta.rel_path);
            }
        });

        let walk_report = match walk {
            Ok(report) => report,
            Err(SyncError::Cancelled) => {
                batch.flush().ok();
                return Err(SyncError::ScanAborted);
            }
            Err(err) => return Err(err),
        };

        batch.flush()?;

        for err in walk_report.errors {
            result.errors.push(ScanEntryError {
                path: err
                    .path
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                message: err.message,
            });
        }
        result.stats = walk_report.stats;

        // deletion detection by set difference; the orchestrator decides
        // what to do with the rows
        result.deleted = cached
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();
        result.deleted.sort();

        result.duration = started.elapsed();
        debug!(
            job_id = job.id,
            new = result.new.len(),
            modified = result.modified.len(),
            unchanged = result.unchanged.len(),
            deleted = result.deleted.len(),
            errors = result.errors.len(),
            elapsed_ms = result.duration.as_millis() as u64,
            "local scan finished"
        );
        Ok(result)
    }

    fn acquire(&self, job_id: i64) -> Result<ScanGuard<'_>> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(job_id) {
            return Err(SyncError::SyncInProgress(job_id));
        }
        Ok(ScanGuard {
            scanner: self,
            job_id,
        })
    }

    /// The 3-step change algorithm for one file
    fn classify(
        &self,
        job: &Job,
        mut info: FileInfo,
        abs_path: &Path,
        cached: Option<&FileState>,
        result: &mut ScanResult,
        batch: &mut WriteBatch<'_>,
    ) {
        // step 1: lookup
        let Some(state) = cached else {
            match self.hasher.hash_file(abs_path) {
                Ok(outcome) => {
                    info.hash = outcome.hex;
                    result.new.push(info);
                }
                Err(err) => result.errors.push(ScanEntryError {
                    path: info.path,
                    message: err.to_string(),
                }),
            }
            return;
        };

        // step 2: quick compare; an empty cached hash always falls through
        // so finalization-written rows get their digest filled in
        if !state.hash.is_empty()
            && info.size == state.size
            && info.mtime_secs() == state.mtime.timestamp()
        {
            info.hash = state.hash.clone();
            result.unchanged.push(info);
            return;
        }

        // step 3: content compare
        let outcome = match self.hasher.hash_file(abs_path) {
            Ok(outcome) => outcome,
            Err(err) => {
                result.errors.push(ScanEntryError {
                    path: info.path,
                    message: err.to_string(),
                });
                return;
            }
        };
        info.hash = outcome.hex;

        let content_unchanged = if state.hash.is_empty() {
            // finalization rows carry no digest yet; size is the only
            // ancestor signal available
            info.size == state.size
        } else {
            info.hash == state.hash
        };

        if content_unchanged {
            // size/mtime drift, or a finalization row whose digest was left
            // empty; refresh it so the next scan takes the quick path
            let refresh = FileStateUpsert {
                job_id: job.id,
                local_path: info.path.clone(),
                remote_path: state.remote_path.clone(),
                size: info.size,
                mtime: info.mtime,
                hash: info.hash.clone(),
                sync_status: state.sync_status,
                last_sync: state.last_sync,
            };
            if let Err(err) = batch.push(refresh) {
                warn!(path = %info.path, error = %err, "cache refresh failed");
            }
            result.unchanged.push(info);
        } else {
            result.modified.push(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConflictPolicy, NewJob, SyncMode, SyncStatus};
    use std::fs;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<Database>, Job, LocalScanner) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let job = db
            .create_job(&NewJob {
                name: "t".into(),
                local_path: dir.path().to_string_lossy().into_owned(),
                remote_path: r"\\s\sh\R".into(),
                server_credential_id: None,
                sync_mode: SyncMode::Mirror,
                trigger_mode: "manual".into(),
                trigger_params: None,
                conflict_resolution: ConflictPolicy::Recent,
                enabled: true,
            })
            .unwrap();
        let scanner = LocalScanner::new(db.clone(), Hasher::default(), BatchingConfig::default());
        (db, job, scanner)
    }

    fn scan(scanner: &LocalScanner, job: &Job) -> ScanResult {
        scanner
            .scan(
                job,
                &ExclusionMatcher::empty(),
                WalkerOptions::default(),
                &CancelToken::new(),
                None,
            )
            .unwrap()
    }

    fn seed_cache(db: &Database, job: &Job, path: &str, root: &Path) {
        let metadata = fs::metadata(root.join(path)).unwrap();
        let hash = Hasher::default().hash_file(&root.join(path)).unwrap().hex;
        db.upsert_file_state(&FileStateUpsert {
            job_id: job.id,
            local_path: path.into(),
            remote_path: format!("R/{path}"),
            size: metadata.len(),
            mtime: DateTime::<Utc>::from(metadata.modified().unwrap()),
            hash,
            sync_status: SyncStatus::Idle,
            last_sync: Some(Utc::now()),
        })
        .unwrap();
    }

    #[test]
    fn uncached_files_are_new_with_hashes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let (_db, job, scanner) = setup(&dir);

        let result = scan(&scanner, &job);
        assert_eq!(result.new.len(), 1);
        assert_eq!(result.new[0].path, "a.txt");
        assert_eq!(result.new[0].hash.len(), 64);
        assert!(result.modified.is_empty() && result.unchanged.is_empty());
    }

    #[test]
    fn quick_compare_skips_rehash() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "stable").unwrap();
        let (db, job, scanner) = setup(&dir);
        seed_cache(&db, &job, "a.txt", dir.path());

        // poison the cached hash so a rehash would be visible
        db.conn()
            .execute(
                "UPDATE files_state SET hash = 'not-a-real-digest-but-not-empty-0000000000000000'",
                [],
            )
            .unwrap();

        let result = scan(&scanner, &job);
        assert_eq!(result.unchanged.len(), 1);
        // hash reused from cache, proving step 3 never ran
        assert!(result.unchanged[0].hash.starts_with("not-a-real-digest"));
    }

    #[test]
    fn mtime_drift_with_same_content_stays_unchanged() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "stable").unwrap();
        let (db, job, scanner) = setup(&dir);
        seed_cache(&db, &job, "a.txt", dir.path());

        // push the cached mtime back so the quick compare misses
        db.conn()
            .execute(
                "UPDATE files_state SET mtime = '2001-01-01T00:00:00+00:00'",
                [],
            )
            .unwrap();

        let result = scan(&scanner, &job);
        assert_eq!(result.unchanged.len(), 1);
        assert!(result.modified.is_empty());

        // the row was refreshed, so the next scan takes the quick path
        let state = db.get_file_state(job.id, "a.txt").unwrap().unwrap();
        let disk_mtime = fs::metadata(dir.path().join("a.txt")).unwrap().modified().unwrap();
        assert_eq!(
            state.mtime.timestamp(),
            DateTime::<Utc>::from(disk_mtime).timestamp()
        );
    }

    #[test]
    fn content_change_is_modified_and_keeps_ancestor_row() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "old").unwrap();
        let (db, job, scanner) = setup(&dir);
        seed_cache(&db, &job, "a.txt", dir.path());
        let ancestor = db.get_file_state(job.id, "a.txt").unwrap().unwrap();

        fs::write(dir.path().join("a.txt"), "newer-content").unwrap();

        let result = scan(&scanner, &job);
        assert_eq!(result.modified.len(), 1);
        assert_ne!(result.modified[0].hash, ancestor.hash);

        // the cached row still holds the last-synced state
        let after = db.get_file_state(job.id, "a.txt").unwrap().unwrap();
        assert_eq!(after.hash, ancestor.hash);
        assert_eq!(after.size, ancestor.size);
    }

    #[test]
    fn empty_cached_hash_gets_filled() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "fresh").unwrap();
        let (db, job, scanner) = setup(&dir);
        let metadata = fs::metadata(dir.path().join("a.txt")).unwrap();
        // finalization writes rows like this: correct metadata, empty hash
        db.upsert_file_state(&FileStateUpsert {
            job_id: job.id,
            local_path: "a.txt".into(),
            remote_path: "R/a.txt".into(),
            size: metadata.len(),
            mtime: DateTime::<Utc>::from(metadata.modified().unwrap()),
            hash: String::new(),
            sync_status: SyncStatus::Idle,
            last_sync: Some(Utc::now()),
        })
        .unwrap();

        let result = scan(&scanner, &job);
        assert_eq!(result.unchanged.len(), 1);

        let state = db.get_file_state(job.id, "a.txt").unwrap().unwrap();
        assert_eq!(state.hash.len(), 64);
    }

    #[test]
    fn deleted_files_reported_but_not_purged() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kept.txt"), "x").unwrap();
        let (db, job, scanner) = setup(&dir);
        seed_cache(&db, &job, "kept.txt", dir.path());
        db.upsert_file_state(&FileStateUpsert {
            job_id: job.id,
            local_path: "gone.txt".into(),
            remote_path: "R/gone.txt".into(),
            size: 3,
            mtime: Utc::now(),
            hash: "aa".into(),
            sync_status: SyncStatus::Idle,
            last_sync: None,
        })
        .unwrap();

        let result = scan(&scanner, &job);
        assert_eq!(result.deleted, vec!["gone.txt".to_string()]);
        // row survives the scan
        assert!(db.get_file_state(job.id, "gone.txt").unwrap().is_some());
    }

    #[test]
    fn excluded_files_do_not_reach_classification() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        fs::write(dir.path().join("junk.tmp"), "x").unwrap();
        let (_db, job, scanner) = setup(&dir);

        let matcher = ExclusionMatcher::with_defaults().unwrap();
        let result = scanner
            .scan(
                &job,
                &matcher,
                WalkerOptions::default(),
                &CancelToken::new(),
                None,
            )
            .unwrap();
        assert_eq!(result.new.len(), 1);
        assert_eq!(result.stats.excluded, 1);
    }

    #[test]
    fn cancelled_scan_aborts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let (_db, job, scanner) = setup(&dir);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = scanner
            .scan(
                &job,
                &ExclusionMatcher::empty(),
                WalkerOptions::default(),
                &cancel,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::ScanAborted));
    }

    #[test]
    fn concurrent_scan_of_same_job_rejected() {
        let dir = TempDir::new().unwrap();
        let (_db, job, scanner) = setup(&dir);

        let _guard = scanner.acquire(job.id).unwrap();
        let err = scan_err(&scanner, &job);
        assert!(matches!(err, SyncError::SyncInProgress(_)));
    }

    fn scan_err(scanner: &LocalScanner, job: &Job) -> SyncError {
        scanner
            .scan(
                job,
                &ExclusionMatcher::empty(),
                WalkerOptions::default(),
                &CancelToken::new(),
                None,
            )
            .unwrap_err()
    }
}
