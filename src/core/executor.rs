/*!
 * Action execution
 *
 * Takes the resolved decisions, orders them so the least destructive work
 * happens first (downloads, then uploads, then deletes), wraps each in the
 * retry policy, and performs it either sequentially or on the worker pool.
 */

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::core::pool::{PoolResult, WorkerPool};
use crate::core::progress::ProgressTracker;
use crate::core::retry::RetryPolicy;
use crate::error::{Result, SyncError};
use crate::remote::RemoteFs;

/// Concrete transfer/delete operation (conflicts are resolved before this
/// point)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
}

impl ActionKind {
    /// Lower runs earlier; interrupting mid-sync must never have deleted
    /// something it did not first copy
    fn priority(&self) -> u8 {
        match self {
            ActionKind::Download => 0,
            ActionKind::Upload => 1,
            ActionKind::DeleteLocal | ActionKind::DeleteRemote => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::DeleteLocal => "delete-local",
            ActionKind::DeleteRemote => "delete-remote",
        }
    }
}

/// One action with its paths already made actionable
#[derive(Debug, Clone)]
pub struct ExecutableAction {
    /// Relative path, for reporting and cache updates
    pub path: String,
    pub kind: ActionKind,
    /// Absolute local target
    pub local_path: PathBuf,
    /// Share-relative remote target
    pub remote_path: String,
    /// Expected transfer size, for progress totals
    pub size_hint: u64,
    /// Remote mtime, stamped onto downloads
    pub remote_mtime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    Failed,
    Skipped,
}

/// Result of one executed action
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub path: String,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub bytes_transferred: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

impl PoolResult for ActionOutcome {
    fn succeeded(&self) -> bool {
        self.status != ActionStatus::Failed
    }

    fn bytes_processed(&self) -> u64 {
        self.bytes_transferred
    }
}

pub struct Executor {
    remote: Arc<dyn RemoteFs>,
    retry: RetryPolicy,
    num_workers: usize,
}

impl Executor {
    pub fn new(remote: Arc<dyn RemoteFs>, retry: RetryPolicy, num_workers: usize) -> Self {
        Self {
            remote,
            retry,
            num_workers,
        }
    }

    /// Stable-sort actions into download < upload < delete order
    pub fn prioritize(actions: &mut [ExecutableAction]) {
        actions.sort_by_key(|action| action.kind.priority());
    }

    /// Execute all actions; cancellation stops dispatch, in-flight work
    /// drains, and collected outcomes are still returned
    pub fn execute(
        &self,
        mut actions: Vec<ExecutableAction>,
        cancel: &CancelToken,
        tracker: Option<Arc<ProgressTracker>>,
    ) -> Vec<ActionOutcome> {
        Self::prioritize(&mut actions);

        if self.num_workers > 0 {
            self.execute_parallel(actions, cancel, tracker)
        } else {
            self.execute_sequential(actions, cancel, tracker)
        }
    }

    fn execute_sequential(
        &self,
        actions: Vec<ExecutableAction>,
        cancel: &CancelToken,
        tracker: Option<Arc<ProgressTracker>>,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = run_action(self.remote.as_ref(), &self.retry, cancel, &action);
            if let Some(tracker) = &tracker {
                tracker.advance(1, outcome.bytes_transferred, Some(&outcome.path));
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    fn execute_parallel(
        &self,
        actions: Vec<ExecutableAction>,
        cancel: &CancelToken,
        tracker: Option<Arc<ProgressTracker>>,
    ) -> Vec<ActionOutcome> {
        let mut pool: WorkerPool<ActionOutcome> =
            WorkerPool::start(self.num_workers, self.num_workers * 2, cancel.clone());

        for action in actions {
            let remote = self.remote.clone();
            let retry = self.retry.clone();
            let job_cancel = cancel.clone();
            let job_tracker = tracker.clone();
            let accepted = pool.submit(Box::new(move || {
                let outcome = run_action(remote.as_ref(), &retry, &job_cancel, &action);
                if let Some(tracker) = &job_tracker {
                    tracker.advance(1, outcome.bytes_transferred, Some(&outcome.path));
                }
                outcome
            }));
            if !accepted {
                debug!("worker pool stopped accepting actions");
                break;
            }
        }

        pool.stop();
        pool.results().iter().collect()
    }
}

fn run_action(
    remote: &dyn RemoteFs,
    retry: &RetryPolicy,
    cancel: &CancelToken,
    action: &ExecutableAction,
) -> ActionOutcome {
    let start = Instant::now();
    let result = retry.run(cancel, || perform(remote, action));
    let duration = start.elapsed();

    match result {
        Ok((status, bytes)) => ActionOutcome {
            path: action.path.clone(),
            kind: action.kind,
            status,
            bytes_transferred: bytes,
            duration,
            error: None,
        },
        Err(err) => {
            warn!(
                path = %action.path,
                operation = action.kind.as_str(),
                category = %err.category(),
                error = %err,
                "action failed"
            );
            ActionOutcome {
                path: action.path.clone(),
                kind: action.kind,
                status: ActionStatus::Failed,
                bytes_transferred: 0,
                duration,
                error: Some(err.to_string()),
            }
        }
    }
}

fn perform(remote: &dyn RemoteFs, action: &ExecutableAction) -> Result<(ActionStatus, u64)> {
    match action.kind {
        ActionKind::Upload => {
            let metadata = match fs::metadata(&action.local_path) {
                Ok(metadata) => metadata,
                // vanished between scan and execution
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Ok((ActionStatus::Skipped, 0));
                }
                Err(err) => return Err(SyncError::from_io(err, &action.local_path)),
            };
            remote.write(&action.local_path, &action.remote_path)?;
            Ok((ActionStatus::Success, metadata.len()))
        }

        ActionKind::Download => {
            remote.read(&action.remote_path, &action.local_path)?;
            let metadata = fs::metadata(&action.local_path)
                .map_err(|e| SyncError::from_io(e, &action.local_path))?;
            if let Some(mtime) = action.remote_mtime {
                let ft = FileTime::from_unix_time(mtime.timestamp(), 0);
                if let Err(err) = filetime::set_file_mtime(&action.local_path, ft) {
                    warn!(path = %action.path, error = %err, "failed to stamp remote mtime");
                }
            }
            Ok((ActionStatus::Success, metadata.len()))
        }

        ActionKind::DeleteLocal => match fs::remove_file(&action.local_path) {
            Ok(()) => Ok((ActionStatus::Success, 0)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok((ActionStatus::Success, 0))
            }
            Err(err) => Err(SyncError::from_io(err, &action.local_path)),
        },

        ActionKind::DeleteRemote => match remote.delete(&action.remote_path) {
            Ok(()) => Ok((ActionStatus::Success, 0)),
            Err(SyncError::NotFound(_)) => Ok((ActionStatus::Success, 0)),
            Err(err) => Err(err),
        },
    }
}
