/*!
 * Phase-weighted sync progress
 *
 * Each of the five sync phases owns a slice of the 0..100 range; within a
 * phase the percentage interpolates by files processed, or by bytes when a
 * byte total is set. Callbacks are throttled so a hot execution loop cannot
 * flood the UI; phase boundaries report unconditionally.
 */

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The five phases of one sync, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Preparation,
    Scanning,
    Detection,
    Execution,
    Finalization,
}

impl SyncPhase {
    /// Slice of the overall percentage owned by this phase
    pub fn weight_range(&self) -> (f64, f64) {
        match self {
            SyncPhase::Preparation => (0.0, 5.0),
            SyncPhase::Scanning => (5.0, 25.0),
            SyncPhase::Detection => (25.0, 35.0),
            SyncPhase::Execution => (35.0, 95.0),
            SyncPhase::Finalization => (95.0, 100.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Preparation => "preparation",
            SyncPhase::Scanning => "scanning",
            SyncPhase::Detection => "detection",
            SyncPhase::Execution => "execution",
            SyncPhase::Finalization => "finalization",
        }
    }
}

/// Snapshot handed to the progress callback
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub job_id: i64,
    pub phase: SyncPhase,
    /// Overall percentage in [0, 100]
    pub percent: f64,
    pub files_processed: u64,
    pub files_total: u64,
    pub bytes_processed: u64,
    pub bytes_total: u64,
    /// Transfer rate over the current phase; 0 until bytes move
    pub rate_bytes_per_sec: f64,
    pub eta: Option<Duration>,
    pub current_path: Option<String>,
}

/// Callbacks may run on worker threads; implementations must be re-entrant
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

struct TrackerState {
    phase: SyncPhase,
    files_processed: u64,
    files_total: u64,
    bytes_processed: u64,
    bytes_total: u64,
    phase_started: Instant,
    last_report: Option<Instant>,
    current_path: Option<String>,
}

/// Serializes progress state behind a mutex; shared by the orchestrator and
/// pool workers
pub struct ProgressTracker {
    job_id: i64,
    callback: Option<ProgressCallback>,
    min_interval: Duration,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(job_id: i64, callback: Option<ProgressCallback>, min_interval: Duration) -> Self {
        Self {
            job_id,
            callback,
            min_interval,
            state: Mutex::new(TrackerState {
                phase: SyncPhase::Preparation,
                files_processed: 0,
                files_total: 0,
                bytes_processed: 0,
                bytes_total: 0,
                phase_started: Instant::now(),
                last_report: None,
                current_path: None,
            }),
        }
    }

    /// Enter a phase, resetting per-phase counters; reports unconditionally
    pub fn set_phase(&self, phase: SyncPhase) {
        {
            let mut state = self.state.lock().unwrap();
            state.phase = phase;
            state.files_processed = 0;
            state.files_total = 0;
            state.bytes_processed = 0;
            state.bytes_total = 0;
            state.phase_started = Instant::now();
            state.current_path = None;
        }
        self.report(true);
    }

    /// Set the denominators for the current phase
    pub fn set_totals(&self, files_total: u64, bytes_total: u64) {
        let mut state = self.state.lock().unwrap();
        state.files_total = files_total;
        state.bytes_total = bytes_total;
    }

    /// Record progress; reports when the throttle window has passed
    pub fn advance(&self, files: u64, bytes: u64, current_path: Option<&str>) {
        {
            let mut state = self.state.lock().unwrap();
            state.files_processed += files;
            state.bytes_processed += bytes;
            if let Some(path) = current_path {
                state.current_path = Some(path.to_string());
            }
        }
        self.report(false);
    }

    /// Current overall percentage
    pub fn percent(&self) -> f64 {
        self.snapshot().percent
    }

    /// Push a snapshot to the callback; `force` bypasses throttling
    pub fn report(&self, force: bool) {
        let Some(callback) = &self.callback else {
            return;
        };

        let update = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            if !force {
                if let Some(last) = state.last_report {
                    if now.duration_since(last) < self.min_interval {
                        return;
                    }
                }
            }
            state.last_report = Some(now);
            Self::update_from(self.job_id, &state)
        };

        callback(&update);
    }

    fn snapshot(&self) -> ProgressUpdate {
        let state = self.state.lock().unwrap();
        Self::update_from(self.job_id, &state)
    }

    fn update_from(job_id: i64, state: &TrackerState) -> ProgressUpdate {
        let (start, end) = state.phase.weight_range();
        let fraction = if state.bytes_total > 0 {
            state.bytes_processed as f64 / state.bytes_total as f64
        } else if state.files_total > 0 {
            state.files_processed as f64 / state.files_total as f64
        } else {
            0.0
        };
        let percent = (start + (end - start) * fraction.clamp(0.0, 1.0)).clamp(0.0, 100.0);

        let elapsed = state.phase_started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            state.bytes_processed as f64 / elapsed
        } else {
            0.0
        };
        let eta = if rate > 0.0 && state.bytes_total > state.bytes_processed {
            Some(Duration::from_secs_f64(
                (state.bytes_total - state.bytes_processed) as f64 / rate,
            ))
        } else {
            None
        };

        ProgressUpdate {
            job_id,
            phase: state.phase,
            percent,
            files_processed: state.files_processed,
            files_total: state.files_total,
            bytes_processed: state.bytes_processed,
            bytes_total: state.bytes_total,
            rate_bytes_per_sec: rate,
            eta,
            current_path: state.current_path.clone(),
        }
    }
}
