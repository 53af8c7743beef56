/*!
 * Anemone - desktop file-synchronization engine
 *
 * Keeps a local directory tree and a remote SMB share in agreement:
 * - Incremental local scanning with a 3-step change algorithm that avoids
 *   rehashing unchanged files
 * - Persistent per-file sync state acting as the 3-way merge ancestor
 * - Policy-driven conflict resolution (recent, local, remote, ask, keep-both)
 * - Prioritized execution with retry, backoff, and optional parallel workers
 * - Manifest-accelerated remote scanning with SMB walk fallback
 * - Phase-weighted progress reporting and cooperative cancellation
 */

pub mod cancel;
pub mod cli_progress;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod keystore;
pub mod logging;
pub mod model;
pub mod remote;
pub mod store;

// Re-export commonly used types for convenience
pub use cancel::CancelToken;
pub use config::{AppConfig, HashAlgorithm};
pub use crate::core::detector::{decide, detect_changes, ChangeAction, ConflictKind, SyncDecision};
pub use crate::core::executor::{ActionKind, ActionOutcome, ActionStatus};
pub use crate::core::progress::{ProgressCallback, ProgressUpdate, SyncPhase};
pub use crate::core::scanner::{LocalScanner, ScanResult};
pub use engine::{SyncEngine, SyncRequest, SyncResult};
pub use error::{ErrorCategory, Result, SyncError};
pub use keystore::{Credentials, EnvKeystore, Keystore, MemoryKeystore};
pub use model::{ConflictPolicy, FileInfo, FileState, HistoryStatus, Job, NewJob, SyncMode};
pub use remote::{RemoteFs, RemoteFsFactory};
pub use store::Database;
