/*!
 * Error types for Anemone
 */

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug)]
pub enum SyncError {
    /// Network-level failure (connection refused/reset, timeout, no route)
    Network(String),

    /// OS denied access to a path
    PermissionDenied(PathBuf),

    /// File or directory does not exist
    NotFound(PathBuf),

    /// Path already exists where it should not
    AlreadyExists(PathBuf),

    /// Path failed validation (not UNC, absolute where relative expected, ...)
    InvalidPath(String),

    /// Destination volume is out of space
    DiskFull(PathBuf),

    /// File is locked or busy and may free up
    FileBusy(PathBuf),

    /// Uncategorized I/O error
    Io(io::Error),

    /// Persistence layer failure (query or transaction)
    Database(String),

    /// Remote filesystem failure; `transient` follows the server's verdict
    Remote {
        operation: String,
        message: String,
        transient: bool,
    },

    /// Hashing failed while scanning
    Hash { path: PathBuf, message: String },

    /// Read failed while scanning
    Read { path: PathBuf, message: String },

    /// Directory walk failed at the root
    Walker(String),

    /// Exclusion pattern failed to compile
    Exclusion(String),

    /// Worker pool no longer accepts jobs
    PoolClosed,

    /// Worker pool queue is at capacity
    QueueFull,

    /// Operation cancelled via its cancel token
    Cancelled,

    /// Scan aborted before completion
    ScanAborted,

    /// A sync for this job is already running
    SyncInProgress(i64),

    /// Job id does not exist
    JobNotFound(i64),

    /// Engine has been closed
    EngineClosed,

    /// Request failed validation
    InvalidRequest(String),

    /// Configuration error
    Config(String),

    /// Retries exhausted; wraps the final error's message
    RetriesExhausted { attempts: u32, last: String },
}

impl SyncError {
    /// Whether the retry policy may re-attempt the failed operation
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::DiskFull(_) => true,
            SyncError::FileBusy(_) => true,
            SyncError::Database(_) => true,
            SyncError::Remote { transient, .. } => *transient,
            SyncError::Hash { .. } => true,
            SyncError::Read { .. } => true,
            SyncError::QueueFull => true,
            SyncError::Io(err) => Self::is_io_retryable(err),

            SyncError::PermissionDenied(_) => false,
            SyncError::NotFound(_) => false,
            SyncError::AlreadyExists(_) => false,
            SyncError::InvalidPath(_) => false,
            SyncError::Walker(_) => false,
            SyncError::Exclusion(_) => false,
            SyncError::PoolClosed => false,
            SyncError::Cancelled => false,
            SyncError::ScanAborted => false,
            SyncError::SyncInProgress(_) => false,
            SyncError::JobNotFound(_) => false,
            SyncError::EngineClosed => false,
            SyncError::InvalidRequest(_) => false,
            SyncError::Config(_) => false,
            SyncError::RetriesExhausted { .. } => false,
        }
    }

    fn is_io_retryable(err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            err.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | WouldBlock
                | WriteZero
                | ResourceBusy
                | StorageFull
        )
    }

    /// Whether the failure came from the network side
    pub fn is_network_error(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Remote { .. } => true,
            SyncError::Io(err) => {
                use io::ErrorKind::*;
                matches!(
                    err.kind(),
                    ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected | TimedOut
                )
            }
            _ => false,
        }
    }

    /// Error category for logging and instrumentation
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Network(_) => ErrorCategory::Network,
            SyncError::PermissionDenied(_) => ErrorCategory::Permission,
            SyncError::NotFound(_)
            | SyncError::AlreadyExists(_)
            | SyncError::DiskFull(_)
            | SyncError::FileBusy(_)
            | SyncError::Io(_) => ErrorCategory::Filesystem,
            SyncError::InvalidPath(_) => ErrorCategory::Validation,
            SyncError::Database(_) => ErrorCategory::Database,
            SyncError::Remote { .. } => ErrorCategory::Remote,
            SyncError::Hash { .. } | SyncError::Read { .. } | SyncError::Walker(_) | SyncError::Exclusion(_) => {
                ErrorCategory::Scanner
            }
            SyncError::PoolClosed | SyncError::QueueFull => ErrorCategory::Worker,
            SyncError::Cancelled | SyncError::ScanAborted => ErrorCategory::Cancelled,
            SyncError::SyncInProgress(_)
            | SyncError::JobNotFound(_)
            | SyncError::EngineClosed
            | SyncError::InvalidRequest(_) => ErrorCategory::SyncState,
            SyncError::Config(_) => ErrorCategory::Configuration,
            SyncError::RetriesExhausted { .. } => ErrorCategory::Retry,
        }
    }

    /// Classify an I/O error against the path it touched
    pub fn from_io(err: io::Error, path: &std::path::Path) -> SyncError {
        use io::ErrorKind::*;
        match err.kind() {
            NotFound => SyncError::NotFound(path.to_path_buf()),
            PermissionDenied => SyncError::PermissionDenied(path.to_path_buf()),
            AlreadyExists => SyncError::AlreadyExists(path.to_path_buf()),
            StorageFull => SyncError::DiskFull(path.to_path_buf()),
            ResourceBusy => SyncError::FileBusy(path.to_path_buf()),
            _ => SyncError::Io(err),
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Permission,
    Filesystem,
    Validation,
    Database,
    Remote,
    Scanner,
    Worker,
    Cancelled,
    SyncState,
    Configuration,
    Retry,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Permission => write!(f, "permission"),
            ErrorCategory::Filesystem => write!(f, "filesystem"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Database => write!(f, "database"),
            ErrorCategory::Remote => write!(f, "remote"),
            ErrorCategory::Scanner => write!(f, "scanner"),
            ErrorCategory::Worker => write!(f, "worker"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
            ErrorCategory::SyncState => write!(f, "sync-state"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Retry => write!(f, "retry"),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Network(msg) => write!(f, "Network error: {}", msg),
            SyncError::PermissionDenied(path) => {
                write!(f, "Permission denied: {}", path.display())
            }
            SyncError::NotFound(path) => write!(f, "Not found: {}", path.display()),
            SyncError::AlreadyExists(path) => write!(f, "Already exists: {}", path.display()),
            SyncError::InvalidPath(msg) => write!(f, "Invalid path: {}", msg),
            SyncError::DiskFull(path) => write!(f, "Disk full writing {}", path.display()),
            SyncError::FileBusy(path) => write!(f, "File busy: {}", path.display()),
            SyncError::Io(err) => write!(f, "I/O error: {}", err),
            SyncError::Database(msg) => write!(f, "Database error: {}", msg),
            SyncError::Remote {
                operation, message, ..
            } => write!(f, "Remote {} failed: {}", operation, message),
            SyncError::Hash { path, message } => {
                write!(f, "Hashing {} failed: {}", path.display(), message)
            }
            SyncError::Read { path, message } => {
                write!(f, "Reading {} failed: {}", path.display(), message)
            }
            SyncError::Walker(msg) => write!(f, "Directory walk failed: {}", msg),
            SyncError::Exclusion(msg) => write!(f, "Exclusion error: {}", msg),
            SyncError::PoolClosed => write!(f, "Worker pool is closed"),
            SyncError::QueueFull => write!(f, "Worker pool queue is full"),
            SyncError::Cancelled => write!(f, "Operation cancelled"),
            SyncError::ScanAborted => write!(f, "Scan aborted"),
            SyncError::SyncInProgress(job_id) => {
                write!(f, "Sync already in progress for job {}", job_id)
            }
            SyncError::JobNotFound(job_id) => write!(f, "Job {} not found", job_id),
            SyncError::EngineClosed => write!(f, "Sync engine is closed"),
            SyncError::InvalidRequest(msg) => write!(f, "Invalid sync request: {}", msg),
            SyncError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SyncError::RetriesExhausted { attempts, last } => {
                write!(f, "Retries exhausted after {} attempts: {}", attempts, last)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Io(err)
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(SyncError::Network("connection reset".into()).is_retryable());
        assert!(SyncError::Database("locked".into()).is_retryable());
        assert!(SyncError::QueueFull.is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        assert!(!SyncError::PermissionDenied(PathBuf::from("/x")).is_retryable());
        assert!(!SyncError::NotFound(PathBuf::from("/x")).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::SyncInProgress(1).is_retryable());
        assert!(!SyncError::PoolClosed.is_retryable());
    }

    #[test]
    fn remote_transience_follows_flag() {
        let busy = SyncError::Remote {
            operation: "write".into(),
            message: "server busy".into(),
            transient: true,
        };
        let denied = SyncError::Remote {
            operation: "write".into(),
            message: "access denied".into(),
            transient: false,
        };
        assert!(busy.is_retryable());
        assert!(!denied.is_retryable());
    }

    #[test]
    fn io_classification_maps_kinds() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        match SyncError::from_io(err, std::path::Path::new("/a/b")) {
            SyncError::NotFound(p) => assert_eq!(p, PathBuf::from("/a/b")),
            other => panic!("unexpected: {:?}", other),
        }

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert!(!SyncError::from_io(err, std::path::Path::new("/a")).is_retryable());
    }

    #[test]
    fn categories_render_lowercase() {
        assert_eq!(SyncError::Cancelled.category().to_string(), "cancelled");
        assert_eq!(
            SyncError::Database("x".into()).category().to_string(),
            "database"
        );
    }
}
