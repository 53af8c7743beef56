/*!
 * Embedded sync-state database
 *
 * A single SQLite connection (behind a mutex) owns all persisted state:
 * jobs, per-file cache rows, exclusions, history, and app configuration.
 * The schema is embedded and applied on open; bulk updates run inside one
 * transaction.
 */

pub mod exclusions;
pub mod file_state;
pub mod history;
pub mod jobs;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{Result, SyncError};

const SCHEMA_VERSION: i64 = 3;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    local_path TEXT NOT NULL,
    remote_path TEXT NOT NULL,
    server_credential_id INTEGER,
    sync_mode TEXT NOT NULL DEFAULT 'mirror',
    trigger_mode TEXT NOT NULL DEFAULT 'manual',
    trigger_params TEXT,
    conflict_resolution TEXT NOT NULL DEFAULT 'recent',
    enabled INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'idle',
    last_run TEXT,
    next_run TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (local_path, remote_path)
);

CREATE TABLE IF NOT EXISTS files_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES sync_jobs(id) ON DELETE CASCADE,
    local_path TEXT NOT NULL,
    remote_path TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    mtime TEXT NOT NULL,
    hash TEXT,
    sync_status TEXT NOT NULL DEFAULT 'idle',
    last_sync TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (job_id, local_path)
);

CREATE INDEX IF NOT EXISTS idx_files_state_job ON files_state(job_id);

CREATE TABLE IF NOT EXISTS exclusions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    pattern TEXT NOT NULL,
    job_id INTEGER REFERENCES sync_jobs(id) ON DELETE CASCADE,
    reason TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES sync_jobs(id) ON DELETE CASCADE,
    timestamp TEXT NOT NULL,
    files_synced INTEGER NOT NULL DEFAULT 0,
    files_failed INTEGER NOT NULL DEFAULT 0,
    bytes_transferred INTEGER NOT NULL DEFAULT 0,
    duration_seconds REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    error_summary TEXT
);

CREATE TABLE IF NOT EXISTS smb_servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host TEXT NOT NULL UNIQUE,
    display_name TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    value_type TEXT NOT NULL DEFAULT 'string'
);

CREATE TABLE IF NOT EXISTS offline_queue_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER REFERENCES sync_jobs(id) ON DELETE CASCADE,
    payload TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS db_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the state database at `path`
    ///
    /// Creates the parent directory at mode 0700, applies the embedded
    /// schema, verifies `schema_version`, and purges `files_state` rows
    /// whose local path carries drive-letter corruption. `encryption_key`
    /// is applied via `PRAGMA key` when the build links SQLCipher.
    pub fn open(path: &Path, encryption_key: Option<&str>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::from_io(e, parent))?;
            restrict_dir_permissions(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::initialize(conn, encryption_key)
    }

    /// In-memory database for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?, None)
    }

    fn initialize(conn: Connection, encryption_key: Option<&str>) -> Result<Self> {
        if let Some(key) = encryption_key {
            conn.pragma_update(None, "key", key)?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.check_schema_version()?;
        let purged = db.purge_corrupt_rows()?;
        if purged > 0 {
            tracing::warn!(purged, "purged files_state rows with absolute local paths");
        }
        Ok(db)
    }

    fn check_schema_version(&self) -> Result<()> {
        let conn = self.conn();
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM db_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match stored {
            None => {
                conn.execute(
                    "INSERT INTO db_metadata (key, value) VALUES ('schema_version', ?1)",
                    [SCHEMA_VERSION.to_string()],
                )?;
                Ok(())
            }
            Some(value) => {
                let version: i64 = value
                    .parse()
                    .map_err(|_| SyncError::Database(format!("bad schema_version: {value}")))?;
                if version > SCHEMA_VERSION {
                    return Err(SyncError::Database(format!(
                        "database schema {version} is newer than supported {SCHEMA_VERSION}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Remove `files_state` rows whose local_path is absolute
    ///
    /// Relative paths never contain `:\` or `:/`; rows that do predate the
    /// relative-path schema and would poison deletion detection.
    fn purge_corrupt_rows(&self) -> Result<usize> {
        let conn = self.conn();
        let purged = conn.execute(
            r"DELETE FROM files_state WHERE local_path LIKE '%:\%' OR local_path LIKE '%:/%'",
            [],
        )?;
        Ok(purged)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Read one `app_config` value
    pub fn get_config_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM app_config WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(value)
    }

    /// Write one `app_config` value with its type tag
    pub fn set_config_value(&self, key: &str, value: &str, value_type: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO app_config (key, value, value_type) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, value_type = excluded.value_type",
            [key, value, value_type],
        )?;
        Ok(())
    }

    /// Count of queued offline items, reported in statistics only
    pub fn offline_queue_count(&self) -> Result<u64> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM offline_queue_items", [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }
}

#[cfg(unix)]
fn restrict_dir_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| SyncError::from_io(e, dir))
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Database(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(&s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConflictPolicy, NewJob, SyncMode};

    pub(crate) fn test_job() -> NewJob {
        NewJob {
            name: "docs".into(),
            local_path: "/L".into(),
            remote_path: r"\\s\sh\R".into(),
            server_credential_id: None,
            sync_mode: SyncMode::Mirror,
            trigger_mode: "manual".into(),
            trigger_params: None,
            conflict_resolution: ConflictPolicy::Recent,
            enabled: true,
        }
    }

    #[test]
    fn open_creates_schema_and_version() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let version: String = conn
            .query_row(
                "SELECT value FROM db_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn open_on_disk_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.db");
        let _db = Database::open(&path, None).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        drop(Database::open(&path, None).unwrap());
        let _again = Database::open(&path, None).unwrap();
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let db = Database::open(&path, None).unwrap();
            db.conn()
                .execute(
                    "UPDATE db_metadata SET value = '999' WHERE key = 'schema_version'",
                    [],
                )
                .unwrap();
        }
        assert!(matches!(
            Database::open(&path, None),
            Err(SyncError::Database(_))
        ));
    }

    #[test]
    fn corrupt_absolute_rows_purged_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let db = Database::open(&path, None).unwrap();
            let job = db.create_job(&test_job()).unwrap();
            let now = format_ts(Utc::now());
            for bad in [r"C:\Users\x\file.txt", "C:/Users/x/other.txt"] {
                db.conn().execute(
                    "INSERT INTO files_state (job_id, local_path, remote_path, size, mtime, created_at, updated_at)
                     VALUES (?1, ?2, 'r', 0, ?3, ?3, ?3)",
                    rusqlite::params![job.id, bad, now],
                ).unwrap();
            }
            db.conn().execute(
                "INSERT INTO files_state (job_id, local_path, remote_path, size, mtime, created_at, updated_at)
                 VALUES (?1, 'docs/good.txt', 'r', 0, ?2, ?2, ?2)",
                rusqlite::params![job.id, now],
            ).unwrap();
        }

        let db = Database::open(&path, None).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM files_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn app_config_round_trips() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_config_value("theme").unwrap(), None);
        db.set_config_value("theme", "dark", "string").unwrap();
        db.set_config_value("theme", "light", "string").unwrap();
        assert_eq!(db.get_config_value("theme").unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn offline_queue_counts() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.offline_queue_count().unwrap(), 0);
        db.conn()
            .execute(
                "INSERT INTO offline_queue_items (payload, created_at) VALUES ('x', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        assert_eq!(db.offline_queue_count().unwrap(), 1);
    }
}
