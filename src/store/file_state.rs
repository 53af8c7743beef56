/*!
 * Per-file cache rows — the 3-way merge ancestors
 */

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_ts, parse_opt_ts, parse_ts, Database};
use crate::error::Result;
use crate::model::{FileInfo, FileState, SyncStatus};

/// Upsert payload for one cache row
///
/// `created_at`/`updated_at` are maintained by the store; an upsert on an
/// existing `(job_id, local_path)` preserves `created_at` and clears any
/// stored error.
#[derive(Debug, Clone)]
pub struct FileStateUpsert {
    pub job_id: i64,
    pub local_path: String,
    pub remote_path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub hash: String,
    pub sync_status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

const STATE_COLUMNS: &str =
    "job_id, local_path, remote_path, size, mtime, hash, sync_status, last_sync, error_message, \
     created_at, updated_at";

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<RawFileState> {
    Ok(RawFileState {
        job_id: row.get(0)?,
        local_path: row.get(1)?,
        remote_path: row.get(2)?,
        size: row.get(3)?,
        mtime: row.get(4)?,
        hash: row.get(5)?,
        sync_status: row.get(6)?,
        last_sync: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

struct RawFileState {
    job_id: i64,
    local_path: String,
    remote_path: String,
    size: i64,
    mtime: String,
    hash: Option<String>,
    sync_status: String,
    last_sync: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawFileState {
    fn into_state(self) -> Result<FileState> {
        Ok(FileState {
            job_id: self.job_id,
            local_path: self.local_path,
            remote_path: self.remote_path,
            size: self.size.max(0) as u64,
            mtime: parse_ts(&self.mtime)?,
            hash: self.hash.unwrap_or_default(),
            sync_status: SyncStatus::parse(&self.sync_status)?,
            last_sync: parse_opt_ts(self.last_sync)?,
            error_message: self.error_message,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn upsert_one(conn: &Connection, state: &FileStateUpsert) -> Result<()> {
    let now = format_ts(Utc::now());
    conn.execute(
        "INSERT INTO files_state (job_id, local_path, remote_path, size, mtime, hash, \
         sync_status, last_sync, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
         ON CONFLICT(job_id, local_path) DO UPDATE SET
             remote_path = excluded.remote_path,
             size = excluded.size,
             mtime = excluded.mtime,
             hash = excluded.hash,
             sync_status = excluded.sync_status,
             last_sync = excluded.last_sync,
             error_message = NULL,
             updated_at = excluded.updated_at",
        params![
            state.job_id,
            state.local_path,
            state.remote_path,
            state.size as i64,
            format_ts(state.mtime),
            state.hash,
            state.sync_status.as_str(),
            state.last_sync.map(format_ts),
            now,
        ],
    )?;
    Ok(())
}

impl Database {
    pub fn get_file_state(&self, job_id: i64, local_path: &str) -> Result<Option<FileState>> {
        let raw = {
            let conn = self.conn();
            conn.query_row(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM files_state WHERE job_id = ?1 AND local_path = ?2"
                ),
                params![job_id, local_path],
                state_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?
        };
        raw.map(RawFileState::into_state).transpose()
    }

    pub fn upsert_file_state(&self, state: &FileStateUpsert) -> Result<()> {
        let conn = self.conn();
        upsert_one(&conn, state)
    }

    /// Upsert a batch inside a single transaction
    pub fn bulk_upsert_file_states(&self, states: &[FileStateUpsert]) -> Result<()> {
        if states.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for state in states {
            upsert_one(&tx, state)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_file_state(&self, job_id: i64, local_path: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM files_state WHERE job_id = ?1 AND local_path = ?2",
            params![job_id, local_path],
        )?;
        Ok(())
    }

    pub fn list_file_states(&self, job_id: i64) -> Result<Vec<FileState>> {
        let raws = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {STATE_COLUMNS} FROM files_state WHERE job_id = ?1 ORDER BY local_path"
            ))?;
            let rows = stmt.query_map([job_id], state_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter().map(RawFileState::into_state).collect()
    }

    /// The cached map consumed by the 3-way merge, keyed by relative path
    pub fn cached_file_map(&self, job_id: i64) -> Result<HashMap<String, FileInfo>> {
        let states = self.list_file_states(job_id)?;
        Ok(states
            .into_iter()
            .map(|s| (s.local_path.clone(), s.to_file_info()))
            .collect())
    }

    pub fn set_sync_status(
        &self,
        job_id: i64,
        local_path: &str,
        status: SyncStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE files_state SET sync_status = ?1, error_message = ?2, updated_at = ?3
             WHERE job_id = ?4 AND local_path = ?5",
            params![
                status.as_str(),
                error_message,
                format_ts(Utc::now()),
                job_id,
                local_path
            ],
        )?;
        Ok(())
    }

    pub fn count_file_states(&self, job_id: Option<i64>) -> Result<u64> {
        let conn = self.conn();
        let count: i64 = match job_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(*) FROM files_state WHERE job_id = ?1",
                [id],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM files_state", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    pub fn total_tracked_bytes(&self) -> Result<u64> {
        let conn = self.conn();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size), 0) FROM files_state",
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}
