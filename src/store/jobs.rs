/*!
 * Job rows
 */

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_ts, parse_opt_ts, parse_ts, Database};
use crate::error::{Result, SyncError};
use crate::model::{ConflictPolicy, Job, NewJob, SyncMode, SyncStatus};

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        name: row.get(1)?,
        local_path: row.get(2)?,
        remote_path: row.get(3)?,
        server_credential_id: row.get(4)?,
        sync_mode: row.get(5)?,
        trigger_mode: row.get(6)?,
        trigger_params: row.get(7)?,
        conflict_resolution: row.get(8)?,
        enabled: row.get(9)?,
        status: row.get(10)?,
        last_run: row.get(11)?,
        next_run: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

struct RawJob {
    id: i64,
    name: String,
    local_path: String,
    remote_path: String,
    server_credential_id: Option<i64>,
    sync_mode: String,
    trigger_mode: String,
    trigger_params: Option<String>,
    conflict_resolution: String,
    enabled: bool,
    status: String,
    last_run: Option<String>,
    next_run: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawJob {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: self.id,
            name: self.name,
            local_path: self.local_path,
            remote_path: self.remote_path,
            server_credential_id: self.server_credential_id,
            sync_mode: SyncMode::parse(&self.sync_mode)?,
            trigger_mode: self.trigger_mode,
            trigger_params: self.trigger_params,
            conflict_resolution: ConflictPolicy::parse(&self.conflict_resolution)?,
            enabled: self.enabled,
            status: SyncStatus::parse(&self.status)?,
            last_run: parse_opt_ts(self.last_run)?,
            next_run: parse_opt_ts(self.next_run)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

const JOB_COLUMNS: &str = "id, name, local_path, remote_path, server_credential_id, sync_mode, \
     trigger_mode, trigger_params, conflict_resolution, enabled, status, last_run, next_run, \
     created_at, updated_at";

impl Database {
    pub fn create_job(&self, new: &NewJob) -> Result<Job> {
        let now = format_ts(Utc::now());
        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO sync_jobs (name, local_path, remote_path, server_credential_id, \
                 sync_mode, trigger_mode, trigger_params, conflict_resolution, enabled, status, \
                 created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'idle', ?10, ?10)",
                params![
                    new.name,
                    new.local_path,
                    new.remote_path,
                    new.server_credential_id,
                    new.sync_mode.as_str(),
                    new.trigger_mode,
                    new.trigger_params,
                    new.conflict_resolution.as_str(),
                    new.enabled,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_job(id)
    }

    pub fn get_job(&self, id: i64) -> Result<Job> {
        let raw = {
            let conn = self.conn();
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?1"),
                [id],
                job_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?
        };
        raw.ok_or(SyncError::JobNotFound(id))?.into_job()
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let raws = {
            let conn = self.conn();
            let mut stmt =
                conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY id"))?;
            let rows = stmt.query_map([], job_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter().map(RawJob::into_job).collect()
    }

    /// Delete a job; `files_state`, `exclusions`, and `sync_history` rows
    /// cascade
    pub fn delete_job(&self, id: i64) -> Result<()> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM sync_jobs WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(SyncError::JobNotFound(id));
        }
        Ok(())
    }

    pub fn set_job_status(&self, id: i64, status: SyncStatus) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE sync_jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), format_ts(Utc::now()), id],
        )?;
        Ok(())
    }

    pub fn set_job_last_run(&self, id: i64, last_run: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE sync_jobs SET last_run = ?1, updated_at = ?2 WHERE id = ?3",
            params![format_ts(last_run), format_ts(Utc::now()), id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_job;
    use super::*;

    #[test]
    fn create_and_get_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let job = db.create_job(&test_job()).unwrap();

        let fetched = db.get_job(job.id).unwrap();
        assert_eq!(fetched.name, "docs");
        assert_eq!(fetched.sync_mode, SyncMode::Mirror);
        assert_eq!(fetched.conflict_resolution, ConflictPolicy::Recent);
        assert_eq!(fetched.status, SyncStatus::Idle);
        assert!(fetched.enabled);
        assert!(fetched.last_run.is_none());
    }

    #[test]
    fn get_missing_job_errors() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_job(42), Err(SyncError::JobNotFound(42))));
    }

    #[test]
    fn duplicate_path_pair_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_job(&test_job()).unwrap();
        assert!(db.create_job(&test_job()).is_err());
    }

    #[test]
    fn status_and_last_run_update() {
        let db = Database::open_in_memory().unwrap();
        let job = db.create_job(&test_job()).unwrap();

        db.set_job_status(job.id, SyncStatus::Syncing).unwrap();
        assert_eq!(db.get_job(job.id).unwrap().status, SyncStatus::Syncing);

        let ts = Utc::now();
        db.set_job_last_run(job.id, ts).unwrap();
        let fetched = db.get_job(job.id).unwrap();
        assert_eq!(fetched.last_run.unwrap().timestamp(), ts.timestamp());
    }

    #[test]
    fn delete_cascades_to_file_state() {
        let db = Database::open_in_memory().unwrap();
        let job = db.create_job(&test_job()).unwrap();
        let now = format_ts(Utc::now());
        db.conn()
            .execute(
                "INSERT INTO files_state (job_id, local_path, remote_path, size, mtime, created_at, updated_at)
                 VALUES (?1, 'a.txt', 'R/a.txt', 1, ?2, ?2, ?2)",
                params![job.id, now],
            )
            .unwrap();

        db.delete_job(job.id).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM files_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn list_orders_by_id() {
        let db = Database::open_in_memory().unwrap();
        let mut second = test_job();
        second.name = "pics".into();
        second.local_path = "/P".into();
        db.create_job(&test_job()).unwrap();
        db.create_job(&second).unwrap();

        let jobs = db.list_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].id < jobs[1].id);
    }
}
