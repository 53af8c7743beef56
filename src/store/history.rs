/*!
 * Sync history and aggregate statistics
 */

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_ts, parse_ts, Database};
use crate::error::Result;
use crate::model::{HistoryStatus, SyncHistoryEntry};

/// New history row; id is assigned by the store
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub job_id: i64,
    pub timestamp: DateTime<Utc>,
    pub files_synced: u64,
    pub files_failed: u64,
    pub bytes_transferred: u64,
    pub duration_seconds: f64,
    pub status: HistoryStatus,
    pub error_summary: Option<String>,
}

/// Engine-wide aggregates for dashboards and the CLI
#[derive(Debug, Clone, Default)]
pub struct EngineStatistics {
    pub job_count: u64,
    pub enabled_job_count: u64,
    pub tracked_files: u64,
    pub tracked_bytes: u64,
    pub offline_queue_items: u64,
    pub total_syncs: u64,
    pub total_files_synced: u64,
    pub total_bytes_transferred: u64,
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, i64, String, i64, i64, i64, f64, String, Option<String>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

impl Database {
    pub fn append_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sync_history (job_id, timestamp, files_synced, files_failed, \
             bytes_transferred, duration_seconds, status, error_summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.job_id,
                format_ts(entry.timestamp),
                entry.files_synced as i64,
                entry.files_failed as i64,
                entry.bytes_transferred as i64,
                entry.duration_seconds,
                entry.status.as_str(),
                entry.error_summary,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent history rows for one job, newest first
    pub fn list_history(&self, job_id: i64, limit: u32) -> Result<Vec<SyncHistoryEntry>> {
        let raws = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, job_id, timestamp, files_synced, files_failed, bytes_transferred, \
                 duration_seconds, status, error_summary
                 FROM sync_history WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![job_id, limit], history_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        raws.into_iter()
            .map(|(id, job_id, ts, synced, failed, bytes, duration, status, summary)| {
                Ok(SyncHistoryEntry {
                    id,
                    job_id,
                    timestamp: parse_ts(&ts)?,
                    files_synced: synced.max(0) as u64,
                    files_failed: failed.max(0) as u64,
                    bytes_transferred: bytes.max(0) as u64,
                    duration_seconds: duration,
                    status: HistoryStatus::parse(&status)?,
                    error_summary: summary,
                })
            })
            .collect()
    }

    /// Drop history rows older than `cutoff`; retention is the caller's
    /// policy
    pub fn purge_history_before(&self, job_id: i64, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        let purged = conn.execute(
            "DELETE FROM sync_history WHERE job_id = ?1 AND timestamp < ?2",
            params![job_id, format_ts(cutoff)],
        )?;
        Ok(purged)
    }

    pub fn statistics(&self) -> Result<EngineStatistics> {
        let (job_count, enabled_job_count, total_syncs, total_files_synced, total_bytes) = {
            let conn = self.conn();
            let job_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM sync_jobs", [], |row| row.get(0))?;
            let enabled: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_jobs WHERE enabled = 1",
                [],
                |row| row.get(0),
            )?;
            let (syncs, files, bytes): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(files_synced), 0), \
                 COALESCE(SUM(bytes_transferred), 0) FROM sync_history",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            (job_count, enabled, syncs, files, bytes)
        };

        Ok(EngineStatistics {
            job_count: job_count.max(0) as u64,
            enabled_job_count: enabled_job_count.max(0) as u64,
            tracked_files: self.count_file_states(None)?,
            tracked_bytes: self.total_tracked_bytes()?,
            offline_queue_items: self.offline_queue_count()?,
            total_syncs: total_syncs.max(0) as u64,
            total_files_synced: total_files_synced.max(0) as u64,
            total_bytes_transferred: total_bytes.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_job;
    use super::*;
    use chrono::Duration;

    fn entry(job_id: i64, ts: DateTime<Utc>, status: HistoryStatus) -> NewHistoryEntry {
        NewHistoryEntry {
            job_id,
            timestamp: ts,
            files_synced: 5,
            files_failed: 0,
            bytes_transferred: 1024,
            duration_seconds: 1.5,
            status,
            error_summary: None,
        }
    }

    #[test]
    fn append_and_list_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let job = db.create_job(&test_job()).unwrap();

        let t0 = Utc::now();
        db.append_history(&entry(job.id, t0, HistoryStatus::Success)).unwrap();
        db.append_history(&entry(job.id, t0 + Duration::seconds(60), HistoryStatus::Partial))
            .unwrap();

        let rows = db.list_history(job.id, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, HistoryStatus::Partial);
        assert_eq!(rows[1].status, HistoryStatus::Success);
    }

    #[test]
    fn purge_drops_old_rows_only() {
        let db = Database::open_in_memory().unwrap();
        let job = db.create_job(&test_job()).unwrap();

        let old = Utc::now() - Duration::days(60);
        let recent = Utc::now();
        db.append_history(&entry(job.id, old, HistoryStatus::Success)).unwrap();
        db.append_history(&entry(job.id, recent, HistoryStatus::Success)).unwrap();

        let purged = db
            .purge_history_before(job.id, Utc::now() - Duration::days(30))
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(db.list_history(job.id, 10).unwrap().len(), 1);
    }

    #[test]
    fn statistics_aggregate_across_tables() {
        let db = Database::open_in_memory().unwrap();
        let job = db.create_job(&test_job()).unwrap();
        db.append_history(&entry(job.id, Utc::now(), HistoryStatus::Success)).unwrap();

        let stats = db.statistics().unwrap();
        assert_eq!(stats.job_count, 1);
        assert_eq!(stats.enabled_job_count, 1);
        assert_eq!(stats.total_syncs, 1);
        assert_eq!(stats.total_files_synced, 5);
        assert_eq!(stats.total_bytes_transferred, 1024);
        assert_eq!(stats.offline_queue_items, 0);
    }
}
