/*!
 * Exclusion rows
 */

use chrono::Utc;
use rusqlite::{params, Row};

use super::{format_ts, Database};
use crate::error::Result;
use crate::model::{Exclusion, ExclusionLevel};

fn exclusion_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, Option<i64>, Option<String>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_exclusion(
    (id, level, pattern, job_id, reason): (i64, String, String, Option<i64>, Option<String>),
) -> Result<Exclusion> {
    Ok(Exclusion {
        id,
        level: ExclusionLevel::parse(&level)?,
        pattern,
        job_id,
        reason,
    })
}

impl Database {
    pub fn add_exclusion(
        &self,
        level: ExclusionLevel,
        pattern: &str,
        job_id: Option<i64>,
        reason: Option<&str>,
    ) -> Result<Exclusion> {
        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO exclusions (type, pattern, job_id, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![level.as_str(), pattern, job_id, reason, format_ts(Utc::now())],
            )?;
            conn.last_insert_rowid()
        };
        Ok(Exclusion {
            id,
            level,
            pattern: pattern.to_string(),
            job_id,
            reason: reason.map(str::to_string),
        })
    }

    /// All exclusions that apply to `job_id`: stored globals plus the job's
    /// own pattern and individual rows
    pub fn list_exclusions_for_job(&self, job_id: i64) -> Result<Vec<Exclusion>> {
        let raws = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, type, pattern, job_id, reason FROM exclusions
                 WHERE type = 'global' OR job_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([job_id], exclusion_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter().map(into_exclusion).collect()
    }

    pub fn delete_exclusion(&self, id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM exclusions WHERE id = ?1", [id])?;
        Ok(())
    }
}
