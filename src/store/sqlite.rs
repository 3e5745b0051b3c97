//! SQLite index store: WAL-mode database shared by one writer process and
//! concurrent reader processes.
//!
//! WAL is what makes the consistency contract cheap: the indexer's per-job
//! snapshot swap is a single transaction, and a cleaner reading through its
//! own connection sees the pre- or post-swap snapshot, never a torn one,
//! without either side blocking the other.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags, params};

use crate::core::errors::{Result, RswError};
use crate::core::job::JobId;
use crate::lock::Role;
use crate::store::{
    IndexReader, IndexWriter, IndexedFile, JobIndexStats, RunHistoryEntry, RunRecord, RunStatus,
};

/// rusqlite-backed implementation of the index store and run history.
pub struct IndexStore {
    conn: Connection,
    path: PathBuf,
}

impl IndexStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RswError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }

    // ──────────────────── run_history ────────────────────

    /// Append exactly one aggregate row for a completed run attempt.
    pub fn append_run(&self, record: &RunRecord) -> Result<i64> {
        self.conn
            .prepare_cached(
                "INSERT INTO run_history (
                role, started_at, duration_ms, jobs_processed, files_affected,
                bytes_freed, error_count, status, dry_run
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            )?
            .execute(params![
                record.role.as_str(),
                to_rfc3339(&record.started_at),
                record.duration_ms as i64,
                record.jobs_processed,
                record.files_affected as i64,
                record.bytes_freed as i64,
                record.error_count,
                record.status.as_str(),
                i32::from(record.dry_run),
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Last `limit` runs, newest first.
    pub fn recent_runs(&self, limit: u32) -> Result<Vec<RunHistoryEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT run_id, role, started_at, duration_ms, jobs_processed,
                    files_affected, bytes_freed, error_count, status, dry_run
             FROM run_history ORDER BY run_id DESC LIMIT ?1",
        )?;
        let raw = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, u32>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, i32>(9)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |(
                    run_id,
                    role,
                    started_at,
                    duration_ms,
                    jobs_processed,
                    files_affected,
                    bytes_freed,
                    error_count,
                    status,
                    dry_run,
                )| {
                    Ok(RunHistoryEntry {
                        run_id,
                        role: parse_role(&role)?,
                        started_at: parse_rfc3339(&started_at)?,
                        duration_ms: duration_ms as u64,
                        jobs_processed,
                        files_affected: files_affected as u64,
                        bytes_freed: bytes_freed as u64,
                        error_count,
                        status: parse_status(&status)?,
                        dry_run: dry_run != 0,
                    })
                },
            )
            .collect()
    }

    /// Total bytes freed by real (non-dry-run) cleaner runs since `since`.
    pub fn bytes_freed_since(&self, since: &DateTime<Utc>) -> Result<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(bytes_freed), 0) FROM run_history
             WHERE role = 'cleaner' AND dry_run = 0 AND started_at >= ?1",
            params![to_rfc3339(since)],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    // ──────────────────── reporting ────────────────────

    /// Per-job aggregates over the current index, for external reporting.
    pub fn job_index_stats(&self) -> Result<Vec<JobIndexStats>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT job_id, COUNT(*), COALESCE(SUM(size_bytes), 0), MAX(last_seen_at)
             FROM file_index GROUP BY job_id ORDER BY job_id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(job_id, file_count, total_bytes, last_seen_at)| {
                Ok(JobIndexStats {
                    job_id: JobId::new(job_id),
                    file_count: file_count as u64,
                    total_bytes: total_bytes as u64,
                    last_seen_at: last_seen_at.as_deref().map(parse_rfc3339).transpose()?,
                })
            })
            .collect()
    }
}

// ──────────────────── capability impls ────────────────────

impl IndexWriter for IndexStore {
    fn replace_job_files(&mut self, job_id: &JobId, files: &[IndexedFile]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.prepare_cached("DELETE FROM file_index WHERE job_id = ?1")?
            .execute(params![job_id.as_str()])?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO file_index (job_id, path, size_bytes, modified_unix_ms, last_seen_at)
                 VALUES (?1,?2,?3,?4,?5)",
            )?;
            for file in files {
                insert.execute(params![
                    job_id.as_str(),
                    file.absolute_path.to_string_lossy(),
                    file.size_bytes as i64,
                    modified_to_unix_ms(file),
                    to_rfc3339(&file.last_seen_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl IndexReader for IndexStore {
    fn list_job_files(&self, job_id: &JobId) -> Result<Vec<IndexedFile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, size_bytes, modified_unix_ms, last_seen_at
             FROM file_index WHERE job_id = ?1 ORDER BY path ASC",
        )?;
        let raw = stmt
            .query_map(params![job_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(path, size_bytes, modified_unix_ms, last_seen_at)| {
                Ok(IndexedFile {
                    job_id: job_id.clone(),
                    absolute_path: PathBuf::from(path),
                    size_bytes: size_bytes as u64,
                    modified: unix_ms_to_system_time(modified_unix_ms)?,
                    last_seen_at: parse_rfc3339(&last_seen_at)?,
                })
            })
            .collect()
    }

    fn remove_file(&self, job_id: &JobId, absolute_path: &Path) -> Result<()> {
        // Idempotent: removing an already-absent row is not an error.
        self.conn
            .prepare_cached("DELETE FROM file_index WHERE job_id = ?1 AND path = ?2")?
            .execute(params![job_id.as_str(), absolute_path.to_string_lossy()])?;
        Ok(())
    }

    fn job_total_bytes(&self, job_id: &JobId) -> Result<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM file_index WHERE job_id = ?1",
            params![job_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }
}

// ──────────────────── conversions ────────────────────

fn to_rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| RswError::Serialization {
            context: "run timestamp",
            details: format!("'{value}': {err}"),
        })
}

fn parse_role(value: &str) -> Result<Role> {
    Role::parse(value).ok_or_else(|| RswError::Serialization {
        context: "run role",
        details: format!("unknown role '{value}'"),
    })
}

fn parse_status(value: &str) -> Result<RunStatus> {
    RunStatus::parse(value).ok_or_else(|| RswError::Serialization {
        context: "run status",
        details: format!("unknown status '{value}'"),
    })
}

fn modified_to_unix_ms(file: &IndexedFile) -> i64 {
    DateTime::<Utc>::from(file.modified).timestamp_millis()
}

fn unix_ms_to_system_time(ms: i64) -> Result<std::time::SystemTime> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(Into::into)
        .ok_or_else(|| RswError::Serialization {
            context: "file mtime",
            details: format!("out-of-range unix millis {ms}"),
        })
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[RSW-STORE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS file_index (
            job_id TEXT NOT NULL,
            path TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            modified_unix_ms INTEGER NOT NULL,
            last_seen_at TEXT NOT NULL,
            PRIMARY KEY (job_id, path)
        );

        CREATE TABLE IF NOT EXISTS run_history (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            role TEXT NOT NULL,
            started_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            jobs_processed INTEGER NOT NULL,
            files_affected INTEGER NOT NULL,
            bytes_freed INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            dry_run INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_file_index_job_mtime
            ON file_index(job_id, modified_unix_ms);
        CREATE INDEX IF NOT EXISTS idx_run_history_started ON run_history(started_at);
        CREATE INDEX IF NOT EXISTS idx_run_history_role_started
            ON run_history(role, started_at);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────
