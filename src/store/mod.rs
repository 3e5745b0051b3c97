//! File index store and run history: the only coupling point between the
//! indexer and cleaner roles.
//!
//! The storage engine sits behind two narrow capability traits — the writer
//! can only swap whole per-job snapshots, the reader can only list, remove,
//! and total — so the concurrency contract (atomic per-job replacement,
//! non-blocking readers) lives at this seam and the engine underneath is
//! swappable.

#![allow(missing_docs)]

pub mod sqlite;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::core::errors::Result;
use crate::core::job::JobId;
use crate::lock::Role;

pub use sqlite::IndexStore;

/// One cataloged file, owned exclusively by the index store.
///
/// Rewritten wholesale by each indexer run; read-only to the cleaner except
/// for row removal immediately after a successful deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub job_id: JobId,
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
    /// Timestamp of the indexer run that observed this file.
    pub last_seen_at: DateTime<Utc>,
}

/// Aggregate outcome of one run attempt that acquired its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Zero errors.
    Success,
    /// Some per-file or per-job errors; other work completed.
    Partial,
    /// No job could be processed at all.
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Process exit code reflecting the run outcome.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Partial => 2,
            Self::Failed => 1,
        }
    }
}

/// Insert form of a history row (the store assigns `run_id`).
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub role: Role,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub jobs_processed: u32,
    /// Files scanned (indexer) or deleted (cleaner).
    pub files_affected: u64,
    /// Cleaner only; zero for indexer runs.
    pub bytes_freed: u64,
    pub error_count: u32,
    pub status: RunStatus,
    pub dry_run: bool,
}

/// One persisted, append-only history row.
#[derive(Debug, Clone)]
pub struct RunHistoryEntry {
    pub run_id: i64,
    pub role: Role,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub jobs_processed: u32,
    pub files_affected: u64,
    pub bytes_freed: u64,
    pub error_count: u32,
    pub status: RunStatus,
    pub dry_run: bool,
}

/// Per-job index aggregate for external reporting.
#[derive(Debug, Clone)]
pub struct JobIndexStats {
    pub job_id: JobId,
    pub file_count: u64,
    pub total_bytes: u64,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Writer capability: the indexer's whole interface to the store.
pub trait IndexWriter {
    /// Atomically replace every row for `job_id` with the new snapshot.
    ///
    /// A concurrent reader observes either the full old set or the full new
    /// set for this job, never a mix. Cross-job atomicity is not promised.
    fn replace_job_files(&mut self, job_id: &JobId, files: &[IndexedFile]) -> Result<()>;
}

/// Reader capability: the cleaner's whole interface to the store.
pub trait IndexReader {
    /// All indexed rows for `job_id`. Never blocks on, nor is blocked by,
    /// a concurrent snapshot replacement.
    fn list_job_files(&self, job_id: &JobId) -> Result<Vec<IndexedFile>>;

    /// Drop one row right after its file was deleted (or found already
    /// gone), so the same entry is never acted on twice within a run.
    fn remove_file(&self, job_id: &JobId, absolute_path: &Path) -> Result<()>;

    /// Sum of `size_bytes` over the job's current snapshot.
    fn job_total_bytes(&self, job_id: &JobId) -> Result<u64>;
}
