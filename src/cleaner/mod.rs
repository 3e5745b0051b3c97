//! Cleaner role: enforce retention for every job against the current index,
//! tolerating partial failure.
//!
//! The cleaner never scans the filesystem — it acts on the most recently
//! committed index snapshot (which may be one scheduling interval stale) and
//! trusts the filesystem to be shared with external writers: a file that is
//! already gone is a non-event, a file that cannot be deleted stays indexed
//! and becomes a candidate again next run.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_truncation)]

pub mod retention;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};

use crate::core::errors::Result;
use crate::core::job::{Job, JobId};
use crate::core::paths::is_within;
use crate::lock::Role;
use crate::scanner::protection::ProtectedPaths;
use crate::store::{IndexReader, RunRecord, RunStatus};

/// Run-level options for one cleaner invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
    /// Force every job into dry-run, and mark the history row accordingly.
    pub dry_run: bool,
}

/// Per-job outcome.
#[derive(Debug)]
pub struct JobCleanReport {
    pub job_id: JobId,
    pub files_deleted: u64,
    pub bytes_freed: u64,
    pub file_errors: u32,
    /// Whether this job ran without touching disk or index.
    pub dry_run: bool,
    /// Set when the job was aborted before any deletion (veto, store error).
    pub failure: Option<String>,
}

/// Aggregate outcome of one cleaner run.
#[derive(Debug)]
pub struct CleanRunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub jobs_processed: u32,
    pub jobs_failed: u32,
    pub files_deleted: u64,
    pub bytes_freed: u64,
    pub error_count: u32,
    pub status: RunStatus,
    pub dry_run: bool,
    pub job_reports: Vec<JobCleanReport>,
}

impl CleanRunSummary {
    /// History row for this run.
    #[must_use]
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            role: Role::Cleaner,
            started_at: self.started_at,
            duration_ms: self.duration_ms,
            jobs_processed: self.jobs_processed,
            files_affected: self.files_deleted,
            bytes_freed: self.bytes_freed,
            error_count: self.error_count,
            status: self.status,
            dry_run: self.dry_run,
        }
    }
}

/// Enforce retention for every job. Job-level failures abort only that job;
/// per-file failures are tallied and the run continues.
pub fn run_cleaner<S: IndexReader>(
    jobs: &[Job],
    store: &S,
    protected: &ProtectedPaths,
    options: CleanOptions,
) -> CleanRunSummary {
    let started_at = Utc::now();
    let clock = Instant::now();
    let now = SystemTime::now();

    let mut job_reports = Vec::with_capacity(jobs.len());
    for job in jobs {
        job_reports.push(clean_one_job(job, store, protected, options, now));
    }

    let jobs_failed = job_reports.iter().filter(|r| r.failure.is_some()).count() as u32;
    let jobs_processed = jobs.len() as u32 - jobs_failed;
    let file_errors: u32 = job_reports.iter().map(|r| r.file_errors).sum();
    let error_count = file_errors + jobs_failed;

    // Real aggregates only: a dry job report is display material, not work
    // done — unless the whole run is dry, in which case the row says so.
    let files_deleted = job_reports
        .iter()
        .filter(|r| options.dry_run || !r.dry_run)
        .map(|r| r.files_deleted)
        .sum();
    let bytes_freed = job_reports
        .iter()
        .filter(|r| options.dry_run || !r.dry_run)
        .map(|r| r.bytes_freed)
        .sum();

    let status = if !jobs.is_empty() && jobs_processed == 0 {
        RunStatus::Failed
    } else if error_count > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Success
    };

    CleanRunSummary {
        started_at,
        duration_ms: clock.elapsed().as_millis() as u64,
        jobs_processed,
        jobs_failed,
        files_deleted,
        bytes_freed,
        error_count,
        status,
        dry_run: options.dry_run,
        job_reports,
    }
}

fn clean_one_job<S: IndexReader>(
    job: &Job,
    store: &S,
    protected: &ProtectedPaths,
    options: CleanOptions,
    now: SystemTime,
) -> JobCleanReport {
    let dry_run = options.dry_run || job.dry_run;
    let mut report = JobCleanReport {
        job_id: job.id.clone(),
        files_deleted: 0,
        bytes_freed: 0,
        file_errors: 0,
        dry_run,
        failure: None,
    };

    // Defense in depth: evaluated on every run, never cached, even though
    // the indexer already refused to index a vetoed job.
    if let Err(err) = protected.check_job_root(&job.path) {
        report.failure = Some(err.to_string());
        return report;
    }

    let files = match store.list_job_files(&job.id) {
        Ok(files) => files,
        Err(err) => {
            report.failure = Some(err.to_string());
            return report;
        }
    };

    for candidate in retention::select_deletions(&job.rule, &files, now) {
        // The index is not trusted blindly: a row pointing outside the job
        // root is never deleted through this job.
        if !is_within(&candidate.absolute_path, &job.path) {
            report.file_errors += 1;
            continue;
        }

        if dry_run {
            report.files_deleted += 1;
            report.bytes_freed += candidate.size_bytes;
            continue;
        }

        match delete_file(&candidate.absolute_path) {
            DeleteOutcome::Deleted | DeleteOutcome::AlreadyGone => {
                // Already-gone counts as success: someone else freed it and
                // the row must go either way so this run never retries it.
                report.files_deleted += 1;
                report.bytes_freed += candidate.size_bytes;
                if let Err(err) = store.remove_file(&job.id, &candidate.absolute_path) {
                    eprintln!(
                        "[RSW-CLEANER] WARNING: index row for {} not removed: {err}",
                        candidate.absolute_path.display()
                    );
                    report.file_errors += 1;
                }
            }
            DeleteOutcome::Failed => {
                // Row stays in the index so the file remains a candidate.
                report.file_errors += 1;
            }
        }
    }

    report
}

enum DeleteOutcome {
    Deleted,
    AlreadyGone,
    Failed,
}

fn delete_file(path: &Path) -> DeleteOutcome {
    match fs::remove_file(path) {
        Ok(()) => DeleteOutcome::Deleted,
        Err(err) if err.kind() == ErrorKind::NotFound => DeleteOutcome::AlreadyGone,
        Err(_) => DeleteOutcome::Failed,
    }
}

/// Convenience for callers that already hold the lock: run and append the
/// history row in one step. Returns the summary; the append error (store
/// broken) surfaces as `Err` with no row written, per the error taxonomy.
pub fn run_and_record(
    jobs: &[Job],
    store: &crate::store::IndexStore,
    protected: &ProtectedPaths,
    options: CleanOptions,
) -> Result<CleanRunSummary> {
    let summary = run_cleaner(jobs, store, protected, options);
    store.append_run(&summary.to_record())?;
    Ok(summary)
}
