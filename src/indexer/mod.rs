//! Indexer role: produce a fresh, correct snapshot of matching files for
//! every job.
//!
//! Jobs fan out over a small worker pool; every store write happens on the
//! coordinating thread so the index keeps exactly one writer no matter how
//! wide the scan runs. A job whose scan fails never replaces its stored
//! snapshot — a transient traversal failure must not wipe the index the
//! cleaner depends on.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use crossbeam_channel as channel;

use crate::core::errors::Result;
use crate::core::job::{Job, JobId};
use crate::lock::Role;
use crate::scanner::protection::ProtectedPaths;
use crate::scanner::walker::{ScanOutcome, scan_job};
use crate::store::{IndexWriter, IndexedFile, RunRecord, RunStatus};

/// Run-level options for one indexer invocation.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Worker threads scanning jobs concurrently.
    pub parallelism: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

/// Per-job outcome.
#[derive(Debug)]
pub struct JobIndexReport {
    pub job_id: JobId,
    pub files_indexed: u64,
    pub file_errors: u32,
    pub dirs_pruned: u32,
    /// Set when the job's snapshot was not committed (veto, scan failure,
    /// store failure). The prior snapshot stays authoritative.
    pub failure: Option<String>,
}

/// Aggregate outcome of one indexer run.
#[derive(Debug)]
pub struct IndexRunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub jobs_processed: u32,
    pub jobs_failed: u32,
    pub files_indexed: u64,
    pub error_count: u32,
    pub status: RunStatus,
    pub job_reports: Vec<JobIndexReport>,
}

impl IndexRunSummary {
    /// History row for this run.
    #[must_use]
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            role: Role::Indexer,
            started_at: self.started_at,
            duration_ms: self.duration_ms,
            jobs_processed: self.jobs_processed,
            files_affected: self.files_indexed,
            bytes_freed: 0,
            error_count: self.error_count,
            status: self.status,
            dry_run: false,
        }
    }
}

/// Scan every job and replace its stored snapshot.
///
/// The protection registry is consumed and shared read-only across the
/// worker pool; each worker re-checks its job's root right before scanning.
pub fn run_indexer<S: IndexWriter>(
    jobs: &[Job],
    store: &mut S,
    protected: ProtectedPaths,
    options: IndexOptions,
) -> IndexRunSummary {
    let started_at = Utc::now();
    let clock = Instant::now();

    let mut outcomes = scan_all_jobs(jobs, protected, options);

    // Commit snapshots in input order, on this thread only. The first
    // store-level failure is fatal to the run: nothing further is committed
    // and the prior index stays authoritative.
    let mut job_reports = Vec::with_capacity(jobs.len());
    let mut store_failed = false;
    for job in jobs {
        let Some(outcome) = outcomes.remove(&job.id) else {
            continue;
        };
        let report = match outcome {
            Err(err) => JobIndexReport {
                job_id: job.id.clone(),
                files_indexed: 0,
                file_errors: 0,
                dirs_pruned: 0,
                failure: Some(err.to_string()),
            },
            Ok(scan) if store_failed => JobIndexReport {
                job_id: job.id.clone(),
                files_indexed: 0,
                file_errors: scan.file_errors,
                dirs_pruned: scan.dirs_pruned,
                failure: Some("skipped: index store unavailable".to_string()),
            },
            Ok(scan) => match commit_snapshot(store, job, &scan, &started_at) {
                Ok(()) => JobIndexReport {
                    job_id: job.id.clone(),
                    files_indexed: scan.files.len() as u64,
                    file_errors: scan.file_errors,
                    dirs_pruned: scan.dirs_pruned,
                    failure: None,
                },
                Err(err) => {
                    store_failed = true;
                    JobIndexReport {
                        job_id: job.id.clone(),
                        files_indexed: 0,
                        file_errors: scan.file_errors,
                        dirs_pruned: scan.dirs_pruned,
                        failure: Some(err.to_string()),
                    }
                }
            },
        };
        job_reports.push(report);
    }

    let jobs_failed = job_reports.iter().filter(|r| r.failure.is_some()).count() as u32;
    let jobs_processed = job_reports.len() as u32 - jobs_failed;
    let file_errors: u32 = job_reports.iter().map(|r| r.file_errors).sum();
    let error_count = file_errors + jobs_failed;
    let files_indexed = job_reports.iter().map(|r| r.files_indexed).sum();

    let status = if store_failed || (!jobs.is_empty() && jobs_processed == 0) {
        RunStatus::Failed
    } else if error_count > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Success
    };

    IndexRunSummary {
        started_at,
        duration_ms: clock.elapsed().as_millis() as u64,
        jobs_processed,
        jobs_failed,
        files_indexed,
        error_count,
        status,
        job_reports,
    }
}

/// Fan jobs out over the worker pool; collect every scan result.
fn scan_all_jobs(
    jobs: &[Job],
    protected: ProtectedPaths,
    options: IndexOptions,
) -> HashMap<JobId, Result<ScanOutcome>> {
    let protection = Arc::new(parking_lot::RwLock::new(protected));
    let workers = options.parallelism.max(1).min(jobs.len().max(1));

    let (job_tx, job_rx) = channel::unbounded::<Job>();
    let (result_tx, result_rx) = channel::unbounded::<(JobId, Result<ScanOutcome>)>();

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let protection = Arc::clone(&protection);
        handles.push(thread::spawn(move || {
            for job in job_rx.iter() {
                // Defensive re-validation inside the run, per job, never
                // cached across runs.
                let outcome = protection
                    .read()
                    .check_job_root(&job.path)
                    .and_then(|()| scan_job(&job));
                let _ = result_tx.send((job.id, outcome));
            }
        }));
    }
    drop(job_rx);
    drop(result_tx);

    for job in jobs {
        let _ = job_tx.send(job.clone());
    }
    drop(job_tx);

    let mut outcomes = HashMap::with_capacity(jobs.len());
    for (job_id, outcome) in result_rx.iter() {
        outcomes.insert(job_id, outcome);
    }
    for handle in handles {
        let _ = handle.join();
    }
    outcomes
}

fn commit_snapshot<S: IndexWriter>(
    store: &mut S,
    job: &Job,
    scan: &ScanOutcome,
    last_seen_at: &DateTime<Utc>,
) -> Result<()> {
    let rows: Vec<IndexedFile> = scan
        .files
        .iter()
        .map(|record| IndexedFile {
            job_id: job.id.clone(),
            absolute_path: record.absolute_path.clone(),
            size_bytes: record.size_bytes,
            modified: record.modified,
            last_seen_at: *last_seen_at,
        })
        .collect();
    store.replace_job_files(&job.id, &rows)
}

/// Convenience for callers that already hold the lock: run and append the
/// history row in one step.
pub fn run_and_record(
    jobs: &[Job],
    store: &mut crate::store::IndexStore,
    protected: ProtectedPaths,
    options: IndexOptions,
) -> Result<IndexRunSummary> {
    let summary = run_indexer(jobs, store, protected, options);
    store.append_run(&summary.to_record())?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::RetentionRule;
    use crate::store::{IndexReader, IndexStore};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn quota_job(id: &str, root: &Path) -> Job {
        Job {
            id: JobId::new(id),
            path: root.to_path_buf(),
            rule: RetentionRule::SizeQuota {
                max_total_bytes: u64::MAX,
            },
            include: Vec::new(),
            exclude: Vec::new(),
            recurse: true,
            max_depth: 32,
            prune_over_depth: false,
            dry_run: false,
        }
    }

    fn open_store(tmp: &TempDir) -> IndexStore {
        IndexStore::open(&tmp.path().join("index.db")).unwrap()
    }

    #[test]
    fn indexes_matching_files_only() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let root = tmp.path().join("logs");
        fs::create_dir(&root).unwrap();
        for name in ["a.log", "b.log", "c.log"] {
            fs::write(root.join(name), "data").unwrap();
        }
        for name in ["skip.tmp", "skip.bak"] {
            fs::write(root.join(name), "junk").unwrap();
        }

        let mut job = quota_job("logs", &root);
        job.include = vec!["**/*.log".to_string()];

        let summary = run_indexer(
            &[job.clone()],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.files_indexed, 3);
        assert_eq!(store.list_job_files(&job.id).unwrap().len(), 3);
    }

    #[test]
    fn rescan_drops_rows_for_vanished_files() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let root = tmp.path().join("logs");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("keep.log"), "k").unwrap();
        fs::write(root.join("gone.log"), "g").unwrap();

        let job = quota_job("logs", &root);
        run_indexer(
            &[job.clone()],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );
        assert_eq!(store.list_job_files(&job.id).unwrap().len(), 2);

        fs::remove_file(root.join("gone.log")).unwrap();
        run_indexer(
            &[job.clone()],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );

        let rows = store.list_job_files(&job.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].absolute_path, root.join("keep.log"));
    }

    #[test]
    fn vetoed_job_keeps_prior_snapshot_and_fails_run() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let root = tmp.path().join("secrets");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("old.log"), "x").unwrap();

        let job = quota_job("secrets", &root);
        // Index once while allowed.
        run_indexer(
            &[job.clone()],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );
        assert_eq!(store.list_job_files(&job.id).unwrap().len(), 1);

        // Now deny-list the root and change the tree; the snapshot must not move.
        fs::write(root.join("new.log"), "y").unwrap();
        let protected = ProtectedPaths::new(&[root.clone()], &[]).unwrap();
        let summary = run_indexer(
            &[job.clone()],
            &mut store,
            protected,
            IndexOptions::default(),
        );

        assert_eq!(summary.status, RunStatus::Failed, "only job was vetoed");
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(
            store.list_job_files(&job.id).unwrap().len(),
            1,
            "prior snapshot stays authoritative"
        );
    }

    #[test]
    fn failed_scan_keeps_prior_snapshot_without_stopping_others() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let good_root = tmp.path().join("good");
        let bad_root = tmp.path().join("bad");
        fs::create_dir(&good_root).unwrap();
        fs::create_dir(&bad_root).unwrap();
        fs::write(good_root.join("g.log"), "g").unwrap();
        fs::write(bad_root.join("b.log"), "b").unwrap();

        let good = quota_job("good", &good_root);
        let bad = quota_job("bad", &bad_root);
        run_indexer(
            &[good.clone(), bad.clone()],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );
        assert_eq!(store.list_job_files(&bad.id).unwrap().len(), 1);

        // Remove the bad root entirely: its scan now fails.
        fs::remove_dir_all(&bad_root).unwrap();
        fs::write(good_root.join("g2.log"), "gg").unwrap();
        let summary = run_indexer(
            &[good.clone(), bad.clone()],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.jobs_processed, 1);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(store.list_job_files(&good.id).unwrap().len(), 2);
        assert_eq!(
            store.list_job_files(&bad.id).unwrap().len(),
            1,
            "failed job's prior snapshot survives"
        );
    }

    #[test]
    fn parallel_run_commits_every_job() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let mut jobs = Vec::new();
        for i in 0..4 {
            let root = tmp.path().join(format!("job{i}"));
            fs::create_dir(&root).unwrap();
            for f in 0..3 {
                fs::write(root.join(format!("f{f}.log")), "x").unwrap();
            }
            jobs.push(quota_job(&format!("job{i}"), &root));
        }

        let summary = run_indexer(
            &jobs,
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions { parallelism: 4 },
        );

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.jobs_processed, 4);
        assert_eq!(summary.files_indexed, 12);
        for job in &jobs {
            assert_eq!(store.list_job_files(&job.id).unwrap().len(), 3);
        }
    }

    #[test]
    fn rows_carry_the_run_timestamp() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let root = tmp.path().join("logs");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.log"), "a").unwrap();

        let job = quota_job("logs", &root);
        let summary = run_indexer(
            &[job.clone()],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );

        let rows = store.list_job_files(&job.id).unwrap();
        assert_eq!(
            rows[0].last_seen_at.timestamp_millis(),
            summary.started_at.timestamp_millis()
        );
    }

    #[test]
    fn empty_job_list_is_a_clean_success() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let summary = run_indexer(
            &[],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        );
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.jobs_processed, 0);
    }

    #[test]
    fn history_row_appended_by_run_and_record() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(&tmp);
        let root = tmp.path().join("logs");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.log"), "a").unwrap();

        let job = quota_job("logs", &root);
        let summary = run_and_record(
            &[job],
            &mut store,
            ProtectedPaths::builtin_only(),
            IndexOptions::default(),
        )
        .unwrap();

        let runs = store.recent_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].role, Role::Indexer);
        assert_eq!(runs[0].files_affected, summary.files_indexed);
        assert_eq!(runs[0].status, RunStatus::Success);
    }
}
