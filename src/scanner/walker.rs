//! Per-job directory traversal producing the raw file snapshot.
//!
//! The walk is iterative (explicit queue, no recursion), never follows
//! symlinks, and degrades gracefully: unreadable entries are counted as
//! per-file errors without aborting the job. Only a root that cannot be
//! opened fails the whole scan — a failed scan must leave the previously
//! stored snapshot untouched.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::core::errors::{Result, RswError};
use crate::core::job::Job;
use crate::scanner::filter::FileFilter;

/// Metadata for one regular file observed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// Result of one job scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Matching regular files, in traversal order.
    pub files: Vec<FileRecord>,
    /// Entries that could not be read or stat'd (skipped, not fatal).
    pub file_errors: u32,
    /// Directories deleted because they were nested deeper than `max_depth`.
    pub dirs_pruned: u32,
}

/// Walk one job's directory tree and collect its matching files.
///
/// Returns `Err` only when the root itself is unreadable; every deeper
/// failure is tallied in `file_errors` and the walk continues.
pub fn scan_job(job: &Job) -> Result<ScanOutcome> {
    let filter = FileFilter::new(&job.include, &job.exclude)?;
    let mut outcome = ScanOutcome::default();

    // (directory, depth): the root is depth 0, its child dirs depth 1.
    let mut queue: Vec<(PathBuf, usize)> = vec![(job.path.clone(), 0)];

    while let Some((dir, depth)) = queue.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if depth == 0 => {
                return Err(RswError::io(&dir, err));
            }
            Err(_) => {
                outcome.file_errors += 1;
                continue;
            }
        };

        for entry_result in entries {
            let Ok(entry) = entry_result else {
                outcome.file_errors += 1;
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                outcome.file_errors += 1;
                continue;
            };

            // Symlinks are never followed: the target may live outside the
            // job root, and deleting through one is how sweepers go wrong.
            if file_type.is_symlink() {
                continue;
            }

            let child = entry.path();

            if file_type.is_dir() {
                if !job.recurse {
                    continue;
                }
                if depth + 1 > job.max_depth {
                    if job.prune_over_depth && !job.dry_run {
                        match fs::remove_dir_all(&child) {
                            Ok(()) => outcome.dirs_pruned += 1,
                            Err(_) => outcome.file_errors += 1,
                        }
                    }
                    continue;
                }
                queue.push((child, depth + 1));
                continue;
            }

            if !file_type.is_file() {
                // Sockets, fifos, devices: not our business.
                continue;
            }

            let Ok(relative) = child.strip_prefix(&job.path) else {
                outcome.file_errors += 1;
                continue;
            };
            if !filter.matches(relative) {
                continue;
            }

            // Vanished-between-listing-and-stat lands here too.
            match entry.metadata() {
                Ok(meta) => outcome.files.push(FileRecord {
                    absolute_path: child,
                    size_bytes: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                }),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    // Gone already — external actors own this tree too.
                }
                Err(_) => outcome.file_errors += 1,
            }
        }
    }

    Ok(outcome)
}
