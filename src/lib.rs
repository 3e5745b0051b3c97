#![forbid(unsafe_code)]

//! retention_sweeper (rsw) — unattended disk housekeeping.
//!
//! Two independently scheduled batch roles share one SQLite index:
//! 1. **Indexer** — walks each job's directory tree and rewrites the job's
//!    file snapshot.
//! 2. **Cleaner** — reads the latest snapshot, applies the job's retention
//!    rule (max age or size quota), and deletes what falls outside it.
//!
//! Each role runs under a per-role exclusive lock, tolerates per-file and
//! per-job failures, and appends exactly one aggregate row to the run
//! history — the audit trail external reporting reads.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use retention_sweeper::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use retention_sweeper::core::config::Config;
//! use retention_sweeper::store::IndexStore;
//! ```

pub mod prelude;

pub mod cleaner;
pub mod core;
pub mod indexer;
pub mod lock;
pub mod scanner;
pub mod store;
