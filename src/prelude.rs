//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use retention_sweeper::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, RswError};
pub use crate::core::job::{Job, JobId, RetentionRule};

// Lock
pub use crate::lock::{Role, RunLock};

// Store
pub use crate::store::{
    IndexReader, IndexStore, IndexWriter, IndexedFile, RunHistoryEntry, RunStatus,
};

// Roles
pub use crate::cleaner::{CleanOptions, CleanRunSummary, run_cleaner};
pub use crate::indexer::{IndexOptions, IndexRunSummary, run_indexer};

// Scanner
pub use crate::scanner::protection::ProtectedPaths;
pub use crate::scanner::walker::scan_job;
