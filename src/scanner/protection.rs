//! Protected-path deny list: the safety boundary between configuration and
//! the filesystem.
//!
//! A job root is refused when it equals a deny-list entry, lies inside one,
//! or *contains* one (cleaning `/` would eventually reach `/etc`). The check
//! runs in both roles on every run — a job accepted by an earlier
//! misconfiguration is still refused here.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::errors::{Result, RswError};
use crate::core::paths::{is_within, normalize_absolute};
use crate::scanner::filter::glob_to_regex;

/// Prefixes that are always denied, independent of configuration.
const BUILTIN_DENIED: &[&str] = &[
    "/", "/boot", "/etc", "/usr", "/bin", "/sbin", "/proc", "/sys", "/dev",
];

/// Compiled deny-list: built-in system prefixes, configured extra prefixes,
/// and configured glob patterns.
#[derive(Debug)]
pub struct ProtectedPaths {
    entries: Vec<PathBuf>,
    patterns: Vec<(String, Regex)>,
}

impl ProtectedPaths {
    /// Build the registry from configured extra prefixes and glob patterns.
    /// Built-in system prefixes are always present.
    pub fn new(extra_entries: &[PathBuf], patterns: &[String]) -> Result<Self> {
        let mut entries: Vec<PathBuf> =
            BUILTIN_DENIED.iter().copied().map(PathBuf::from).collect();
        for entry in extra_entries {
            let normalized = normalize_absolute(entry);
            if !entries.contains(&normalized) {
                entries.push(normalized);
            }
        }

        let patterns = patterns
            .iter()
            .map(|pat| Ok((pat.clone(), glob_to_regex(pat)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries, patterns })
    }

    /// Registry with only the built-in deny list.
    pub fn builtin_only() -> Self {
        Self {
            entries: BUILTIN_DENIED.iter().copied().map(PathBuf::from).collect(),
            patterns: Vec::new(),
        }
    }

    /// Whether `path` would be refused as a job root.
    #[must_use]
    pub fn is_denied(&self, path: &Path) -> bool {
        self.refusal_reason(&normalize_absolute(path)).is_some()
    }

    /// Refuse `path` as a job root, or pass it through.
    ///
    /// The error carries the matched entry so the operator can see *why* the
    /// job was vetoed.
    pub fn check_job_root(&self, path: &Path) -> Result<()> {
        let normalized = normalize_absolute(path);
        match self.refusal_reason(&normalized) {
            Some(reason) => Err(RswError::SafetyVeto {
                path: normalized,
                reason,
            }),
            None => Ok(()),
        }
    }

    fn refusal_reason(&self, normalized: &Path) -> Option<String> {
        let root = Path::new("/");
        for entry in &self.entries {
            // "/" guards only itself: every absolute path is inside it, so
            // the containment rules below would otherwise refuse everything.
            if entry == root {
                if normalized == root {
                    return Some("is the filesystem root".to_string());
                }
                continue;
            }
            if normalized == entry {
                return Some(format!("is the protected path {}", entry.display()));
            }
            if is_within(normalized, entry) {
                return Some(format!("is inside protected path {}", entry.display()));
            }
            if is_within(entry, normalized) {
                return Some(format!("contains protected path {}", entry.display()));
            }
        }

        let candidate = normalized.to_string_lossy().replace('\\', "/");
        for (original, compiled) in &self.patterns {
            if compiled.is_match(&candidate) {
                return Some(format!("matches protected pattern '{original}'"));
            }
        }

        None
    }

    /// Number of deny-list entries (built-in + configured), for listings.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
