//! Job model: one watched directory paired with its retention rule.
//!
//! A `Job` is pure data, rebuilt from configuration on every run. The rule
//! set is a closed enum — configuration can only ever produce one of the two
//! known variants, and evaluation dispatches over them in one place
//! (`cleaner::retention`).

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, RswError};
use crate::scanner::filter::validate_pattern;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Stable job identifier, derived from the job file stem (`jobs.d/app-logs.toml`
/// → `app-logs`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Retention policy for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionRule {
    /// Delete any file whose last-modified time is older than `now - max_age`.
    MaxAge { max_age: Duration },
    /// Keep the job's total indexed size at or below the quota, evicting
    /// oldest-first until compliant.
    SizeQuota { max_total_bytes: u64 },
}

impl RetentionRule {
    /// Short human-readable form for listings and history output.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::MaxAge { max_age } => {
                format!("max_age {:.1}d", max_age.as_secs_f64() / SECONDS_PER_DAY)
            }
            Self::SizeQuota { max_total_bytes } => {
                format!("size_quota {max_total_bytes}B")
            }
        }
    }
}

/// One validated watch entry: directory root + retention rule + scan filters.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Absolute directory root to scan and clean.
    pub path: PathBuf,
    pub rule: RetentionRule,
    /// Glob patterns (relative to `path`); empty means "everything".
    pub include: Vec<String>,
    /// Glob patterns (relative to `path`); matching files are never touched.
    pub exclude: Vec<String>,
    /// Whether subdirectories are scanned at all.
    pub recurse: bool,
    /// Recursion bound when `recurse` is set.
    pub max_depth: usize,
    /// Delete directories nested deeper than `max_depth` during indexing.
    pub prune_over_depth: bool,
    /// Report deletions without performing them (and without index updates).
    pub dry_run: bool,
}

impl Job {
    /// Build a validated `Job` from its on-disk form.
    ///
    /// Validation here covers the job file in isolation; the protected-path
    /// check happens later, against live configuration, on every run.
    pub fn from_config(id: JobId, cfg: JobConfig) -> Result<Self> {
        if !cfg.path.is_absolute() {
            return Err(RswError::InvalidJob {
                job_id: id.to_string(),
                details: format!("path must be absolute, got '{}'", cfg.path.display()),
            });
        }

        let rule = match cfg.rule {
            RuleConfig::MaxAge { max_age_days } => {
                if !max_age_days.is_finite() || max_age_days <= 0.0 {
                    return Err(RswError::InvalidJob {
                        job_id: id.to_string(),
                        details: format!("max_age_days must be positive, got {max_age_days}"),
                    });
                }
                RetentionRule::MaxAge {
                    max_age: Duration::from_secs_f64(max_age_days * SECONDS_PER_DAY),
                }
            }
            RuleConfig::SizeQuota { max_total_bytes } => RetentionRule::SizeQuota {
                max_total_bytes,
            },
        };

        for pattern in cfg.include.iter().chain(cfg.exclude.iter()) {
            validate_pattern(pattern)?;
        }

        Ok(Self {
            id,
            path: cfg.path,
            rule,
            include: cfg.include,
            exclude: cfg.exclude,
            recurse: cfg.recurse,
            max_depth: cfg.max_depth,
            prune_over_depth: cfg.prune_over_depth,
            dry_run: cfg.dry_run,
        })
    }
}

/// On-disk job definition (one TOML file under the jobs directory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub path: PathBuf,
    pub rule: RuleConfig,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_recurse")]
    pub recurse: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub prune_over_depth: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// On-disk rule form, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    MaxAge { max_age_days: f64 },
    SizeQuota { max_total_bytes: u64 },
}

const fn default_recurse() -> bool {
    true
}

const fn default_max_depth() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age_config(path: &str, days: f64) -> JobConfig {
        JobConfig {
            path: PathBuf::from(path),
            rule: RuleConfig::MaxAge { max_age_days: days },
            include: Vec::new(),
            exclude: Vec::new(),
            recurse: true,
            max_depth: default_max_depth(),
            prune_over_depth: false,
            dry_run: false,
        }
    }

    #[test]
    fn parses_age_rule_from_toml() {
        let cfg: JobConfig = toml::from_str(
            r#"
            path = "/data/logs"
            rule = { kind = "max_age", max_age_days = 7.0 }
            include = ["**/*.log"]
            "#,
        )
        .unwrap();
        let job = Job::from_config(JobId::new("logs"), cfg).unwrap();
        assert_eq!(
            job.rule,
            RetentionRule::MaxAge {
                max_age: Duration::from_secs(7 * 86_400)
            }
        );
        assert!(job.recurse, "recurse defaults on");
        assert!(!job.dry_run);
    }

    #[test]
    fn parses_size_quota_rule_from_toml() {
        let cfg: JobConfig = toml::from_str(
            r#"
            path = "/data/cache"
            recurse = false
            rule = { kind = "size_quota", max_total_bytes = 100 }
            "#,
        )
        .unwrap();
        let job = Job::from_config(JobId::new("cache"), cfg).unwrap();
        assert_eq!(
            job.rule,
            RetentionRule::SizeQuota {
                max_total_bytes: 100
            }
        );
        assert!(!job.recurse);
    }

    #[test]
    fn rejects_relative_path() {
        let err = Job::from_config(JobId::new("rel"), age_config("data/logs", 7.0)).unwrap_err();
        assert_eq!(err.code(), "RSW-1101");
    }

    #[test]
    fn rejects_non_positive_age() {
        for days in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = Job::from_config(JobId::new("bad"), age_config("/data", days)).unwrap_err();
            assert_eq!(err.code(), "RSW-1101");
        }
    }

    #[test]
    fn zero_byte_quota_is_legal() {
        // A zero quota means "keep this directory empty" — valid configuration.
        let cfg = JobConfig {
            rule: RuleConfig::SizeQuota { max_total_bytes: 0 },
            ..age_config("/data/scratch", 1.0)
        };
        let job = Job::from_config(JobId::new("scratch"), cfg).unwrap();
        assert_eq!(
            job.rule,
            RetentionRule::SizeQuota { max_total_bytes: 0 }
        );
    }

    #[test]
    fn rejects_empty_glob_pattern() {
        let cfg = JobConfig {
            include: vec![String::new()],
            ..age_config("/data", 7.0)
        };
        let err = Job::from_config(JobId::new("glob"), cfg).unwrap_err();
        assert_eq!(err.code(), "RSW-1102");
    }

    #[test]
    fn rule_summaries_are_compact() {
        assert_eq!(
            RetentionRule::MaxAge {
                max_age: Duration::from_secs(86_400)
            }
            .summary(),
            "max_age 1.0d"
        );
        assert_eq!(
            RetentionRule::SizeQuota {
                max_total_bytes: 512
            }
            .summary(),
            "size_quota 512B"
        );
    }
}
