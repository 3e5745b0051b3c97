//! Configuration system: TOML file + env var overrides + smart defaults.
//!
//! Two layers: one global `config.toml` (paths, scanner tuning, protection
//! additions) and a directory of per-job TOML files. Jobs are re-read on
//! every run — nothing about a job is cached across process lifetimes.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, RswError};
use crate::core::job::{Job, JobConfig, JobId};
use crate::scanner::filter::validate_pattern;

/// Full sweeper configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub paths: PathsConfig,
    pub scanner: ScannerConfig,
    pub protection: ProtectionConfig,
}

/// Filesystem locations used by rsw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub db_path: PathBuf,
    pub lock_dir: PathBuf,
    pub jobs_dir: PathBuf,
}

/// Indexer scan tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Worker threads scanning jobs concurrently.
    pub parallelism: usize,
    /// Global kill-switch: force every cleaner run into dry-run.
    pub dry_run: bool,
}

/// Additions to the built-in protected-path deny list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtectionConfig {
    pub extra_paths: Vec<PathBuf>,
    pub patterns: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[RSW-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("rsw");
        let data = home_dir.join(".local").join("share").join("rsw");
        Self {
            config_file: cfg.join("config.toml"),
            db_path: data.join("index.sqlite3"),
            lock_dir: data.join("locks"),
            jobs_dir: cfg.join("jobs.d"),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism()
                .map_or(2, |n| n.get().saturating_div(2).max(1)),
            dry_run: false,
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            extra_paths: vec![PathBuf::from("/var/log")],
            patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| RswError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(RswError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("RSW_DB_PATH") {
            self.paths.db_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("RSW_LOCK_DIR") {
            self.paths.lock_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("RSW_JOBS_DIR") {
            self.paths.jobs_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("RSW_PARALLELISM") {
            self.scanner.parallelism = parse_env_usize("RSW_PARALLELISM", &raw)?;
        }
        if let Some(raw) = lookup("RSW_DRY_RUN") {
            self.scanner.dry_run = parse_env_bool("RSW_DRY_RUN", &raw)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scanner.parallelism == 0 {
            return Err(RswError::InvalidConfig {
                details: "scanner.parallelism must be at least 1".to_string(),
            });
        }
        for pattern in &self.protection.patterns {
            validate_pattern(pattern)?;
        }
        Ok(())
    }

    /// Load every job definition under the jobs directory, sorted by file
    /// name for a deterministic processing order.
    ///
    /// Config errors are job-scoped: a malformed or invalid job file is
    /// skipped with a warning and never stops the run.
    pub fn load_jobs(&self) -> Vec<Job> {
        let dir = &self.paths.jobs_dir;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => {
                eprintln!(
                    "[RSW-CONFIG] WARNING: jobs directory '{}' not found, no jobs loaded",
                    dir.display()
                );
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        let mut jobs = Vec::with_capacity(files.len());
        for file in files {
            match load_job_file(&file) {
                Ok(job) => jobs.push(job),
                Err(err) => {
                    eprintln!(
                        "[RSW-CONFIG] WARNING: skipping job file '{}': {err}",
                        file.display()
                    );
                }
            }
        }
        jobs
    }
}

fn load_job_file(path: &Path) -> Result<Job> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RswError::InvalidConfig {
            details: format!("job file '{}' has no usable name", path.display()),
        })?;
    let raw = fs::read_to_string(path).map_err(|source| RswError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: JobConfig = toml::from_str(&raw)?;
    Job::from_config(JobId::new(stem), cfg)
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|_| RswError::InvalidConfig {
        details: format!("{key} must be a non-negative integer, got '{raw}'"),
    })
}

fn parse_env_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RswError::InvalidConfig {
            details: format!("{key} must be a boolean, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::RetentionRule;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl FnMut(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.scanner.parallelism >= 1);
        assert!(!cfg.scanner.dry_run);
        assert!(cfg.paths.db_path.to_string_lossy().contains("rsw"));
        assert!(
            cfg.protection
                .extra_paths
                .contains(&PathBuf::from("/var/log"))
        );
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert_eq!(err.code(), "RSW-1002");
    }

    #[test]
    fn loads_partial_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [scanner]
            parallelism = 3

            [protection]
            extra_paths = ["/srv/keep"]
            "#,
        )
        .unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.scanner.parallelism, 3);
        assert_eq!(cfg.protection.extra_paths, vec![PathBuf::from("/srv/keep")]);
        // Untouched sections keep defaults.
        assert!(cfg.paths.db_path.to_string_lossy().contains("index.sqlite3"));
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let map = HashMap::from([
            ("RSW_DB_PATH", "/custom/db.sqlite3"),
            ("RSW_PARALLELISM", "7"),
            ("RSW_DRY_RUN", "true"),
        ]);
        cfg.apply_env_overrides_from(lookup_from(&map)).unwrap();

        assert_eq!(cfg.paths.db_path, PathBuf::from("/custom/db.sqlite3"));
        assert_eq!(cfg.scanner.parallelism, 7);
        assert!(cfg.scanner.dry_run);
    }

    #[test]
    fn bad_env_value_is_rejected() {
        let mut cfg = Config::default();
        let map = HashMap::from([("RSW_PARALLELISM", "many")]);
        let err = cfg.apply_env_overrides_from(lookup_from(&map)).unwrap_err();
        assert_eq!(err.code(), "RSW-1001");
    }

    #[test]
    fn zero_parallelism_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scanner]\nparallelism = 0\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(err.code(), "RSW-1001");
    }

    #[test]
    fn loads_jobs_sorted_and_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        let jobs_dir = dir.path().join("jobs.d");
        fs::create_dir(&jobs_dir).unwrap();

        fs::write(
            jobs_dir.join("b-cache.toml"),
            r#"
            path = "/data/cache"
            rule = { kind = "size_quota", max_total_bytes = 1024 }
            "#,
        )
        .unwrap();
        fs::write(
            jobs_dir.join("a-logs.toml"),
            r#"
            path = "/data/logs"
            rule = { kind = "max_age", max_age_days = 7.0 }
            "#,
        )
        .unwrap();
        fs::write(jobs_dir.join("broken.toml"), "this is not toml = =").unwrap();
        fs::write(jobs_dir.join("ignored.yaml"), "not: toml").unwrap();

        let mut cfg = Config::default();
        cfg.paths.jobs_dir = jobs_dir;
        let jobs = cfg.load_jobs();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id.as_str(), "a-logs");
        assert_eq!(
            jobs[0].rule,
            RetentionRule::MaxAge {
                max_age: Duration::from_secs(7 * 86_400)
            }
        );
        assert_eq!(jobs[1].id.as_str(), "b-cache");
    }

    #[test]
    fn missing_jobs_dir_yields_no_jobs() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.paths.jobs_dir = dir.path().join("absent");
        assert!(cfg.load_jobs().is_empty());
    }

    #[test]
    fn bool_env_accepts_common_spellings() {
        for (raw, expected) in [("1", true), ("Yes", true), ("off", false), ("FALSE", false)] {
            assert_eq!(parse_env_bool("RSW_DRY_RUN", raw).unwrap(), expected);
        }
        assert!(parse_env_bool("RSW_DRY_RUN", "maybe").is_err());
    }
}
