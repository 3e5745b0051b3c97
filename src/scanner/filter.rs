//! Include/exclude glob filters applied to job-relative file paths.
//!
//! Patterns use shell-style globs: `*` matches within a path component, `**`
//! matches across components, `?` matches a single character. Matching always
//! happens against the path *relative to the job root* with `/` separators,
//! so patterns stay portable across job locations.

use std::path::Path;

use regex::Regex;

use crate::core::errors::{Result, RswError};

/// Compiled glob pattern retaining its source text for diagnostics.
#[derive(Debug, Clone)]
struct GlobPattern {
    original: String,
    compiled: Regex,
}

/// Per-job file filter: a file is considered iff it matches the include set
/// (empty include = everything) and matches no exclude pattern.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Vec<GlobPattern>,
    exclude: Vec<GlobPattern>,
}

impl FileFilter {
    /// Compile the include/exclude pattern lists for one job.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Filter that accepts every file.
    #[must_use]
    pub fn accept_all() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Decide whether a file at `relative` (job-root-relative) is considered.
    #[must_use]
    pub fn matches(&self, relative: &Path) -> bool {
        let candidate = normalize_for_matching(relative);

        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|pat| pat.compiled.is_match(&candidate));
        if !included {
            return false;
        }

        !self
            .exclude
            .iter()
            .any(|pat| pat.compiled.is_match(&candidate))
    }

    /// Source patterns, for listings.
    #[must_use]
    pub fn describe(&self) -> (Vec<&str>, Vec<&str>) {
        (
            self.include.iter().map(|p| p.original.as_str()).collect(),
            self.exclude.iter().map(|p| p.original.as_str()).collect(),
        )
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<GlobPattern>> {
    patterns
        .iter()
        .map(|pat| {
            let compiled = glob_to_regex(pat)?;
            Ok(GlobPattern {
                original: pat.clone(),
                compiled,
            })
        })
        .collect()
}

/// Validate that a glob pattern can be compiled, without keeping the result.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    glob_to_regex(pattern).map(|_| ())
}

/// Convert a shell-style glob pattern to an anchored regex.
///
/// Supports:
/// - `**` → matches any path (including separators)
/// - `*`  → matches anything except `/`
/// - `?`  → matches a single character except `/`
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() {
        return Err(RswError::InvalidPattern {
            pattern: pattern.to_string(),
            details: "empty pattern".to_string(),
        });
    }

    let normalized = pattern.replace('\\', "/");
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    regex_str.push('^');

    let chars: Vec<char> = normalized.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                if i + 2 < chars.len() && chars[i + 2] == '/' {
                    regex_str.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex_str.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex_str.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex_str.push_str("[^/]");
                i += 1;
            }
            '.' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '|' | '\\' => {
                regex_str.push('\\');
                regex_str.push(chars[i]);
                i += 1;
            }
            c => {
                regex_str.push(c);
                i += 1;
            }
        }
    }

    regex_str.push('$');

    Regex::new(&regex_str).map_err(|err| RswError::InvalidPattern {
        pattern: pattern.to_string(),
        details: err.to_string(),
    })
}

fn normalize_for_matching(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn filter(include: &[&str], exclude: &[&str]) -> FileFilter {
        let inc: Vec<String> = include.iter().map(|s| (*s).to_string()).collect();
        let exc: Vec<String> = exclude.iter().map(|s| (*s).to_string()).collect();
        FileFilter::new(&inc, &exc).unwrap()
    }

    #[test]
    fn empty_include_matches_everything() {
        let f = FileFilter::accept_all();
        assert!(f.matches(Path::new("a.log")));
        assert!(f.matches(Path::new("deep/nested/file.bin")));
    }

    #[test]
    fn single_star_stays_within_component() {
        let f = filter(&["*.log"], &[]);
        assert!(f.matches(Path::new("app.log")));
        assert!(!f.matches(Path::new("nested/app.log")));
    }

    #[test]
    fn double_star_crosses_components() {
        let f = filter(&["**/*.log"], &[]);
        assert!(f.matches(Path::new("app.log")));
        assert!(f.matches(Path::new("a/b/c/app.log")));
        assert!(!f.matches(Path::new("a/b/c/app.txt")));
    }

    #[test]
    fn exclude_wins_over_include() {
        let f = filter(&["**/*.log"], &["**/archive/**"]);
        assert!(f.matches(Path::new("current/app.log")));
        assert!(!f.matches(Path::new("archive/2025/app.log")));
        assert!(!f.matches(Path::new("old/archive/app.log")));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let f = filter(&["rotated.?"], &[]);
        assert!(f.matches(Path::new("rotated.1")));
        assert!(!f.matches(Path::new("rotated.10")));
        assert!(!f.matches(Path::new("rotated/1")));
    }

    #[test]
    fn literal_dots_are_escaped() {
        let f = filter(&["*.tar.gz"], &[]);
        assert!(f.matches(Path::new("backup.tar.gz")));
        assert!(!f.matches(Path::new("backup_tar_gz")));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("**/*.log").is_ok());
    }
}
