//! Path normalization and containment checks shared by protection and the
//! cleaner's escape guard.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized form.
///
/// When the path exists, `fs::canonicalize` resolves symlinks and `..`
/// components against the real filesystem. When it does not (e.g. a job root
/// that vanished between config load and scan), the path is made absolute
/// against the current directory and normalized syntactically so protection
/// checks still see a comparable form.
pub fn normalize_absolute(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    strip_dot_components(&absolute)
}

fn strip_dot_components(path: &Path) -> PathBuf {
    let mut kept = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                kept.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = kept.last() {
                    kept.pop();
                }
            }
        }
    }
    kept.into_iter().collect()
}

/// Component-wise containment: is `child` equal to or located under `ancestor`?
///
/// Both arguments must already be normalized; no filesystem access happens
/// here. `/data` contains `/data/logs` but not `/database`.
#[must_use]
pub fn is_within(child: &Path, ancestor: &Path) -> bool {
    child.starts_with(ancestor)
}
