//! Pure retention decision logic. No I/O: the indexed snapshot is the whole
//! universe of candidates, which keeps every rule testable in isolation.

use std::time::SystemTime;

use crate::core::job::RetentionRule;
use crate::store::IndexedFile;

/// Decide which indexed files a rule makes eligible for deletion.
///
/// - `MaxAge`: every file strictly older than `now - max_age`. The boundary
///   is exclusive: a file modified exactly at the cutoff is retained.
/// - `SizeQuota`: the minimal oldest-first set whose removal brings the
///   retained total to `max_total_bytes` or below. Ordering is ascending
///   `(modified, absolute_path)` — the path tie-break makes the selection
///   deterministic for a fixed snapshot.
pub fn select_deletions<'a>(
    rule: &RetentionRule,
    files: &'a [IndexedFile],
    now: SystemTime,
) -> Vec<&'a IndexedFile> {
    match rule {
        RetentionRule::MaxAge { max_age } => {
            let Some(cutoff) = now.checked_sub(*max_age) else {
                // Cutoff precedes representable time: nothing can be older.
                return Vec::new();
            };
            files.iter().filter(|f| f.modified < cutoff).collect()
        }
        RetentionRule::SizeQuota { max_total_bytes } => {
            let quota = u128::from(*max_total_bytes);
            let total: u128 = files.iter().map(|f| u128::from(f.size_bytes)).sum();
            if total <= quota {
                return Vec::new();
            }

            let mut oldest_first: Vec<&IndexedFile> = files.iter().collect();
            oldest_first.sort_by(|a, b| {
                a.modified
                    .cmp(&b.modified)
                    .then_with(|| a.absolute_path.cmp(&b.absolute_path))
            });

            let mut retained = total;
            let mut selected = Vec::new();
            for file in oldest_first {
                if retained <= quota {
                    break;
                }
                retained -= u128::from(file.size_bytes);
                selected.push(file);
            }
            selected
        }
    }
}
