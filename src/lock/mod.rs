//! Exclusive run lock: at most one live process per role, surviving crashes.
//!
//! Backed by a non-blocking `flock()` on a per-role lock file. The kernel
//! releases the lock when the owning process exits — cleanly or not — so
//! release never depends on application code running, and a lock file left
//! behind by a crashed process is reclaimed simply by locking it again. The
//! PID written into the file is diagnostic only; liveness is carried by the
//! lock itself, never by the file's presence.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::errors::{Result, RswError};

/// The two independently scheduled batch roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Indexer,
    Cleaner,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Indexer => "indexer",
            Self::Cleaner => "cleaner",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "indexer" => Some(Self::Indexer),
            "cleaner" => Some(Self::Cleaner),
            _ => None,
        }
    }

    const fn lock_file_name(self) -> &'static str {
        match self {
            Self::Indexer => "indexer.lock",
            Self::Cleaner => "cleaner.lock",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Held exclusive lock for one role. Dropping it (or dying) releases it.
pub struct RunLock {
    role: Role,
    path: PathBuf,
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl RunLock {
    /// Try to take the exclusive lock for `role` under `lock_dir`.
    ///
    /// Returns `Ok(None)` when another live process already holds it — the
    /// caller must exit without side effects and without a history entry.
    /// Contention is expected under normal periodic overlap, not an error.
    pub fn try_acquire(lock_dir: &Path, role: Role) -> Result<Option<Self>> {
        fs::create_dir_all(lock_dir).map_err(|e| RswError::io(lock_dir, e))?;
        let path = lock_dir.join(role.lock_file_name());
        let file = open_lock_file(&path)?;

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::fcntl::{Flock, FlockArg};

            #[allow(deprecated)]
            let attempt = Flock::lock(file, FlockArg::LockExclusiveNonblock);
            match attempt {
                Ok(mut locked) => {
                    write_pid(&mut locked, &path);
                    Ok(Some(Self {
                        role,
                        path,
                        _lock: locked,
                    }))
                }
                Err((_file, errno)) => {
                    if errno == Errno::EWOULDBLOCK {
                        Ok(None)
                    } else {
                        Err(RswError::Runtime {
                            details: format!("failed to lock {}: {errno}", path.display()),
                        })
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            // No advisory locking off Unix; the open file still marks intent.
            let mut file = file;
            write_pid(&mut file, &path);
            Ok(Some(Self {
                role,
                path,
                _file: file,
            }))
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Lock file location, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| RswError::io(path, e))
}

fn write_pid(file: &mut File, path: &Path) {
    // Best effort: a failure to record the PID must not fail the run.
    if file.set_len(0).is_err() {
        return;
    }
    if writeln!(file, "{}", std::process::id()).is_err() {
        eprintln!(
            "[RSW-LOCK] WARNING: could not write pid into {}",
            path.display()
        );
    }
    let _ = file.flush();
}
