//! Create-exclusive lock marker guarding the store file.

use log::{debug, warn};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::StoreError;

/// Held lock; the marker file is removed on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Tries to create `path` exclusively, sleeping `interval` between
    /// `attempts` tries.
    pub fn acquire(path: &Path, interval: Duration, attempts: u32) -> Result<Self, StoreError> {
        for attempt in 1..=attempts {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    if attempt > 1 {
                        debug!("Locked {} on attempt {}", path.display(), attempt);
                    }
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if attempt < attempts {
                        thread::sleep(interval);
                    }
                }
                Err(e) => {
                    return Err(StoreError::Open {
                        path: path.display().to_string(),
                        source: e,
                    });
                }
            }
        }

        warn!(
            "Gave up locking {} after {} attempts (stale lock file?)",
            path.display(),
            attempts
        );
        Err(StoreError::Lock {
            path: path.display().to_string(),
            attempts,
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}
