use std::{
    fs::File,
    path::Path,
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, warn};
use thiserror::Error;

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Exclusive advisory lock, held until dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Timed out waiting for the lock on {path}")]
    Timeout { path: String },
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl FileLock {
    pub fn new(path: &Path) -> Result<Self, LockError> {
        Self::with_timeout(path, LOCK_TIMEOUT)
    }

    pub fn with_timeout(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file = File::create(path)?;
        let start = Instant::now();
        let mut reported = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(outcome) if outcome.acquired() => {
                    return Ok(Self { _file: file });
                }
                Ok(_) => {}
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {}
                Err(error) => return Err(error.into()),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.display().to_string(),
                });
            }
            if !reported {
                warn!("Waiting for another process to release {}", path.display());
                reported = true;
            }
            debug!("Failed to acquire a lock on {}, retrying", path.display());
            std::thread::sleep(Duration::from_millis(200).min(timeout));
        }
    }
}

/// fs4 reports contention as an error, or as `Ok(false)` in newer releases.
trait LockOutcome {
    fn acquired(self) -> bool;
}

impl LockOutcome for () {
    fn acquired(self) -> bool {
        true
    }
}

impl LockOutcome for bool {
    fn acquired(self) -> bool {
        self
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn second_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        let _held = FileLock::new(&path).unwrap();

        let error = FileLock::with_timeout(&path, Duration::from_millis(50))
            .err()
            .unwrap();
        assert!(matches!(error, LockError::Timeout { .. }));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        drop(FileLock::new(&path).unwrap());
        assert!(FileLock::with_timeout(&path, Duration::ZERO).is_ok());
    }
}
