use crate::error::{Result, SearchError};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "write.lock";

/// Exclusive advisory lock on an index directory; single writer guarantee.
///
/// The lock file itself is never removed, only unlocked, so a concurrent
/// opener can't race with a deletion.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
    path: PathBuf,
}

impl WriterLock {
    pub fn acquire(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SearchError::io(&path, e))?;

        #[cfg(unix)]
        {
            use libc::{flock, LOCK_EX, LOCK_NB};
            use std::os::unix::io::AsRawFd;

            let fd = file.as_raw_fd();
            // SAFETY: fd is a valid open descriptor owned by `file`.
            let rc = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                return Err(match err.raw_os_error() {
                    Some(code) if code == libc::EWOULDBLOCK => {
                        SearchError::LockContention { path: index_dir.to_path_buf() }
                    }
                    _ => SearchError::io(&path, err),
                });
            }
        }

        tracing::debug!(path = %path.display(), "acquired writer lock");
        Ok(WriterLock { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use libc::{flock, LOCK_UN};
            use std::os::unix::io::AsRawFd;

            let fd = self.file.as_raw_fd();
            // SAFETY: fd is still owned by `self.file`.
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn second_lock_is_contended_until_first_drops() {
        let dir = tempfile::tempdir().unwrap();
        let first = WriterLock::acquire(dir.path()).unwrap();
        let err = WriterLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, SearchError::LockContention { .. }));
        drop(first);
        assert!(WriterLock::acquire(dir.path()).is_ok());
    }
}
