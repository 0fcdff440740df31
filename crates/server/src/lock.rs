//! Single-instance guard. Two orchestrators polling the same channel
//! would double-send every reminder, so a second instance must fail
//! fast at startup instead of running.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// Held for the process lifetime; the lock releases when the descriptor
/// closes, including on abnormal exit.
#[derive(Debug)]
pub struct InstanceLock {
    _file: std::fs::File,
}

impl InstanceLock {
    #[cfg(unix)]
    pub fn acquire(path: &Path) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { _file: file })
    }

    #[cfg(not(unix))]
    pub fn acquire(path: &Path) -> io::Result<Self> {
        // Advisory locking is unix-only; elsewhere the open alone marks
        // the instance.
        let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        Ok(Self { _file: file })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::InstanceLock;

    #[test]
    fn second_acquire_fails_until_the_first_is_dropped() {
        let dir = std::env::temp_dir().join(format!("absentia-lock-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join("instance.lock");

        let first = InstanceLock::acquire(&path).expect("first acquire");
        assert!(InstanceLock::acquire(&path).is_err());

        drop(first);
        let _second = InstanceLock::acquire(&path).expect("acquire after release");
        std::fs::remove_dir_all(&dir).ok();
    }
}
