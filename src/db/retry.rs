//! Bounded retry for files another process holds open (typically the sheet
//! left open in a spreadsheet viewer).

use std::io;
use std::path::Path;
use std::thread;

use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::{Error, Result};

/// Run `op` until it succeeds, fails with a non-lock error, or the policy runs
/// out of attempts.
pub(crate) fn with_retry<T>(
    policy: &RetryPolicy,
    path: &Path,
    mut op: impl FnMut() -> io::Result<T>,
) -> Result<T> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_lock_error(&err) => {
                if attempt >= attempts {
                    return Err(Error::Locked {
                        path: path.to_path_buf(),
                        attempts: attempt,
                    });
                }
                debug!(path = %path.display(), attempt, error = %err, "file is locked, retrying");
                thread::sleep(policy.delay());
                attempt += 1;
            }
            Err(err) => return Err(Error::storage_io(path, err)),
        }
    }
}

/// Windows reports a file held open elsewhere as `PermissionDenied` or as a
/// raw sharing (32) or lock (33) violation. Elsewhere `PermissionDenied` is a
/// real permission problem and is not retried.
fn is_lock_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    cfg!(windows)
        && (err.kind() == io::ErrorKind::PermissionDenied
            || matches!(err.raw_os_error(), Some(32 | 33)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay_ms: 1,
        }
    }

    #[test]
    fn recovers_once_the_lock_is_released() {
        let mut calls = 0;
        let value = with_retry(&fast(5), Path::new("plavka.csv"), || {
            calls += 1;
            if calls < 3 {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            } else {
                Ok(42)
            }
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_the_configured_attempts() {
        let mut calls = 0;
        let err = with_retry(&fast(3), Path::new("plavka.csv"), || -> io::Result<()> {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::WouldBlock))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Locked { attempts: 3, .. }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let err = with_retry(&fast(5), Path::new("plavka.csv"), || -> io::Result<()> {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::NotFound))
        })
        .unwrap_err();
        assert!(matches!(err, Error::StorageIo { .. }));
        assert_eq!(calls, 1);
    }

    #[cfg(not(windows))]
    #[test]
    fn permission_denied_fails_at_once_off_windows() {
        let mut calls = 0;
        let err = with_retry(&fast(5), Path::new("plavka.csv"), || -> io::Result<()> {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .unwrap_err();
        assert!(matches!(err, Error::StorageIo { .. }));
        assert_eq!(calls, 1);
    }

    #[cfg(windows)]
    #[test]
    fn sharing_violation_is_retried_on_windows() {
        let mut calls = 0;
        let err = with_retry(&fast(2), Path::new("plavka.csv"), || -> io::Result<()> {
            calls += 1;
            Err(io::Error::from_raw_os_error(32))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Locked { attempts: 2, .. }));
        assert_eq!(calls, 2);
    }
}
