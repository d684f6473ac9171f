use crate::error::AppError;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Shared stop flag for a running sync job.
///
/// Clones observe the same flag. Waiting on the token wakes early once it is
/// cancelled, which keeps backoff sleeps from delaying shutdown.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *cancelled = true;
        signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Errors with `Cancelled` once the token has fired.
    pub fn check(&self, stage: &str) -> Result<(), AppError> {
        if self.is_cancelled() {
            return Err(AppError::cancelled(format!("sync cancelled before {stage}")));
        }
        Ok(())
    }

    /// Sleeps up to `timeout`; returns `true` if cancelled meanwhile.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (flag, signal) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = match signal.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *cancelled
    }
}
