use super::{CancelToken, LocalTasks, SyncCoordinator, SyncReport};
use crate::clock::Clock;
use crate::error::AppError;
use crate::remote::RemoteTasks;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60 * 60);

/// Exponential backoff between failed attempts of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after the `failures`-th failed attempt.
    pub fn backoff_after(&self, failures: u32) -> Duration {
        let factor = 2_u32.saturating_pow(failures.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced { report: SyncReport, attempts: u32 },
    Failed { error: AppError, attempts: u32 },
}

impl SyncOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Synced { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Runs sync cycles with retries; errors never leave this boundary.
#[derive(Debug)]
pub struct SyncWorker<L, R, C> {
    coordinator: SyncCoordinator<L, R, C>,
    policy: RetryPolicy,
}

impl<L: LocalTasks, R: RemoteTasks, C: Clock> SyncWorker<L, R, C> {
    pub fn new(coordinator: SyncCoordinator<L, R, C>, policy: RetryPolicy) -> Self {
        Self {
            coordinator,
            policy,
        }
    }

    pub fn coordinator(&self) -> &SyncCoordinator<L, R, C> {
        &self.coordinator
    }

    pub fn run(&self, cancel: &CancelToken) -> SyncOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let error = match self.coordinator.run_cycle(cancel) {
                Ok(report) => {
                    log::info!(
                        "sync done: pushed {}, fetched {}, inserted {}, overwritten {}, kept {}",
                        report.pushed,
                        report.fetched,
                        report.inserted,
                        report.overwritten,
                        report.kept_local
                    );
                    return SyncOutcome::Synced { report, attempts };
                }
                Err(error) => error,
            };

            if matches!(error, AppError::Cancelled(_)) {
                log::info!("sync stopped: {error}");
                return SyncOutcome::Failed { error, attempts };
            }
            if !error.is_retryable() || attempts >= self.policy.max_attempts {
                log::error!("sync failed after {attempts} attempt(s): {error}");
                return SyncOutcome::Failed { error, attempts };
            }

            let delay = self.policy.backoff_after(attempts);
            log::warn!("sync attempt {attempts} failed: {error}; retrying in {delay:?}");
            if cancel.wait(delay) {
                log::info!("sync stopped during backoff");
                return SyncOutcome::Failed {
                    error: AppError::cancelled("sync cancelled during backoff"),
                    attempts,
                };
            }
        }
    }
}
