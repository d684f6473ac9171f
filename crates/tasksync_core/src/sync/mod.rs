//! Offline-first synchronization with the task server.
//!
//! One cycle pushes every local task changed after the watermark, fetches
//! every remote task changed after the same watermark, merges the fetched
//! rows last-write-wins, and only then moves the watermark to "now". Any
//! failure before the checkpoint leaves the watermark where it was, so the
//! next cycle covers the same window again.

pub mod cancel;
pub mod conflict;
#[cfg(test)]
pub(crate) mod testing;
pub mod worker;

use crate::clock::Clock;
use crate::error::AppError;
use crate::model::Task;
use crate::remote::RemoteTasks;
use conflict::MergeDecision;
use serde::Serialize;
use time::OffsetDateTime;

pub use cancel::CancelToken;
pub use worker::{RetryPolicy, SyncOutcome, SyncWorker};

/// Local side of a sync cycle: task rows plus the persisted watermark.
pub trait LocalTasks: Send + Sync {
    /// Last checkpoint, or the epoch when the store has never synced.
    fn watermark(&self) -> Result<OffsetDateTime, AppError>;
    fn set_watermark(&self, value: OffsetDateTime) -> Result<(), AppError>;
    /// Tasks with `updated_at` strictly after `since`.
    fn tasks_updated_after(&self, since: OffsetDateTime) -> Result<Vec<Task>, AppError>;
    fn get_task(&self, id: &str) -> Result<Option<Task>, AppError>;
    fn upsert_task(&self, task: &Task) -> Result<(), AppError>;

    /// Called once the server accepted a push. Stamps must stay untouched.
    fn acknowledge_pushed(&self, ids: &[String]) -> Result<(), AppError> {
        log::debug!("server accepted {} task(s)", ids.len());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pushed: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub overwritten: usize,
    pub kept_local: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub watermark: OffsetDateTime,
}

impl SyncReport {
    fn new(watermark: OffsetDateTime) -> Self {
        Self {
            pushed: 0,
            fetched: 0,
            inserted: 0,
            overwritten: 0,
            kept_local: 0,
            watermark,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pushed == 0 && self.fetched == 0
    }
}

#[derive(Debug)]
pub struct SyncCoordinator<L, R, C> {
    local: L,
    remote: R,
    clock: C,
}

impl<L: LocalTasks, R: RemoteTasks, C: Clock> SyncCoordinator<L, R, C> {
    pub fn new(local: L, remote: R, clock: C) -> Self {
        Self {
            local,
            remote,
            clock,
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs push, fetch, merge and checkpoint once.
    ///
    /// The checkpoint is the clock at completion, so a local write stamped
    /// while the cycle runs is not pushed until that task changes again.
    pub fn run_cycle(&self, cancel: &CancelToken) -> Result<SyncReport, AppError> {
        cancel.check("push")?;
        let watermark = self.local.watermark()?;
        let pending = self.local.tasks_updated_after(watermark)?;
        let mut report = SyncReport::new(watermark);

        if !pending.is_empty() {
            self.remote.push(&pending)?;
            let ids: Vec<String> = pending.iter().map(|task| task.id.clone()).collect();
            self.local.acknowledge_pushed(&ids)?;
            report.pushed = pending.len();
        }

        cancel.check("fetch")?;
        let fetched = self.remote.fetch_since(watermark)?;
        report.fetched = fetched.len();

        cancel.check("merge")?;
        for remote_task in &fetched {
            let local_task = self.local.get_task(&remote_task.id)?;
            let decision = conflict::decide(remote_task, local_task.as_ref());
            log::debug!("merge {}: {:?}", remote_task.id, decision);
            match decision {
                MergeDecision::Insert => {
                    self.local.upsert_task(remote_task)?;
                    report.inserted += 1;
                }
                MergeDecision::Overwrite => {
                    self.local.upsert_task(remote_task)?;
                    report.overwritten += 1;
                }
                MergeDecision::KeepLocal => report.kept_local += 1,
            }
        }

        if report.is_idle() {
            log::debug!("nothing to sync since {watermark}");
            return Ok(report);
        }

        cancel.check("checkpoint")?;
        let checkpoint = self.clock.now();
        self.local.set_watermark(checkpoint)?;
        report.watermark = checkpoint;
        Ok(report)
    }
}
