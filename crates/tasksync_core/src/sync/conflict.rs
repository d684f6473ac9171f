//! Last-write-wins merge decisions.
//!
//! A fetched task replaces the local row only when its `updated_at` is strictly
//! later. Equal stamps keep the local copy, so replaying a fetch is a no-op.

use crate::model::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    Insert,
    Overwrite,
    KeepLocal,
}

pub fn decide(remote: &Task, local: Option<&Task>) -> MergeDecision {
    match local {
        None => MergeDecision::Insert,
        Some(local) if remote.updated_at > local.updated_at => MergeDecision::Overwrite,
        Some(_) => MergeDecision::KeepLocal,
    }
}

/// Whether `remote` should be written over the local state.
pub fn should_apply(remote: &Task, local: Option<&Task>) -> bool {
    decide(remote, local) != MergeDecision::KeepLocal
}
