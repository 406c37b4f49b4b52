//! Store-backed state: jobs, workers, data-quality issues, logs, dead letters.
//!
//! Every lifecycle mutation is a conditional UPDATE whose WHERE clause
//! names the states the target is legally reachable from, rendered by
//! [`transition_sources`] from the canonical graph in `drover_protocol`.
//! The store's row lock then serializes transitions per job, and an
//! out-of-graph or non-owner request surfaces as zero rows affected.

pub mod dead_letter;
pub mod issues;
pub mod jobs;
pub mod logs;
pub mod workers;

pub use dead_letter::DeadLetterStore;
pub use issues::IssueStore;
pub use jobs::JobStore;
pub use logs::LogStore;
pub use workers::WorkerStore;

use drover_protocol::JobStatus;

/// SQL `IN (...)` member list of the states from which `target` is legally
/// reachable, per [`JobStatus::can_transition_to`]. Conditional UPDATEs
/// derive their status guard from this so the transition graph is encoded
/// exactly once.
pub(crate) fn transition_sources(target: JobStatus) -> String {
    JobStatus::ALL
        .iter()
        .filter(|from| from.can_transition_to(target))
        .map(|from| format!("'{}'", from.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_sources_follow_the_graph() {
        assert_eq!(transition_sources(JobStatus::Claimed), "'pending'");
        assert_eq!(transition_sources(JobStatus::Running), "'claimed'");
        assert_eq!(transition_sources(JobStatus::Completed), "'running'");
        assert_eq!(transition_sources(JobStatus::Failed), "'claimed', 'running'");
        assert_eq!(transition_sources(JobStatus::Pending), "'claimed', 'running'");
        assert_eq!(
            transition_sources(JobStatus::Cancelled),
            "'pending', 'claimed', 'running'"
        );
    }
}
