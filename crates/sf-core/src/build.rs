//! Sandboxed build attempts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{new_id, now_rfc3339};

/// Outcome status of a single sandboxed build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Build attempt is in progress.
    Started,
    /// Build attempt failed (diff gate, timeout, or builder error).
    Failed,
    /// Build attempt produced a diff within the allow-list.
    Succeeded,
}

/// A single sandboxed build attempt for a [`crate::proposal::SkillProposal`].
///
/// `attempt_number`/`parent_build_id` record retry lineage: a retry spawned
/// from `sf-research`'s advisory packet carries the prior build's id as its
/// parent, so `sf-research`'s escalation triggers can walk the chain.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Build {
    /// 12-hex-char entity ID.
    pub id: String,
    /// The proposal this build attempt is for.
    pub proposal_id: String,
    /// Name of the sandbox branch/workspace copy used for this attempt.
    pub branch_name: String,
    /// RFC3339 start timestamp.
    pub started_at: String,
    /// RFC3339 completion timestamp, if finished.
    pub finished_at: Option<String>,
    /// Current status.
    pub status: BuildStatus,
    /// Human-readable outcome summary (gate violation details, exit code, etc.).
    pub summary: Option<String>,
    /// 1-indexed retry attempt number for this proposal.
    pub attempt_number: u32,
    /// The build this attempt retries, if any.
    pub parent_build_id: Option<String>,
}

impl Build {
    /// Construct a new build attempt in [`BuildStatus::Started`].
    pub fn new(proposal_id: impl Into<String>, branch_name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            proposal_id: proposal_id.into(),
            branch_name: branch_name.into(),
            started_at: now_rfc3339(),
            finished_at: None,
            status: BuildStatus::Started,
            summary: None,
            attempt_number: 1,
            parent_build_id: None,
        }
    }

    /// Construct a retry build attempt descending from `parent`.
    pub fn retry_of(parent: &Build, branch_name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            proposal_id: parent.proposal_id.clone(),
            branch_name: branch_name.into(),
            started_at: now_rfc3339(),
            finished_at: None,
            status: BuildStatus::Started,
            summary: None,
            attempt_number: parent.attempt_number + 1,
            parent_build_id: Some(parent.id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_build_is_first_attempt() {
        let b = Build::new("prop1", "branch-a");
        assert_eq!(b.attempt_number, 1);
        assert!(b.parent_build_id.is_none());
        assert_eq!(b.status, BuildStatus::Started);
    }

    #[test]
    fn retry_of_increments_attempt_and_links_parent() {
        let first = Build::new("prop1", "branch-a");
        let retry = Build::retry_of(&first, "branch-b");
        assert_eq!(retry.attempt_number, 2);
        assert_eq!(retry.parent_build_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(retry.proposal_id, first.proposal_id);
    }
}
