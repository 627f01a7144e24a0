//! Promotion audit records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{new_id, now_rfc3339};
use crate::proposal::ProposalStatus;

/// An audit record of a status transition approved by a human or automated actor.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Promotion {
    /// 12-hex-char entity ID.
    pub id: String,
    /// The proposal promoted.
    pub proposal_id: String,
    /// Status transitioned from.
    pub from_status: ProposalStatus,
    /// Status transitioned to.
    pub to_status: ProposalStatus,
    /// Identity of the approver (user, automation, or CLI invocation context).
    pub approved_by: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl Promotion {
    /// Construct a new promotion record.
    pub fn new(
        proposal_id: impl Into<String>,
        from_status: ProposalStatus,
        to_status: ProposalStatus,
        approved_by: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            proposal_id: proposal_id.into(),
            from_status,
            to_status,
            approved_by: approved_by.into(),
            created_at: now_rfc3339(),
        }
    }
}
