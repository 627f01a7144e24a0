//! Skill proposals and their lifecycle status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{new_id, now_rfc3339};

/// The declared side-effect class of a proposed skill.
///
/// `SECRET_READ` was added by migration 5 of the original ledger schema
/// (widening the `side_effect_class` CHECK constraint) after the rest of
/// the class list had already shipped; it is carried forward here even
/// though the distilled spec's literal enum predates it, since every other
/// part of this system (the registry, the confirmation-policy table in
/// `sf-skill-api`) treats it as a first-class member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SideEffectClass {
    /// Reads only; no mutation of files, network, or secrets.
    ReadOnly,
    /// Writes to the local filesystem.
    FileWrite,
    /// Makes outbound network calls.
    Network,
    /// Reads a secret value (API key, token, credential).
    SecretRead,
    /// Moves or spends money.
    Money,
    /// Sends a message on behalf of the user (email, chat, SMS).
    Messaging,
}

impl SideEffectClass {
    /// The bare Rust variant identifier (e.g. `"ReadOnly"`), matching how a
    /// skill's `descriptor()` writes it in source. `sf-invariant`'s
    /// structural check compares against this, not the `SCREAMING_SNAKE_CASE`
    /// serde rendering used on disk and in the ledger.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ReadOnly",
            Self::FileWrite => "FileWrite",
            Self::Network => "Network",
            Self::SecretRead => "SecretRead",
            Self::Money => "Money",
            Self::Messaging => "Messaging",
        }
    }
}

/// Lifecycle status of a [`SkillProposal`].
///
/// Transitions are linear — `PROPOSED → BUILT → VERIFIED → TRUSTED` — with
/// one terminal side-branch, `PROPOSED → REJECTED`. Modeled as an enum plus
/// `valid_transitions`/`can_transition_to` rather than leaving transition
/// legality to caller discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Freshly proposed; awaiting a sandboxed build attempt.
    Proposed,
    /// Rejected; terminal.
    Rejected,
    /// A sandboxed build attempt succeeded and passed the diff gate.
    Built,
    /// Verification (lint/type-check/test/policy/invariant) passed.
    Verified,
    /// Promoted into the registry; loadable by trusted consumers.
    Trusted,
}

impl ProposalStatus {
    /// Returns `true` if this status has no further valid transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Trusted)
    }

    /// Returns the set of statuses this status may transition to.
    pub fn valid_transitions(self) -> &'static [ProposalStatus] {
        match self {
            Self::Proposed => &[Self::Built, Self::Rejected],
            Self::Built => &[Self::Verified, Self::Rejected],
            Self::Verified => &[Self::Trusted, Self::Rejected],
            Self::Rejected | Self::Trusted => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is legal.
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// A proposed skill, tracked through its build/verify/promote lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SkillProposal {
    /// 12-hex-char entity ID.
    pub id: String,
    /// Human-readable skill name (also the registry key).
    pub name: String,
    /// What the skill does and why it was proposed.
    pub description: String,
    /// JSON Schema text for the skill's input/output contract.
    pub io_schema_json: String,
    /// Declared side-effect class.
    pub side_effect_class: SideEffectClass,
    /// JSON array of required secret names, as text (matches the ledger column).
    pub required_secrets_json: String,
    /// Current lifecycle status.
    pub status: ProposalStatus,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl SkillProposal {
    /// Construct a new proposal in [`ProposalStatus::Proposed`].
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        io_schema_json: impl Into<String>,
        side_effect_class: SideEffectClass,
        required_secrets_json: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: description.into(),
            io_schema_json: io_schema_json.into(),
            side_effect_class,
            required_secrets_json: required_secrets_json.into(),
            status: ProposalStatus::Proposed,
            created_at: now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposed_can_reach_built_or_rejected() {
        assert!(ProposalStatus::Proposed.can_transition_to(ProposalStatus::Built));
        assert!(ProposalStatus::Proposed.can_transition_to(ProposalStatus::Rejected));
        assert!(!ProposalStatus::Proposed.can_transition_to(ProposalStatus::Verified));
        assert!(!ProposalStatus::Proposed.can_transition_to(ProposalStatus::Trusted));
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        assert!(ProposalStatus::Trusted.is_terminal());
        assert!(ProposalStatus::Rejected.is_terminal());
        assert!(ProposalStatus::Trusted.valid_transitions().is_empty());
        assert!(ProposalStatus::Rejected.valid_transitions().is_empty());
    }

    #[test]
    fn linear_path_is_fully_walkable() {
        let path = [
            ProposalStatus::Proposed,
            ProposalStatus::Built,
            ProposalStatus::Verified,
            ProposalStatus::Trusted,
        ];
        for w in path.windows(2) {
            assert!(w[0].can_transition_to(w[1]), "{:?} -> {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn new_proposal_starts_proposed() {
        let p = SkillProposal::new("echo", "echoes input", "{}", SideEffectClass::ReadOnly, "[]");
        assert_eq!(p.status, ProposalStatus::Proposed);
        assert_eq!(p.id.len(), 12);
    }
}
