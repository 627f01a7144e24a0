//! Content-hashed artifact records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{new_id, now_rfc3339};

/// The kind of content an [`Artifact`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    /// The proposal's JSON-Schema input/output spec.
    SkillSpec,
    /// A human-readable summary of a build's diff.
    PatchSummary,
    /// The rendered verification report.
    VerificationReport,
    /// A free-form note attached to a proposal or build.
    Note,
    /// The build instructions handed to the sandboxed builder.
    BuildPacket,
    /// Captured stdout/stderr of a build attempt.
    BuildLog,
    /// A failure research note produced by `sf-research`.
    ResearchNote,
}

/// A content-addressed file written to the artifact store, with a ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    /// 12-hex-char entity ID.
    pub id: String,
    /// Kind of content this artifact holds.
    pub kind: ArtifactKind,
    /// Filesystem path the artifact was written to.
    pub path: String,
    /// SHA-256 hex digest of the artifact's content.
    pub sha256: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// The proposal or build this artifact relates to, if any.
    pub related_id: Option<String>,
}

impl Artifact {
    /// Construct an artifact record. `sha256` should already be computed by
    /// the caller (`sf_artifact::content_hash`) before constructing this.
    pub fn new(
        kind: ArtifactKind,
        path: impl Into<String>,
        sha256: impl Into<String>,
        related_id: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            kind,
            path: path.into(),
            sha256: sha256.into(),
            created_at: now_rfc3339(),
            related_id,
        }
    }
}
