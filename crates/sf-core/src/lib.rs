//! sf-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable data-model contract for skill-forge: every entity that flows
//! through the ledger, the artifact store, and the trusted execution
//! surface lives here as one `serde` + `schemars` annotated type. If you
//! only take one dependency from this workspace, take this one.

/// Content-addressed skill descriptors and the effect-class enum.
pub mod artifact;
/// Sandboxed build attempts (propose → build lineage).
pub mod build;
/// Deterministic chain specification types (field mapping, steps).
pub mod chain;
/// Trusted single-skill and chain execution records.
pub mod execution;
/// ID and timestamp generation shared by every entity.
pub mod ids;
/// Skill proposals and the PROPOSED→...→TRUSTED lifecycle.
pub mod proposal;
/// Deterministic failure classification types.
pub mod research;
/// Registry entries for trusted, loadable skills.
pub mod registry;
/// Lint/type-check/test/policy/invariant verification records.
pub mod verification;
/// Promotion records (status transition audit trail).
pub mod promotion;

pub use artifact::{Artifact, ArtifactKind};
pub use build::{Build, BuildStatus};
pub use chain::{ChainOptions, ChainSpec, ChainStep, FieldMapping};
pub use execution::ExecutionRecord;
pub use ids::{new_id, now_rfc3339};
pub use proposal::{ProposalStatus, SideEffectClass, SkillProposal};
pub use promotion::Promotion;
pub use registry::RegistryEntry;
pub use research::{FailureAnalysis, FailureKind};
pub use verification::{Verification, VerificationStatus};
