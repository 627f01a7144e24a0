//! Deterministic failure classification.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The deterministic classification of a failed build or verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The sandbox diff fell outside the allow-list.
    GateViolation,
    /// A build or verify step exceeded its time budget.
    Timeout,
    /// The build attempt failed for a reason other than the gate or a timeout.
    BuildError,
    /// The lint check failed.
    VerifyLint,
    /// The test suite failed.
    VerifyTest,
    /// The policy scanner found a violation.
    VerifyPolicy,
    /// The invariant checker found a violation.
    VerifyInvariant,
    /// No more specific classification applies.
    Unknown,
}

/// The result of classifying a failed build/verification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailureAnalysis {
    /// The deterministic classification.
    pub kind: FailureKind,
    /// Short, human-readable facts extracted from the build/verify records.
    pub facts: Vec<String>,
    /// A bounded excerpt of the relevant log.
    pub log_excerpt: String,
    /// The build's retry attempt number.
    pub attempt_number: u32,
    /// The build this analysis covers.
    pub build_id: String,
}
