//! Verification records: the composed lint/type-check/test/policy/invariant verdict.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{new_id, now_rfc3339};

/// Overall verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// At least one check failed.
    Failed,
    /// Every check passed.
    Passed,
}

/// One verification pass over a proposal's built skill source.
///
/// Field names (`ruff_ok`, `mypy_ok`, `pytest_ok`) are kept verbatim from
/// the original system even though the tools behind them are Rust-native in
/// this rendering (`sf-verify`'s `ProcessToolRunner` invokes a lint runner,
/// a type/borrow checker proxy, and a test runner under those same three
/// slots) — this is an on-disk/ledger column name, not a claim about which
/// language toolchain runs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Verification {
    /// 12-hex-char entity ID.
    pub id: String,
    /// The proposal this verification pass covers.
    pub proposal_id: String,
    /// Overall status.
    pub status: VerificationStatus,
    /// Lint check result.
    pub ruff_ok: bool,
    /// Type/borrow-check result.
    pub mypy_ok: bool,
    /// Test-suite result.
    pub pytest_ok: bool,
    /// Policy scanner result.
    pub policy_ok: bool,
    /// Invariant checker result.
    pub invariant_ok: bool,
    /// Path to the written verification report artifact, if any.
    pub report_path: Option<String>,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl Verification {
    /// Construct a verification record from the five individual check results.
    pub fn new(
        proposal_id: impl Into<String>,
        ruff_ok: bool,
        mypy_ok: bool,
        pytest_ok: bool,
        policy_ok: bool,
        invariant_ok: bool,
    ) -> Self {
        let all_ok = ruff_ok && mypy_ok && pytest_ok && policy_ok && invariant_ok;
        Self {
            id: new_id(),
            proposal_id: proposal_id.into(),
            status: if all_ok {
                VerificationStatus::Passed
            } else {
                VerificationStatus::Failed
            },
            ruff_ok,
            mypy_ok,
            pytest_ok,
            policy_ok,
            invariant_ok,
            report_path: None,
            created_at: now_rfc3339(),
        }
    }
}
