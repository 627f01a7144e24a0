#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-verify
//!
//! Composes the five checks a built skill must pass before promotion: lint,
//! type/borrow-check, test suite, the policy scanner, and the invariant
//! checker. External tool invocation is abstracted behind [`ToolRunner`] so
//! tests can inject deterministic verdicts instead of shelling out.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::debug;

use sf_artifact::write_verification_report;
use sf_core::{SkillProposal, Verification, VerificationStatus};
use sf_error::{ErrorCode, SfError};
use sf_invariant::check_invariants;
use sf_ledger::LedgerStore;
use sf_policy::{format_report, scan_file, Policy, ScanResult};

/// Wall-clock budget for a single external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs an external quality-gate tool and reports pass/fail.
///
/// Implementations must never panic; a tool that cannot be found or that
/// times out is a fail, not an error, matching the original's
/// `except (subprocess.TimeoutExpired, FileNotFoundError): return False`.
pub trait ToolRunner: Send + Sync {
    /// Run `tool` with `args` in `cwd`, returning `true` on a zero exit.
    fn run(&self, tool: &str, args: &[&str], cwd: &Path) -> bool;
}

/// Invokes real external tools as subprocesses, bounded by a timeout.
#[derive(Debug, Clone, Copy)]
pub struct ProcessToolRunner {
    /// Per-invocation timeout.
    pub timeout: Duration,
}

impl Default for ProcessToolRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl ToolRunner for ProcessToolRunner {
    fn run(&self, tool: &str, args: &[&str], cwd: &Path) -> bool {
        let mut child = match Command::new(tool)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!(target: "sf_verify", tool, "failed to spawn: {e}");
                return false;
            }
        };

        let deadline = std::time::Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return status.success(),
                Ok(None) => {
                    if std::time::Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        debug!(target: "sf_verify", tool, "timed out after {:?}", self.timeout);
                        return false;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    debug!(target: "sf_verify", tool, "failed to poll: {e}");
                    return false;
                }
            }
        }
    }
}

/// Deterministic per-tool pass/fail injection, for `sf-verify`'s own tests
/// and for consumers writing tests against a skill-forge integration
/// without a real toolchain on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct StubToolRunner {
    verdicts: std::collections::HashMap<String, bool>,
    default_verdict: bool,
}

impl StubToolRunner {
    /// A stub where every tool passes unless overridden.
    pub fn all_passing() -> Self {
        Self {
            verdicts: std::collections::HashMap::new(),
            default_verdict: true,
        }
    }

    /// Override the verdict for a specific tool name.
    pub fn with_verdict(mut self, tool: impl Into<String>, passes: bool) -> Self {
        self.verdicts.insert(tool.into(), passes);
        self
    }
}

impl ToolRunner for StubToolRunner {
    fn run(&self, tool: &str, _args: &[&str], _cwd: &Path) -> bool {
        *self.verdicts.get(tool).unwrap_or(&self.default_verdict)
    }
}

/// Inputs to a single verification pass.
pub struct VerifyRequest<'a> {
    /// The proposal being verified.
    pub proposal: &'a SkillProposal,
    /// Path to the built skill's source file.
    pub skill_file: &'a Path,
    /// Directory to run lint/type-check/test tools in.
    pub project_root: &'a Path,
    /// Directory to write the verification report artifact under.
    pub output_dir: &'a Path,
    /// Forbidden-import/dynamic-exec policy.
    pub policy: &'a Policy,
}

/// Run all five checks on a built skill and record the result.
///
/// Returns the persisted [`Verification`] row; the report artifact is
/// already written and recorded in the ledger by the time this returns.
pub fn verify_skill(
    ledger: &LedgerStore,
    runner: &dyn ToolRunner,
    request: &VerifyRequest<'_>,
) -> Result<Verification, SfError> {
    let skill_file_str = request.skill_file.display().to_string();

    let lint_ok = runner.run("ruff", &["check", &skill_file_str], request.project_root);
    let typecheck_ok = runner.run("mypy", &[&skill_file_str], request.project_root);
    let test_ok = runner.run("pytest", &["-q", "--tb=short"], request.project_root);

    let violations = scan_file(request.skill_file, request.policy)?;
    let scan_result = ScanResult {
        violations,
        files_scanned: 1,
    };
    let policy_ok = scan_result.ok();

    let invariant_result = check_invariants(
        request.skill_file,
        request.proposal.side_effect_class.variant_name(),
        &request.proposal.name,
        request.project_root,
    )?;
    let invariant_ok = invariant_result.ok;

    let mut verification = Verification::new(
        request.proposal.id.clone(),
        lint_ok,
        typecheck_ok,
        test_ok,
        policy_ok,
        invariant_ok,
    );

    let report = render_report(request.proposal, &verification, &scan_result, &invariant_result);
    let artifact = write_verification_report(ledger, request.output_dir, &report, &request.proposal.id)?;
    verification.report_path = Some(artifact.path.clone());

    ledger.insert_verification(&verification)?;
    Ok(verification)
}

fn render_report(
    proposal: &SkillProposal,
    verification: &Verification,
    scan_result: &ScanResult,
    invariant_result: &sf_invariant::InvariantResult,
) -> String {
    let status = match verification.status {
        VerificationStatus::Passed => "PASSED",
        VerificationStatus::Failed => "FAILED",
    };

    let mut lines = vec![
        "# Verification Report".to_string(),
        String::new(),
        format!("Proposal: {} ({})", proposal.id, proposal.name),
        String::new(),
        "## Results".to_string(),
        format!("- ruff: {}", pass_fail(verification.ruff_ok)),
        format!("- mypy: {}", pass_fail(verification.mypy_ok)),
        format!("- pytest: {}", pass_fail(verification.pytest_ok)),
        format!("- policy: {}", pass_fail(verification.policy_ok)),
        format!("- invariant: {}", pass_fail(verification.invariant_ok)),
        String::new(),
        format!("## Overall: {status}"),
    ];

    if !verification.policy_ok {
        lines.push(String::new());
        lines.push("## Policy Violations".to_string());
        lines.push(format_report(scan_result));
    }

    if !verification.invariant_ok {
        lines.push(String::new());
        lines.push("## Invariant Violations".to_string());
        for v in &invariant_result.violations {
            lines.push(format!("- [{}] {}", v.check, v.message));
        }
    }

    lines.join("\n")
}

fn pass_fail(ok: bool) -> &'static str {
    if ok {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Promote `proposal_id` from `BUILT` to `VERIFIED` if its latest
/// verification passed. Callers typically run this immediately after
/// [`verify_skill`]; kept separate so a caller inspecting the verdict can
/// choose not to transition (e.g. to retry instead).
pub fn mark_verified_if_passed(ledger: &LedgerStore, proposal_id: &str) -> Result<bool, SfError> {
    let latest = ledger.get_latest_verification(proposal_id)?;
    if latest.status != VerificationStatus::Passed {
        return Ok(false);
    }
    ledger.update_proposal_status(proposal_id, sf_core::ProposalStatus::Verified)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::SideEffectClass;
    use std::fs;

    const CONFORMING_SKILL: &str = r#"
        pub struct Echo;

        impl Skill for Echo {
            fn descriptor(&self) -> SkillDescriptor {
                SkillDescriptor {
                    name: "echo".into(),
                    description: "echoes input".into(),
                    input_schema: serde_json::json!({"type": "object"}),
                    output_schema: serde_json::json!({"type": "object"}),
                    effect_class: EffectClass::ReadOnly,
                }
            }

            fn execute(&self, input: Value) -> Result<Value, SfError> {
                Ok(input)
            }
        }
    "#;

    fn sample_proposal() -> SkillProposal {
        SkillProposal::new("echo", "echoes input", "{}", SideEffectClass::ReadOnly, "[]")
    }

    #[test]
    fn all_checks_passing_marks_verification_passed() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let skill_file = dir.path().join("lib.rs");
        fs::write(&skill_file, CONFORMING_SKILL).unwrap();

        let proposal = sample_proposal();
        ledger.insert_proposal(&proposal).unwrap();

        let policy = Policy {
            forbidden_imports: vec![],
            allowed_network: false,
            allowed_write_paths: vec![],
            forbid_dynamic_exec: true,
        };

        let request = VerifyRequest {
            proposal: &proposal,
            skill_file: &skill_file,
            project_root: dir.path(),
            output_dir: dir.path(),
            policy: &policy,
        };

        let runner = StubToolRunner::all_passing();
        let verification = verify_skill(&ledger, &runner, &request).unwrap();
        assert_eq!(verification.status, VerificationStatus::Passed);
        assert!(verification.report_path.is_some());
    }

    #[test]
    fn failing_test_tool_fails_overall_verdict() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let skill_file = dir.path().join("lib.rs");
        fs::write(&skill_file, CONFORMING_SKILL).unwrap();

        let proposal = sample_proposal();
        ledger.insert_proposal(&proposal).unwrap();

        let policy = Policy {
            forbidden_imports: vec![],
            allowed_network: false,
            allowed_write_paths: vec![],
            forbid_dynamic_exec: true,
        };

        let request = VerifyRequest {
            proposal: &proposal,
            skill_file: &skill_file,
            project_root: dir.path(),
            output_dir: dir.path(),
            policy: &policy,
        };

        let runner = StubToolRunner::all_passing().with_verdict("pytest", false);
        let verification = verify_skill(&ledger, &runner, &request).unwrap();
        assert_eq!(verification.status, VerificationStatus::Failed);
        assert!(!verification.pytest_ok);
    }

    #[test]
    fn forbidden_import_fails_policy_and_overall_verdict() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let skill_file = dir.path().join("lib.rs");
        fs::write(&skill_file, "use std::process::Command;\nfn f() {}\n").unwrap();

        let proposal = SkillProposal::new("bad", "bad skill", "{}", SideEffectClass::ReadOnly, "[]");
        ledger.insert_proposal(&proposal).unwrap();

        let policy = Policy {
            forbidden_imports: vec!["std::process".to_string()],
            allowed_network: false,
            allowed_write_paths: vec![],
            forbid_dynamic_exec: true,
        };

        let request = VerifyRequest {
            proposal: &proposal,
            skill_file: &skill_file,
            project_root: dir.path(),
            output_dir: dir.path(),
            policy: &policy,
        };

        let runner = StubToolRunner::all_passing();
        let verification = verify_skill(&ledger, &runner, &request).unwrap();
        assert!(!verification.policy_ok);
        assert_eq!(verification.status, VerificationStatus::Failed);
    }

    #[test]
    fn mark_verified_if_passed_transitions_built_proposal() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let mut proposal = sample_proposal();
        proposal.status = sf_core::ProposalStatus::Built;
        ledger.insert_proposal(&proposal).unwrap();

        let verification = Verification::new(proposal.id.clone(), true, true, true, true, true);
        ledger.insert_verification(&verification).unwrap();

        let transitioned = mark_verified_if_passed(&ledger, &proposal.id).unwrap();
        assert!(transitioned);
        let reloaded = ledger.get_proposal(&proposal.id).unwrap();
        assert_eq!(reloaded.status, sf_core::ProposalStatus::Verified);
    }

    #[test]
    fn mark_verified_if_passed_is_noop_on_failed_verification() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let mut proposal = sample_proposal();
        proposal.status = sf_core::ProposalStatus::Built;
        ledger.insert_proposal(&proposal).unwrap();

        let verification = Verification::new(proposal.id.clone(), true, false, true, true, true);
        ledger.insert_verification(&verification).unwrap();

        let transitioned = mark_verified_if_passed(&ledger, &proposal.id).unwrap();
        assert!(!transitioned);
        let reloaded = ledger.get_proposal(&proposal.id).unwrap();
        assert_eq!(reloaded.status, sf_core::ProposalStatus::Built);
    }
}
