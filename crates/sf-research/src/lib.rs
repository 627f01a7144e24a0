#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-research
//!
//! Two-layer failure research. Layer one, [`classify_failure`], is a
//! deterministic classifier over a failed build's records and logs — no
//! network calls, fully unit-testable. Layer two, [`advise_retry`], asks a
//! caller-supplied [`Generate`] gateway for a corrected build packet and
//! checks the result against [`check_escalation_triggers`] before a retry
//! is allowed to proceed unattended.
//!
//! `PERMISSION_WIDENING` is computed structurally — comparing the retrying
//! proposal's declared effect class against the ancestor proposal it
//! descends from via `sf-skill-api`'s centralized confirmation-policy table
//! — rather than by scanning packet markdown for escalating keywords, which
//! is how the original system did it.

use std::path::Path;

use regex::Regex;

use sf_artifact::write_research_note;
use sf_core::{Artifact, ArtifactKind, Build, BuildStatus, FailureAnalysis, FailureKind, SideEffectClass, Verification, VerificationStatus};
use sf_error::{ErrorCode, SfError};
use sf_ledger::LedgerStore;
use sf_skill_api::{ConfirmationPolicy, EffectClassExt};

const LOG_EXCERPT_MAX: usize = 2000;

fn extract_excerpt(text: &str) -> String {
    if text.len() <= LOG_EXCERPT_MAX {
        text.to_string()
    } else {
        let mut end = LOG_EXCERPT_MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}\n... (truncated)", &text[..end])
    }
}

/// Classify a build/verify failure from its records and log text.
///
/// Deterministic — checks verification sub-results before build-level
/// failures, since a verification failure is always more specific than a
/// generic build failure.
pub fn classify_failure(build: &Build, build_log: &str, verification: Option<&Verification>) -> FailureAnalysis {
    let mut facts = Vec::new();

    if let Some(v) = verification {
        if v.status == VerificationStatus::Failed {
            if !v.invariant_ok {
                facts.push("Invariant check failed".to_string());
                return finish(FailureKind::VerifyInvariant, facts, build_log, build);
            }
            if !v.policy_ok {
                facts.push("Policy scanner found violations".to_string());
                return finish(FailureKind::VerifyPolicy, facts, build_log, build);
            }
            if !v.pytest_ok {
                facts.push("test suite failed".to_string());
                return finish(FailureKind::VerifyTest, facts, build_log, build);
            }
            if !v.ruff_ok || !v.mypy_ok {
                if !v.ruff_ok {
                    facts.push("lint check failed".to_string());
                }
                if !v.mypy_ok {
                    facts.push("type check failed".to_string());
                }
                return finish(FailureKind::VerifyLint, facts, build_log, build);
            }
        }
    }

    if build.status == BuildStatus::Failed {
        let summary = build.summary.clone().unwrap_or_default();
        let log_head: String = build_log.chars().take(500).collect();

        if summary.contains("timed out") || summary.contains("Timeout") || log_head.contains("TIMEOUT") {
            facts.push(format!("Build timed out: {summary}"));
            return finish(FailureKind::Timeout, facts, build_log, build);
        }

        if summary.to_lowercase().contains("gate") || summary.to_lowercase().contains("changeset") {
            if let Some(caps) = regex_capture(r"disallowed paths:\s*(\[[^\]]*\])", build_log) {
                facts.push(format!("Disallowed files: {caps}"));
            }
            if let Some(caps) = regex_capture(r"missing required paths:\s*(\[[^\]]*\])", build_log) {
                facts.push(format!("Missing files: {caps}"));
            }
            facts.push(format!("Gate summary: {summary}"));
            return finish(FailureKind::GateViolation, facts, build_log, build);
        }

        facts.push(format!("Build failed: {summary}"));
        if let Some(caps) = regex_capture(r"exit_code:\s*Some\((\d+)\)", build_log) {
            facts.push(format!("Exit code: {caps}"));
        }
        return finish(FailureKind::BuildError, facts, build_log, build);
    }

    finish(
        FailureKind::Unknown,
        vec!["Could not determine failure cause".to_string()],
        build_log,
        build,
    )
}

fn regex_capture(pattern: &str, text: &str) -> Option<String> {
    Regex::new(pattern).ok()?.captures(text)?.get(1).map(|m| m.as_str().to_string())
}

fn finish(kind: FailureKind, facts: Vec<String>, build_log: &str, build: &Build) -> FailureAnalysis {
    FailureAnalysis {
        kind,
        facts,
        log_excerpt: extract_excerpt(build_log),
        attempt_number: build.attempt_number,
        build_id: build.id.clone(),
    }
}

fn find_build_log(ledger: &LedgerStore, build: &Build) -> Result<String, SfError> {
    let artifacts = ledger.get_artifacts_for_related(&build.id)?;
    for art in artifacts.iter().rev() {
        if art.kind == ArtifactKind::BuildLog {
            if let Ok(text) = std::fs::read_to_string(&art.path) {
                return Ok(text);
            }
        }
    }
    Ok(String::new())
}

/// Analyze a failed build (or one whose latest verification failed) and
/// write a `RESEARCH_NOTE` artifact. Fails if neither condition holds —
/// there is nothing to research about a build that hasn't failed.
pub fn research_skill(
    ledger: &LedgerStore,
    output_dir: &Path,
    build_id: &str,
    user_hint: Option<&str>,
) -> Result<(FailureAnalysis, Artifact), SfError> {
    let build = ledger.get_build(build_id)?;
    let verification = ledger.get_latest_verification(&build.proposal_id).ok();

    let verification_failed = verification
        .as_ref()
        .is_some_and(|v| v.status == VerificationStatus::Failed);
    if build.status != BuildStatus::Failed && !verification_failed {
        return Err(SfError::new(
            ErrorCode::ValidationError,
            format!(
                "build '{build_id}' is not failed (status={:?}) and has no failed verification",
                build.status
            ),
        )
        .with_context("build_id", build_id.to_string()));
    }

    let build_log = find_build_log(ledger, &build)?;
    let analysis = classify_failure(&build, &build_log, verification.as_ref());

    let mut lines = vec![
        format!("# Research Note: Build {build_id}"),
        String::new(),
        format!("## Failure Classification: {:?}", analysis.kind),
        String::new(),
        format!("**Attempt:** {}", analysis.attempt_number),
        format!("**Build ID:** {}", analysis.build_id),
        String::new(),
        "## Facts".to_string(),
    ];
    for fact in &analysis.facts {
        lines.push(format!("- {fact}"));
    }
    if let Some(hint) = user_hint {
        lines.push(String::new());
        lines.push("## User Hint".to_string());
        lines.push(hint.to_string());
    }
    if !analysis.log_excerpt.is_empty() {
        lines.push(String::new());
        lines.push("## Log Excerpt".to_string());
        lines.push(format!("```\n{}\n```", analysis.log_excerpt));
    }
    let content = lines.join("\n") + "\n";

    let artifact = write_research_note(ledger, output_dir, &content, build_id)?;
    Ok((analysis, artifact))
}

/// A condition that forces human review before an automated retry proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationTrigger {
    /// Three or more prior build attempts for this proposal have failed.
    RepeatedFailure,
    /// The retrying proposal's effect class would require confirmation
    /// beyond what the ancestor proposal it descends from required.
    PermissionWidening,
    /// The failure itself is in a security-relevant class (policy/invariant).
    SecurityClass,
    /// The proposed retry packet differs from the original by more than half its lines.
    LargeDiff,
    /// The failure could not be classified.
    Ambiguous,
}

/// Check escalation triggers for a retry attempt.
///
/// `ancestor_effect_class` is the effect class declared on the original
/// proposal this retry descends from (itself, for a first attempt).
pub fn check_escalation_triggers(
    ledger: &LedgerStore,
    analysis: &FailureAnalysis,
    current_effect_class: SideEffectClass,
    ancestor_effect_class: SideEffectClass,
    original_packet: &str,
    proposed_packet: &str,
) -> Result<Vec<EscalationTrigger>, SfError> {
    let mut triggers = Vec::new();

    let build = ledger.get_build(&analysis.build_id)?;
    let prior_builds = ledger.get_builds_for_proposal(&build.proposal_id)?;
    let failed_count = prior_builds.iter().filter(|b| b.status == BuildStatus::Failed).count();
    if failed_count >= 3 {
        triggers.push(EscalationTrigger::RepeatedFailure);
    }

    if matches!(analysis.kind, FailureKind::VerifyPolicy | FailureKind::VerifyInvariant) {
        triggers.push(EscalationTrigger::SecurityClass);
    }

    if widens_permission(current_effect_class, ancestor_effect_class) {
        triggers.push(EscalationTrigger::PermissionWidening);
    }

    if large_diff(original_packet, proposed_packet) {
        triggers.push(EscalationTrigger::LargeDiff);
    }

    if analysis.kind == FailureKind::Unknown {
        triggers.push(EscalationTrigger::Ambiguous);
    }

    Ok(triggers)
}

/// `true` if `current` requires a strictly stricter confirmation policy
/// than `ancestor` did, i.e. the retry proposes to widen permissions.
fn widens_permission(current: SideEffectClass, ancestor: SideEffectClass) -> bool {
    confirmation_rank(current.confirmation_policy()) > confirmation_rank(ancestor.confirmation_policy())
}

fn confirmation_rank(policy: ConfirmationPolicy) -> u8 {
    match policy {
        ConfirmationPolicy::AllowedByDefault => 0,
        ConfirmationPolicy::RequiresConfirmation => 1,
        ConfirmationPolicy::Blocked => 2,
    }
}

fn large_diff(original: &str, proposed: &str) -> bool {
    let orig_lines: Vec<&str> = original.lines().collect();
    let prop_lines: Vec<&str> = proposed.lines().collect();
    if orig_lines.is_empty() {
        return false;
    }
    let changed = orig_lines.iter().zip(prop_lines.iter()).filter(|(a, b)| a != b).count();
    let added = orig_lines.len().abs_diff(prop_lines.len());
    let ratio = (changed + added) as f64 / orig_lines.len().max(1) as f64;
    ratio > 0.5
}

/// A retry-advisory generation gateway: takes a prompt, returns generated
/// text. Modeled as a trait object so `sf-research` never depends on a
/// concrete HTTP client — the gateway itself is out of scope here.
pub trait Generate: Send + Sync {
    /// Generate text from a single prompt.
    fn generate(&self, prompt: &str) -> Result<String, SfError>;
}

/// Ask `generator` for a corrected build packet and check the result
/// against the escalation triggers. A non-empty trigger list means the
/// proposed retry requires human review before it's applied.
pub fn advise_retry(
    ledger: &LedgerStore,
    generator: &dyn Generate,
    analysis: &FailureAnalysis,
    current_effect_class: SideEffectClass,
    ancestor_effect_class: SideEffectClass,
    original_packet: &str,
) -> Result<(String, Vec<EscalationTrigger>), SfError> {
    let prompt = render_advisory_prompt(analysis, original_packet);
    let proposed = generator.generate(&prompt)?;

    let triggers = check_escalation_triggers(
        ledger,
        analysis,
        current_effect_class,
        ancestor_effect_class,
        original_packet,
        &proposed,
    )?;

    Ok((proposed, triggers))
}

fn render_advisory_prompt(analysis: &FailureAnalysis, original_packet: &str) -> String {
    let facts = analysis.facts.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n");
    let log_head: String = analysis.log_excerpt.chars().take(1500).collect();
    format!(
        "You are a build system assistant. A skill build attempt failed.\n\n\
         ## Failure Classification\n- Kind: {:?}\n- Attempt: {}\n\n\
         ## Facts\n{facts}\n\n\
         ## Log Excerpt\n```\n{log_head}\n```\n\n\
         ## Original BUILD_PACKET\n```markdown\n{original_packet}\n```\n\n\
         ## Task\nPropose a corrected BUILD_PACKET that addresses the failure. Output ONLY \
         the corrected BUILD_PACKET content, nothing else. Keep the same structure but fix \
         the instructions to avoid the failure. Do NOT widen permissions, add secrets, or \
         change the side effect class.",
        analysis.kind, analysis.attempt_number,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_build(status: BuildStatus, summary: Option<&str>) -> Build {
        let mut build = Build::new("prop1", "branch-a");
        build.status = status;
        build.summary = summary.map(str::to_string);
        build
    }

    #[test]
    fn verification_invariant_failure_takes_priority() {
        let build = sample_build(BuildStatus::Succeeded, None);
        let verification = Verification::new("prop1", true, true, true, true, false);
        let analysis = classify_failure(&build, "", Some(&verification));
        assert_eq!(analysis.kind, FailureKind::VerifyInvariant);
    }

    #[test]
    fn verification_policy_failure_is_next_priority() {
        let build = sample_build(BuildStatus::Succeeded, None);
        let verification = Verification::new("prop1", true, true, true, false, true);
        let analysis = classify_failure(&build, "", Some(&verification));
        assert_eq!(analysis.kind, FailureKind::VerifyPolicy);
    }

    #[test]
    fn build_timeout_is_classified() {
        let build = sample_build(BuildStatus::Failed, Some("builder timed out after 120s"));
        let analysis = classify_failure(&build, "", None);
        assert_eq!(analysis.kind, FailureKind::Timeout);
    }

    #[test]
    fn gate_violation_is_classified_and_extracts_facts() {
        let build = sample_build(BuildStatus::Failed, Some("diff gate rejected changeset"));
        let log = "gate_passed: false\ndisallowed paths: [\"Cargo.toml\"]\n";
        let analysis = classify_failure(&build, log, None);
        assert_eq!(analysis.kind, FailureKind::GateViolation);
        assert!(analysis.facts.iter().any(|f| f.contains("Cargo.toml")));
    }

    #[test]
    fn unclassified_success_is_unknown() {
        let build = sample_build(BuildStatus::Started, None);
        let analysis = classify_failure(&build, "", None);
        assert_eq!(analysis.kind, FailureKind::Unknown);
    }

    #[test]
    fn permission_widening_detects_stricter_ancestor_policy() {
        assert!(widens_permission(SideEffectClass::Network, SideEffectClass::ReadOnly));
        assert!(!widens_permission(SideEffectClass::ReadOnly, SideEffectClass::Network));
        assert!(!widens_permission(SideEffectClass::Network, SideEffectClass::Money));
    }

    #[test]
    fn large_diff_detects_majority_line_changes() {
        let original = "a\nb\nc\nd\n";
        let proposed = "x\ny\nc\nd\n";
        assert!(large_diff(original, proposed));
        assert!(!large_diff(original, "a\nb\nc\nd\n"));
    }

    #[test]
    fn research_skill_writes_note_for_failed_build() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let proposal = sf_core::SkillProposal::new("echo", "desc", "{}", SideEffectClass::ReadOnly, "[]");
        ledger.insert_proposal(&proposal).unwrap();
        let mut build = Build::new(proposal.id.clone(), "branch-a");
        build.status = BuildStatus::Failed;
        build.summary = Some("build failed: exit_code: Some(1)".to_string());
        ledger.insert_build(&build).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (analysis, artifact) =
            research_skill(&ledger, dir.path(), &build.id, Some("try again")).unwrap();
        assert_eq!(analysis.kind, FailureKind::BuildError);
        assert_eq!(artifact.kind, ArtifactKind::ResearchNote);
        assert!(std::path::Path::new(&artifact.path).exists());
    }

    #[test]
    fn research_skill_rejects_non_failed_build() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let proposal = sf_core::SkillProposal::new("echo", "desc", "{}", SideEffectClass::ReadOnly, "[]");
        ledger.insert_proposal(&proposal).unwrap();
        let build = Build::new(proposal.id.clone(), "branch-a");
        ledger.insert_build(&build).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = research_skill(&ledger, dir.path(), &build.id, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    struct StubGenerate(String);
    impl Generate for StubGenerate {
        fn generate(&self, _prompt: &str) -> Result<String, SfError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn advise_retry_returns_generated_packet_and_triggers() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let proposal = sf_core::SkillProposal::new("echo", "desc", "{}", SideEffectClass::ReadOnly, "[]");
        ledger.insert_proposal(&proposal).unwrap();
        let build = Build::new(proposal.id.clone(), "branch-a");
        ledger.insert_build(&build).unwrap();

        let analysis = FailureAnalysis {
            kind: FailureKind::BuildError,
            facts: vec!["build failed".into()],
            log_excerpt: String::new(),
            attempt_number: 1,
            build_id: build.id.clone(),
        };

        let generator = StubGenerate("# Build Packet\nfixed\n".to_string());
        let (packet, triggers) = advise_retry(
            &ledger,
            &generator,
            &analysis,
            SideEffectClass::ReadOnly,
            SideEffectClass::ReadOnly,
            "# Build Packet\noriginal\n",
        )
        .unwrap();
        assert_eq!(packet, "# Build Packet\nfixed\n");
        assert!(triggers.is_empty());
    }
}
