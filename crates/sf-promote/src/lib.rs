#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-promote
//!
//! Elevates a `VERIFIED` proposal to `TRUSTED`: recomputes the skill
//! source's hash, derives its registry entry by convention, rewrites
//! `registry.yaml`, transitions the proposal, and records a [`Promotion`]
//! audit row. Grounded on `kavi.forge.promote.promote_skill`, adapted to
//! this workspace's compiled-Rust skill convention (`sf_registry::
//! skill_source_path`) in place of the original's dotted Python module path.

use std::path::Path;

use sf_artifact::content_hash;
use sf_core::{Promotion, ProposalStatus};
use sf_error::{ErrorCode, SfError};
use sf_ledger::LedgerStore;
use sf_registry::{skill_source_path, RegistryEntry};

/// Default approver identity, matching the original's `kshetrajna` default.
pub const DEFAULT_APPROVED_BY: &str = "skill-forge";

/// Inputs to a promotion attempt.
pub struct PromoteRequest<'a> {
    /// The proposal to promote; must currently be `VERIFIED`.
    pub proposal_id: &'a str,
    /// Root the compiled skill source lives under (`skills_root/name/src/lib.rs`).
    pub skills_root: &'a Path,
    /// Path to the registry manifest file.
    pub registry_path: &'a Path,
    /// Identity recorded as having approved this promotion.
    pub approved_by: &'a str,
}

/// Promote a verified proposal to `TRUSTED`.
///
/// Preconditions (both required, matching the original's two explicit
/// checks): the proposal's status must be [`ProposalStatus::Verified`], and
/// its latest verification must have [`sf_core::VerificationStatus::Passed`].
pub fn promote_skill(ledger: &LedgerStore, request: &PromoteRequest<'_>) -> Result<Promotion, SfError> {
    let proposal = ledger.get_proposal(request.proposal_id)?;
    if proposal.status != ProposalStatus::Verified {
        return Err(SfError::new(
            ErrorCode::GateViolation,
            format!(
                "proposal '{}' has status {:?}, expected VERIFIED",
                request.proposal_id, proposal.status
            ),
        )
        .with_context("proposal_id", request.proposal_id.to_string()));
    }

    let verification = ledger.get_latest_verification(request.proposal_id)?;
    if verification.status != sf_core::VerificationStatus::Passed {
        return Err(SfError::new(
            ErrorCode::GateViolation,
            format!("no passing verification found for proposal '{}'", request.proposal_id),
        )
        .with_context("proposal_id", request.proposal_id.to_string()));
    }

    let skill_file = skill_source_path(request.skills_root, &proposal.name);
    let source = std::fs::read_to_string(&skill_file).map_err(|e| {
        SfError::new(ErrorCode::StoreError, format!("cannot read skill source: {e}"))
            .with_context("path", skill_file.display().to_string())
    })?;
    let hash = content_hash(&source);

    let existing = sf_registry::load_registry(request.registry_path)?;
    let next_version = existing
        .iter()
        .find(|e| e.name == proposal.name)
        .map(|e| e.version + 1)
        .unwrap_or(1);

    let class_stem = pascal_case(&proposal.name);
    let entry = RegistryEntry {
        name: proposal.name.clone(),
        module_reference: format!("skills::{}", proposal.name),
        description: proposal.description.clone(),
        input_model_ref: format!("{class_stem}Input"),
        output_model_ref: format!("{class_stem}Output"),
        effect_class: proposal.side_effect_class,
        required_secrets: parse_required_secrets(&proposal.required_secrets_json),
        version: next_version,
        hash,
    };

    sf_registry::upsert(request.registry_path, entry)?;

    ledger.update_proposal_status(request.proposal_id, ProposalStatus::Trusted)?;

    let promotion = Promotion::new(
        request.proposal_id,
        ProposalStatus::Verified,
        ProposalStatus::Trusted,
        request.approved_by,
    );
    ledger.insert_promotion(&promotion)?;

    Ok(promotion)
}

fn parse_required_secrets(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// `snake_case` → `PascalCase`, matching the original's `name.title().replace("_", "")`.
fn pascal_case(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::{SideEffectClass, SkillProposal, Verification};
    use std::fs;

    fn verified_proposal(name: &str) -> SkillProposal {
        let mut proposal = SkillProposal::new(name, "does a thing", "{}", SideEffectClass::ReadOnly, "[]");
        proposal.status = ProposalStatus::Verified;
        proposal
    }

    #[test]
    fn pascal_case_converts_snake_case() {
        assert_eq!(pascal_case("send_email"), "SendEmail");
        assert_eq!(pascal_case("echo"), "Echo");
    }

    #[test]
    fn promote_succeeds_and_writes_registry_entry() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let proposal = verified_proposal("send_email");
        ledger.insert_proposal(&proposal).unwrap();
        let verification = Verification::new(proposal.id.clone(), true, true, true, true, true);
        ledger.insert_verification(&verification).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        let skill_file = skill_source_path(&skills_root, &proposal.name);
        fs::create_dir_all(skill_file.parent().unwrap()).unwrap();
        fs::write(&skill_file, "// send_email skill\n").unwrap();

        let registry_path = dir.path().join("registry.yaml");
        let request = PromoteRequest {
            proposal_id: &proposal.id,
            skills_root: &skills_root,
            registry_path: &registry_path,
            approved_by: DEFAULT_APPROVED_BY,
        };

        let promotion = promote_skill(&ledger, &request).unwrap();
        assert_eq!(promotion.to_status, ProposalStatus::Trusted);

        let reloaded = ledger.get_proposal(&proposal.id).unwrap();
        assert_eq!(reloaded.status, ProposalStatus::Trusted);

        let entries = sf_registry::load_registry(&registry_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].input_model_ref, "SendEmailInput");
        assert_eq!(entries[0].version, 1);
    }

    #[test]
    fn repromotion_bumps_version() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let proposal = verified_proposal("echo");
        ledger.insert_proposal(&proposal).unwrap();
        let verification = Verification::new(proposal.id.clone(), true, true, true, true, true);
        ledger.insert_verification(&verification).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        let skill_file = skill_source_path(&skills_root, &proposal.name);
        fs::create_dir_all(skill_file.parent().unwrap()).unwrap();
        fs::write(&skill_file, "// v1\n").unwrap();

        let registry_path = dir.path().join("registry.yaml");
        let request = PromoteRequest {
            proposal_id: &proposal.id,
            skills_root: &skills_root,
            registry_path: &registry_path,
            approved_by: DEFAULT_APPROVED_BY,
        };
        promote_skill(&ledger, &request).unwrap();

        fs::write(&skill_file, "// v2\n").unwrap();
        ledger.update_proposal_status(&proposal.id, ProposalStatus::Verified).unwrap();
        promote_skill(&ledger, &request).unwrap();

        let entries = sf_registry::load_registry(&registry_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, 2);
    }

    #[test]
    fn promote_rejects_proposal_not_verified() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let proposal = SkillProposal::new("echo", "does a thing", "{}", SideEffectClass::ReadOnly, "[]");
        ledger.insert_proposal(&proposal).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let request = PromoteRequest {
            proposal_id: &proposal.id,
            skills_root: &dir.path().join("skills"),
            registry_path: &dir.path().join("registry.yaml"),
            approved_by: DEFAULT_APPROVED_BY,
        };

        let err = promote_skill(&ledger, &request).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GateViolation);
    }

    #[test]
    fn promote_rejects_missing_passing_verification() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let proposal = verified_proposal("echo");
        ledger.insert_proposal(&proposal).unwrap();
        let verification = Verification::new(proposal.id.clone(), true, false, true, true, true);
        ledger.insert_verification(&verification).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let request = PromoteRequest {
            proposal_id: &proposal.id,
            skills_root: &dir.path().join("skills"),
            registry_path: &dir.path().join("registry.yaml"),
            approved_by: DEFAULT_APPROVED_BY,
        };

        let err = promote_skill(&ledger, &request).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GateViolation);
    }
}
