#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-artifact
//!
//! Writes content-addressed artifacts to disk and records them in the
//! ledger. Hashing follows a canonicalize-then-hash pattern (hash the
//! exact bytes written, not a re-serialized form), and the write helpers
//! mirror `kavi.artifacts.writer`'s markdown templates.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use sf_core::artifact::{Artifact, ArtifactKind};
use sf_error::{ErrorCode, SfError};
use sf_ledger::LedgerStore;

/// Compute the hex-encoded SHA-256 digest of `content`.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Write `content` to `path` (creating parent directories as needed), hash
/// it, and record an [`Artifact`] row in `ledger`. Returns the stored
/// artifact.
pub fn write_artifact(
    ledger: &LedgerStore,
    content: &str,
    path: &Path,
    kind: ArtifactKind,
    related_id: Option<String>,
) -> Result<Artifact, SfError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SfError::new(ErrorCode::StoreError, format!("create_dir_all failed: {e}"))
                .with_context("path", path.display().to_string())
        })?;
    }
    fs::write(path, content).map_err(|e| {
        SfError::new(ErrorCode::StoreError, format!("write failed: {e}"))
            .with_context("path", path.display().to_string())
    })?;

    let sha256 = content_hash(content);
    let artifact = Artifact::new(kind, path.display().to_string(), sha256, related_id);
    ledger.insert_artifact(&artifact)?;
    Ok(artifact)
}

/// Render and write a `SKILL_SPEC` artifact for a proposal.
pub fn write_skill_spec(
    ledger: &LedgerStore,
    output_dir: &Path,
    name: &str,
    description: &str,
    io_schema_json: &str,
    side_effect_class: &str,
    required_secrets_json: &str,
    proposal_id: &str,
) -> Result<Artifact, SfError> {
    let content = format!(
        "# Skill Specification: {name}\n\n\
         ## Description\n{description}\n\n\
         ## Side Effect Class\n{side_effect_class}\n\n\
         ## Required Secrets\n{required_secrets_json}\n\n\
         ## I/O Schema\n```json\n{io_schema_json}\n```\n"
    );
    let path: PathBuf = output_dir.join(format!("{name}_spec.md"));
    write_artifact(
        ledger,
        &content,
        &path,
        ArtifactKind::SkillSpec,
        Some(proposal_id.to_string()),
    )
}

/// Render and write a `VERIFICATION_REPORT` artifact.
pub fn write_verification_report(
    ledger: &LedgerStore,
    output_dir: &Path,
    content: &str,
    proposal_id: &str,
) -> Result<Artifact, SfError> {
    let path = output_dir.join(format!("verification_{proposal_id}.md"));
    write_artifact(
        ledger,
        content,
        &path,
        ArtifactKind::VerificationReport,
        Some(proposal_id.to_string()),
    )
}

/// Write a `BUILD_PACKET` artifact, keyed by build id.
pub fn write_build_packet(
    ledger: &LedgerStore,
    output_dir: &Path,
    content: &str,
    build_id: &str,
    proposal_id: Option<&str>,
) -> Result<Artifact, SfError> {
    let path = output_dir.join(format!("build_packet_{build_id}.md"));
    write_artifact(
        ledger,
        content,
        &path,
        ArtifactKind::BuildPacket,
        proposal_id.map(str::to_string),
    )
}

/// Write a `BUILD_LOG` artifact capturing a build attempt's stdout/stderr.
pub fn write_build_log(
    ledger: &LedgerStore,
    output_dir: &Path,
    content: &str,
    build_id: &str,
) -> Result<Artifact, SfError> {
    let path = output_dir.join(format!("build_log_{build_id}.log"));
    write_artifact(
        ledger,
        content,
        &path,
        ArtifactKind::BuildLog,
        Some(build_id.to_string()),
    )
}

/// Write a `RESEARCH_NOTE` artifact produced by a failure analysis.
pub fn write_research_note(
    ledger: &LedgerStore,
    output_dir: &Path,
    content: &str,
    build_id: &str,
) -> Result<Artifact, SfError> {
    let path = output_dir.join(format!("research_{build_id}.md"));
    write_artifact(
        ledger,
        content,
        &path,
        ArtifactKind::ResearchNote,
        Some(build_id.to_string()),
    )
}

/// Write a free-form `NOTE` artifact (Obsidian-compatible frontmatter).
pub fn write_note(
    ledger: &LedgerStore,
    path: &Path,
    title: &str,
    body: &str,
    related_id: Option<String>,
) -> Result<Artifact, SfError> {
    let content = format!("---\ntitle: {title}\n---\n\n{body}\n");
    write_artifact(ledger, &content, path, ArtifactKind::Note, related_id)
}

/// Verify that the file at `path` still hashes to `expected_sha256`.
///
/// Used by the trust-loading path in `sf-registry` to detect artifact
/// drift between what the ledger recorded and what is actually on disk.
pub fn verify_on_disk(path: &Path, expected_sha256: &str) -> Result<bool, SfError> {
    let content = fs::read_to_string(path).map_err(|e| {
        SfError::new(ErrorCode::TrustError, format!("read failed: {e}"))
            .with_context("path", path.display().to_string())
    })?;
    Ok(content_hash(&content) == expected_sha256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_64_hex_chars() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_content_hashes_identically() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }

    #[test]
    fn write_artifact_records_matching_hash() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::open_in_memory().unwrap();
        let path = dir.path().join("note.md");
        let artifact =
            write_artifact(&ledger, "hello world", &path, ArtifactKind::Note, None).unwrap();
        assert_eq!(artifact.sha256, content_hash("hello world"));
        assert!(verify_on_disk(&path, &artifact.sha256).unwrap());
    }

    #[test]
    fn verify_on_disk_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::open_in_memory().unwrap();
        let path = dir.path().join("note.md");
        let artifact =
            write_artifact(&ledger, "original", &path, ArtifactKind::Note, None).unwrap();
        fs::write(&path, "tampered").unwrap();
        assert!(!verify_on_disk(&path, &artifact.sha256).unwrap());
    }

    #[test]
    fn write_skill_spec_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("out");
        let ledger = LedgerStore::open_in_memory().unwrap();
        let artifact = write_skill_spec(
            &ledger, &nested, "echo", "echoes", "{}", "READ_ONLY", "[]", "prop1",
        )
        .unwrap();
        assert!(Path::new(&artifact.path).exists());
    }
}
