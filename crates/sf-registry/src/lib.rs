#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-registry
//!
//! The on-disk manifest of trusted skills (`registry.yaml`) and the
//! hash-gated load path that recomputes a skill's source hash on every
//! call — never cached, matching the original system's
//! `kavi.skills.loader.load_skill` exactly (see `TestTrustEnforcement` in
//! its test suite). Because skills here are compiled Rust, not dynamically
//! imported modules, the "import" step is a caller-supplied
//! [`SkillResolver`] rather than `importlib.import_module` — the only part
//! of the original's loader this rendering cannot carry over verbatim.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use sf_artifact::content_hash;
use sf_core::RegistryEntry;
use sf_error::{ErrorCode, SfError};
use sf_skill_api::Skill;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    skills: Vec<RegistryEntry>,
}

/// Load every entry from the registry file at `path`. Returns an empty
/// list if the file is empty or absent of a `skills` key.
pub fn load_registry(path: &Path) -> Result<Vec<RegistryEntry>, SfError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|e| {
        SfError::new(ErrorCode::StoreError, format!("read registry failed: {e}"))
    })?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: RegistryFile = serde_yaml::from_str(&text).map_err(|e| {
        SfError::new(ErrorCode::StoreError, format!("invalid registry yaml: {e}"))
    })?;
    Ok(file.skills)
}

/// Overwrite the registry file at `path` with `entries`.
pub fn save_registry(path: &Path, entries: &[RegistryEntry]) -> Result<(), SfError> {
    let file = RegistryFile {
        skills: entries.to_vec(),
    };
    let text = serde_yaml::to_string(&file)
        .map_err(|e| SfError::new(ErrorCode::StoreError, format!("serialize registry failed: {e}")))?;
    fs::write(path, text)
        .map_err(|e| SfError::new(ErrorCode::StoreError, format!("write registry failed: {e}")))
}

/// Alias for [`load_registry`], matching the original's separate
/// `list_skills` entry point used by read-only callers.
pub fn list_skills(path: &Path) -> Result<Vec<RegistryEntry>, SfError> {
    load_registry(path)
}

/// Replace any existing entry with this name and append this one.
/// Persists the registry file. Matches promote's "only one TRUSTED
/// entry per name" invariant.
pub fn upsert(path: &Path, entry: RegistryEntry) -> Result<(), SfError> {
    let mut entries = load_registry(path)?;
    entries.retain(|e| e.name != entry.name);
    entries.push(entry);
    save_registry(path, &entries)
}

/// Resolves a [`RegistryEntry::module_reference`] to a live skill instance.
///
/// Stands in for the original system's `importlib.import_module` +
/// `getattr` step: in a compiled-Rust rendering there is no dynamic import,
/// so the binary that owns the skill implementations (typically `sf-cli`)
/// supplies one of these, built from a static name→constructor table.
pub trait SkillResolver: Send + Sync {
    /// Return the live skill behind `module_reference`, or `None` if this
    /// resolver does not recognize it.
    fn resolve(&self, module_reference: &str) -> Option<Arc<dyn Skill>>;
}

/// Conventional on-disk source path for a skill module, used to recompute
/// its trust hash. Mirrors the scope-containment prefix
/// `sf-invariant::check_scope` enforces proposals against.
pub fn skill_source_path(skills_root: &Path, name: &str) -> PathBuf {
    skills_root.join(name).join("src").join("lib.rs")
}

/// Load and resolve a trusted skill by name, recomputing and verifying its
/// source hash on every call. Never caches the hash across calls.
pub fn load_skill(
    registry_path: &Path,
    skills_root: &Path,
    skill_name: &str,
    resolver: &dyn SkillResolver,
) -> Result<Arc<dyn Skill>, SfError> {
    let entries = load_registry(registry_path)?;
    let entry = entries
        .into_iter()
        .find(|e| e.name == skill_name)
        .ok_or_else(|| {
            SfError::new(ErrorCode::NotFound, format!("skill '{skill_name}' not found in registry"))
                .with_context("skill_name", skill_name)
        })?;

    if entry.hash.trim().is_empty() {
        return Err(SfError::new(
            ErrorCode::TrustError,
            format!("skill '{skill_name}' has no hash recorded in registry"),
        )
        .with_context("skill_name", skill_name.to_string()));
    }

    let source_path = skill_source_path(skills_root, skill_name);
    let source = fs::read_to_string(&source_path).map_err(|e| {
        SfError::new(ErrorCode::TrustError, format!("cannot read skill source: {e}"))
            .with_context("path", source_path.display().to_string())
    })?;
    let recomputed = content_hash(&source);

    if recomputed != entry.hash {
        return Err(SfError::new(
            ErrorCode::TrustError,
            format!("skill '{skill_name}' failed trust check: source hash does not match registry"),
        )
        .with_context("skill_name", skill_name.to_string())
        .with_context("expected", entry.hash.clone())
        .with_context("actual", recomputed));
    }

    resolver.resolve(&entry.module_reference).ok_or_else(|| {
        SfError::new(
            ErrorCode::NotFound,
            format!("resolver has no binding for module reference '{}'", entry.module_reference),
        )
        .with_context("module_reference", entry.module_reference.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use sf_core::SideEffectClass;
    use sf_skill_api::SkillDescriptor;

    struct Echo;

    impl Skill for Echo {
        fn descriptor(&self) -> SkillDescriptor {
            SkillDescriptor {
                name: "test_skill".into(),
                description: "test".into(),
                input_schema: json!({"type": "object"}),
                output_schema: json!({"type": "object"}),
                effect_class: SideEffectClass::ReadOnly,
            }
        }

        fn execute(&self, input: Value) -> Result<Value, SfError> {
            Ok(input)
        }
    }

    struct StaticResolver;

    impl SkillResolver for StaticResolver {
        fn resolve(&self, module_reference: &str) -> Option<Arc<dyn Skill>> {
            if module_reference == "tests::Echo" {
                Some(Arc::new(Echo))
            } else {
                None
            }
        }
    }

    fn sample_entry(hash: String) -> RegistryEntry {
        RegistryEntry {
            name: "test_skill".into(),
            module_reference: "tests::Echo".into(),
            description: "A test skill".into(),
            input_model_ref: "EchoInput".into(),
            output_model_ref: "EchoOutput".into(),
            effect_class: SideEffectClass::ReadOnly,
            required_secrets: vec![],
            version: 1,
            hash,
        }
    }

    fn write_skill_source(skills_root: &Path, name: &str, content: &str) -> String {
        let path = skill_source_path(skills_root, name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        content_hash(content)
    }

    #[test]
    fn load_empty_registry_returns_empty_vec() {
        let dir = tempfile::tempdir().unwrap();
        let reg = dir.path().join("registry.yaml");
        fs::write(&reg, "skills: []\n").unwrap();
        assert!(load_registry(&reg).unwrap().is_empty());
    }

    #[test]
    fn all_digit_hash_is_coerced_from_yaml_number_to_string() {
        let dir = tempfile::tempdir().unwrap();
        let reg = dir.path().join("registry.yaml");
        let yaml = "skills:\n\
            - name: test_skill\n\
              module_reference: sf_skills::test_skill::TestSkill\n\
              description: d\n\
              input_model_ref: Input\n\
              output_model_ref: Output\n\
              effect_class: READ_ONLY\n\
              required_secrets: []\n\
              version: 1\n\
              hash: 123456789012345\n";
        fs::write(&reg, yaml).unwrap();
        let loaded = load_registry(&reg).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hash, "123456789012345");
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let reg = dir.path().join("registry.yaml");
        save_registry(&reg, &[sample_entry("abc123".into())]).unwrap();
        let loaded = load_registry(&reg).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "test_skill");
    }

    #[test]
    fn upsert_replaces_existing_entry_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let reg = dir.path().join("registry.yaml");
        upsert(&reg, sample_entry("hash1".into())).unwrap();
        upsert(&reg, sample_entry("hash2".into())).unwrap();
        let loaded = load_registry(&reg).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hash, "hash2");
    }

    #[test]
    fn load_skill_with_valid_hash_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        let hash = write_skill_source(&skills_root, "test_skill", "// echo skill\n");
        let reg = dir.path().join("registry.yaml");
        save_registry(&reg, &[sample_entry(hash)]).unwrap();

        let skill = load_skill(&reg, &skills_root, "test_skill", &StaticResolver).unwrap();
        assert_eq!(skill.descriptor().name, "test_skill");
    }

    #[test]
    fn load_skill_rejects_tampered_hash() {
        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        write_skill_source(&skills_root, "test_skill", "// echo skill\n");
        let reg = dir.path().join("registry.yaml");
        save_registry(&reg, &[sample_entry("deadbeef".repeat(8))]).unwrap();

        let err = load_skill(&reg, &skills_root, "test_skill", &StaticResolver).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TrustError);
        assert!(err.to_string().contains("failed trust check"));
    }

    #[test]
    fn load_skill_rejects_missing_hash() {
        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        write_skill_source(&skills_root, "test_skill", "// echo skill\n");
        let reg = dir.path().join("registry.yaml");
        let mut entry = sample_entry(String::new());
        entry.hash = String::new();
        save_registry(&reg, &[entry]).unwrap();

        let err = load_skill(&reg, &skills_root, "test_skill", &StaticResolver).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TrustError);
        assert!(err.to_string().contains("no hash"));
    }

    #[test]
    fn load_skill_not_found_is_not_found_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = dir.path().join("registry.yaml");
        save_registry(&reg, &[]).unwrap();
        let err =
            load_skill(&reg, dir.path(), "not_real", &StaticResolver).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn hash_is_recomputed_every_call_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        let hash = write_skill_source(&skills_root, "test_skill", "// v1\n");
        let reg = dir.path().join("registry.yaml");
        save_registry(&reg, &[sample_entry(hash)]).unwrap();

        assert!(load_skill(&reg, &skills_root, "test_skill", &StaticResolver).is_ok());

        // Source drifts after promotion without a re-promote: must now fail.
        fs::write(skill_source_path(&skills_root, "test_skill"), "// v2, tampered\n").unwrap();
        let err = load_skill(&reg, &skills_root, "test_skill", &StaticResolver).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TrustError);
    }
}
