#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-consumer
//!
//! The runtime interface for downstream systems consuming the trusted
//! skill registry. Does not plan, select, or compose skills — it executes
//! exactly one named skill with validated input and returns an auditable
//! [`ExecutionRecord`][sf_core::ExecutionRecord], never propagating an
//! error or panic out of [`consume_skill`].
//!
//! Grounded on `kavi.consumer.shim.consume_skill`: look up registry
//! metadata, load with trust verification, validate-and-run, capture
//! timing and status. A skill is third-party code, not a trusted author
//! in the same sense the core crates are, so `execute` is additionally
//! wrapped in [`std::panic::catch_unwind`] — the original's broad
//! `except Exception` has no panic analog in Rust, so this is the
//! idiomatic substitute.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use serde_json::Value;

use sf_core::{ExecutionRecord, SideEffectClass};
use sf_error::SfError;
use sf_registry::{load_registry, load_skill, SkillResolver};

/// Execute `skill_name` with `raw_input` and return an auditable record.
///
/// Never returns an `Err`: every failure path (registry lookup, trust
/// verification, schema validation, execution, panic) is captured as a
/// record with `success: false` and a populated `error`.
pub fn consume_skill(
    registry_path: &Path,
    skills_root: &Path,
    skill_name: &str,
    resolver: &dyn SkillResolver,
    raw_input: Value,
) -> ExecutionRecord {
    let started_at = sf_core::now_rfc3339();

    let entries = load_registry(registry_path).unwrap_or_default();
    let entry = entries.into_iter().find(|e| e.name == skill_name);
    let source_hash = entry.as_ref().map(|e| e.hash.clone()).unwrap_or_default();
    let mut effect_class = entry.as_ref().map(|e| e.effect_class);

    let skill = match load_skill(registry_path, skills_root, skill_name, resolver) {
        Ok(skill) => skill,
        Err(e) => {
            return failure_record(
                skill_name,
                source_hash,
                effect_class,
                raw_input,
                format!("{}: {}", e.code().as_str(), e),
                started_at,
            );
        }
    };

    if effect_class.is_none() {
        effect_class = Some(skill.descriptor().effect_class);
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| skill.validate_and_run(raw_input.clone())));

    match outcome {
        Ok(Ok(output)) => ExecutionRecord {
            execution_id: uuid::Uuid::new_v4().to_string(),
            parent_execution_id: None,
            skill_name: skill_name.to_string(),
            source_hash,
            effect_class: effect_class.unwrap_or(SideEffectClass::ReadOnly),
            input_json: raw_input,
            output_json: Some(output),
            success: true,
            error: None,
            started_at,
            finished_at: sf_core::now_rfc3339(),
        },
        Ok(Err(e)) => failure_record(
            skill_name,
            source_hash,
            effect_class,
            raw_input,
            format!("{}: {}", e.code().as_str(), e),
            started_at,
        ),
        Err(panic_payload) => failure_record(
            skill_name,
            source_hash,
            effect_class,
            raw_input,
            format!("PanicError: {}", panic_message(&panic_payload)),
            started_at,
        ),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "skill execution panicked".to_string()
    }
}

fn failure_record(
    skill_name: &str,
    source_hash: String,
    effect_class: Option<SideEffectClass>,
    raw_input: Value,
    error: String,
    started_at: String,
) -> ExecutionRecord {
    ExecutionRecord {
        execution_id: uuid::Uuid::new_v4().to_string(),
        parent_execution_id: None,
        skill_name: skill_name.to_string(),
        source_hash,
        effect_class: effect_class.unwrap_or(SideEffectClass::ReadOnly),
        input_json: raw_input,
        output_json: None,
        success: false,
        error: Some(error),
        started_at,
        finished_at: sf_core::now_rfc3339(),
    }
}

/// Run `consume_skill` and append the resulting record to `writer` before
/// returning it, matching the original consumer CLI's always-log behavior.
pub fn consume_and_log(
    registry_path: &Path,
    skills_root: &Path,
    skill_name: &str,
    resolver: &dyn SkillResolver,
    raw_input: Value,
    writer: &sf_execlog::ExecutionLogWriter,
) -> Result<ExecutionRecord, SfError> {
    let record = consume_skill(registry_path, skills_root, skill_name, resolver, raw_input);
    writer.append(&record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sf_artifact::content_hash;
    use sf_core::RegistryEntry;
    use sf_registry::{save_registry, skill_source_path};
    use sf_skill_api::{Skill, SkillDescriptor};
    use std::sync::Arc;

    struct Echo;

    impl Skill for Echo {
        fn descriptor(&self) -> SkillDescriptor {
            SkillDescriptor {
                name: "echo".into(),
                description: "echoes input".into(),
                input_schema: json!({
                    "type": "object",
                    "required": ["text"],
                    "properties": { "text": { "type": "string" } },
                }),
                output_schema: json!({"type": "object"}),
                effect_class: SideEffectClass::ReadOnly,
            }
        }

        fn execute(&self, input: Value) -> Result<Value, SfError> {
            Ok(input)
        }
    }

    struct PanickingSkill;

    impl Skill for PanickingSkill {
        fn descriptor(&self) -> SkillDescriptor {
            SkillDescriptor {
                name: "boom".into(),
                description: "always panics".into(),
                input_schema: json!({"type": "object"}),
                output_schema: json!({"type": "object"}),
                effect_class: SideEffectClass::ReadOnly,
            }
        }

        fn execute(&self, _input: Value) -> Result<Value, SfError> {
            panic!("simulated skill panic");
        }
    }

    struct StaticResolver;

    impl SkillResolver for StaticResolver {
        fn resolve(&self, module_reference: &str) -> Option<Arc<dyn Skill>> {
            match module_reference {
                "skills::Echo" => Some(Arc::new(Echo)),
                "skills::Boom" => Some(Arc::new(PanickingSkill)),
                _ => None,
            }
        }
    }

    fn setup(name: &str, module_reference: &str) -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        let source_path = skill_source_path(&skills_root, name);
        std::fs::create_dir_all(source_path.parent().unwrap()).unwrap();
        std::fs::write(&source_path, "// skill source\n").unwrap();
        let hash = content_hash("// skill source\n");

        let reg = dir.path().join("registry.yaml");
        save_registry(
            &reg,
            &[RegistryEntry {
                name: name.to_string(),
                module_reference: module_reference.to_string(),
                description: "test".into(),
                input_model_ref: "EchoInput".into(),
                output_model_ref: "EchoOutput".into(),
                effect_class: SideEffectClass::ReadOnly,
                required_secrets: vec![],
                version: 1,
                hash,
            }],
        )
        .unwrap();

        (dir, reg, skills_root)
    }

    #[test]
    fn consume_skill_succeeds_for_valid_input() {
        let (_dir, reg, skills_root) = setup("echo", "skills::Echo");
        let record = consume_skill(&reg, &skills_root, "echo", &StaticResolver, json!({"text": "hi"}));
        assert!(record.success);
        assert_eq!(record.output_json.unwrap()["text"], "hi");
        assert!(record.error.is_none());
    }

    #[test]
    fn consume_skill_captures_validation_failure() {
        let (_dir, reg, skills_root) = setup("echo", "skills::Echo");
        let record = consume_skill(&reg, &skills_root, "echo", &StaticResolver, json!({}));
        assert!(!record.success);
        assert!(record.error.unwrap().contains("ValidationError"));
    }

    #[test]
    fn consume_skill_captures_unknown_skill_as_failure_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let reg = dir.path().join("registry.yaml");
        save_registry(&reg, &[]).unwrap();
        let record = consume_skill(&reg, dir.path(), "nope", &StaticResolver, json!({}));
        assert!(!record.success);
        assert!(record.error.is_some());
    }

    #[test]
    fn consume_skill_captures_panic_as_failure() {
        let (_dir, reg, skills_root) = setup("boom", "skills::Boom");
        let record = consume_skill(&reg, &skills_root, "boom", &StaticResolver, json!({}));
        assert!(!record.success);
        assert!(record.error.unwrap().contains("PanicError"));
    }

    #[test]
    fn consume_and_log_appends_to_writer() {
        let (_dir, reg, skills_root) = setup("echo", "skills::Echo");
        let log_dir = tempfile::tempdir().unwrap();
        let writer = sf_execlog::ExecutionLogWriter::at(log_dir.path().join("exec.jsonl"));

        let record = consume_and_log(
            &reg,
            &skills_root,
            "echo",
            &StaticResolver,
            json!({"text": "hi"}),
            &writer,
        )
        .unwrap();
        assert!(record.success);

        let read_back = sf_execlog::read_execution_log(writer.path(), 10, &Default::default()).unwrap();
        assert_eq!(read_back.len(), 1);
    }
}
