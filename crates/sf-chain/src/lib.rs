#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-chain
//!
//! Deterministic skill chain executor with schema-validated dot-path input
//! mapping between steps. No LLM planning or auto-mapping — every mapping
//! is explicit in the [`ChainSpec`][sf_core::ChainSpec]. Grounded on
//! `kavi.consumer.chain`: sequential execution, `extract_path` dot-path
//! traversal (dict keys, integer list indices), required/typed schema
//! gating before a step runs, and `stop_on_failure` short-circuiting.
//!
//! Like [`sf_consumer::consume_skill`], [`consume_chain`] never returns a
//! `Result` — every failure becomes a `success: false` record.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};

use sf_core::{ChainSpec, ChainStep, ExecutionRecord, FieldMapping, SideEffectClass};
use sf_registry::{load_registry, load_skill, SkillResolver};

/// Extract a value from `data` following a dotted path.
///
/// `"field"` indexes an object key; `"results.0.path"` indexes object key
/// `results`, then sequence index `0`, then object key `path`. Returns a
/// descriptive error on any failed step, naming the path traversed so far.
pub fn extract_path(data: &Value, dotted_path: &str) -> Result<Value, String> {
    let parts: Vec<&str> = dotted_path.split('.').collect();
    let mut current = data;
    for (i, part) in parts.iter().enumerate() {
        let traversed = parts[..=i].join(".");
        match current {
            Value::Object(map) => {
                current = map
                    .get(*part)
                    .ok_or_else(|| format!("missing key '{part}' at '{traversed}'"))?;
            }
            Value::Array(items) => {
                let idx: usize = part
                    .parse()
                    .map_err(|_| format!("expected integer index at '{traversed}', got '{part}'"))?;
                current = items.get(idx).ok_or_else(|| {
                    format!("index {idx} out of range (length {}) at '{traversed}'", items.len())
                })?;
            }
            other => {
                return Err(format!(
                    "cannot traverse into {} at '{traversed}'",
                    value_kind(other)
                ));
            }
        }
    }
    Ok(current.clone())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load every registered skill's declared input schema, keyed by name.
///
/// Matches the original's all-or-nothing fallback: if any entry fails to
/// load (trust failure, missing resolver binding), schema gating is
/// skipped entirely rather than partially applied — resolved inputs then
/// flow straight to the skill's own `validate_and_run`, which still
/// enforces the schema at execution time.
fn load_skill_schemas(
    registry_path: &Path,
    skills_root: &Path,
    resolver: &dyn SkillResolver,
) -> HashMap<String, Value> {
    let entries = match load_registry(registry_path) {
        Ok(entries) => entries,
        Err(_) => return HashMap::new(),
    };

    let mut schemas = HashMap::new();
    for entry in entries {
        match load_skill(registry_path, skills_root, &entry.name, resolver) {
            Ok(skill) => {
                schemas.insert(entry.name, skill.descriptor().input_schema);
            }
            Err(_) => return HashMap::new(),
        }
    }
    schemas
}

fn resolve_mapping_source(
    mapping: &FieldMapping,
    step_index: usize,
    records: &[ExecutionRecord],
) -> Result<Value, String> {
    let src_idx = match mapping.from_step_index {
        Some(idx) => idx as i64,
        None => step_index as i64 - 1,
    };
    if src_idx < 0 || src_idx as usize >= records.len() {
        return Err(format!(
            "mapping references step {src_idx} but only {} steps have executed",
            records.len()
        ));
    }
    let src_record = &records[src_idx as usize];
    if !src_record.success || src_record.output_json.is_none() {
        return Err(format!(
            "mapping references step {src_idx} ({}) which failed",
            src_record.skill_name
        ));
    }
    extract_path(src_record.output_json.as_ref().unwrap(), &mapping.from_path).map_err(|e| {
        format!(
            "mapping '{}' from step {src_idx} ({}): {e}",
            mapping.from_path, src_record.skill_name
        )
    })
}

fn check_schema(resolved: &Map<String, Value>, skill_name: &str, schema: &Value) -> Result<(), String> {
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let properties = schema.get("properties").and_then(Value::as_object);

    for field in &required {
        let Some(field_name) = field.as_str() else { continue };
        if !resolved.contains_key(field_name) {
            return Err(format!(
                "schema validation failed for '{skill_name}': missing required field '{field_name}'"
            ));
        }
    }

    if let Some(properties) = properties {
        for (field_name, value) in resolved {
            let Some(prop) = properties.get(field_name) else { continue };
            let prop_type = prop.get("type").and_then(Value::as_str);
            match prop_type {
                Some("string") if !value.is_string() => {
                    return Err(format!(
                        "schema validation failed for '{skill_name}': field '{field_name}' expected string, got {}",
                        value_kind(value)
                    ));
                }
                Some("integer") if !value.is_i64() && !value.is_u64() => {
                    return Err(format!(
                        "schema validation failed for '{skill_name}': field '{field_name}' expected integer, got {}",
                        value_kind(value)
                    ));
                }
                _ => {}
            }
        }
    }

    Ok(())
}

/// Resolve the concrete input for `step`, or an error message on failure.
fn resolve_input(
    step: &ChainStep,
    step_index: usize,
    records: &[ExecutionRecord],
    skill_schemas: &HashMap<String, Value>,
) -> Result<Value, String> {
    let mut resolved = if let Some(input) = &step.input {
        input.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>()
    } else if let Some(template) = &step.input_template {
        let mut resolved = template.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>();
        for mapping in &step.mappings {
            let value = resolve_mapping_source(mapping, step_index, records)?;
            resolved.insert(mapping.to_field.clone(), value);
        }
        resolved
    } else {
        Map::new()
    };

    if let Some(schema) = skill_schemas.get(&step.skill_name) {
        check_schema(&resolved, &step.skill_name, schema)?;
    }

    Ok(Value::Object(resolved))
}

fn failure_record(skill_name: &str, input_json: Value, error: String, parent_execution_id: Option<String>) -> ExecutionRecord {
    let now = sf_core::now_rfc3339();
    ExecutionRecord {
        execution_id: uuid::Uuid::new_v4().to_string(),
        parent_execution_id,
        skill_name: skill_name.to_string(),
        source_hash: String::new(),
        effect_class: SideEffectClass::ReadOnly,
        input_json,
        output_json: None,
        success: false,
        error: Some(error),
        started_at: now.clone(),
        finished_at: now,
    }
}

/// Execute `spec`'s steps sequentially, resolving each step's input either
/// directly or from the prior step's output via dot-path mapping.
///
/// Returns one [`ExecutionRecord`] per step attempted. Stops early when
/// `spec.options.stop_on_failure` is set and a step fails (mapping,
/// schema, or execution failure all count).
pub fn consume_chain(
    registry_path: &Path,
    skills_root: &Path,
    resolver: &dyn SkillResolver,
    spec: &ChainSpec,
) -> Vec<ExecutionRecord> {
    let skill_schemas = load_skill_schemas(registry_path, skills_root, resolver);
    let mut records: Vec<ExecutionRecord> = Vec::new();

    for (i, step) in spec.steps.iter().enumerate() {
        let parent_execution_id = match step.parent_index {
            Some(idx) if idx < records.len() => Some(records[idx].execution_id.clone()),
            Some(_) => None,
            None if i > 0 => records.last().map(|r| r.execution_id.clone()),
            None => None,
        };

        let resolved = resolve_input(step, i, &records, &skill_schemas);
        let record = match resolved {
            Err(msg) => failure_record(&step.skill_name, Value::Null, msg, parent_execution_id),
            Ok(input) => {
                let mut record = sf_consumer::consume_skill(
                    registry_path,
                    skills_root,
                    &step.skill_name,
                    resolver,
                    input,
                );
                record.parent_execution_id = parent_execution_id;
                record
            }
        };

        let failed = !record.success;
        records.push(record);
        if failed && spec.options.stop_on_failure {
            break;
        }
    }

    records
}
