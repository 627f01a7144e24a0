#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-session
//!
//! Reconstructs a human-readable execution session from the append-only
//! JSONL log, and replays a past execution safely: re-verify trust,
//! detect source drift, re-run with identical input, link the new record
//! to the original. Never touches `sf-ledger`, `sf-policy`, or
//! `sf-invariant` — this crate only ever reads the execution log and the
//! registry, matching the original's "does NOT import from forge, ledger,
//! or policies" boundary.
//!
//! Grounded on `kavi.consumer.session` and `kavi.consumer.replay`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use sf_core::ExecutionRecord;
use sf_error::{ErrorCode, SfError};
use sf_execlog::{read_execution_log, ReadFilters};
use sf_registry::{load_registry, load_skill, SkillResolver};

fn load_all_records(log_path: &Path) -> Result<Vec<ExecutionRecord>, SfError> {
    read_execution_log(log_path, usize::MAX, &ReadFilters::default())
}

/// Build the full session containing `execution_id`: walk backward to the
/// furthest known ancestor, then collect every forward-reachable
/// descendant, returned in `started_at` order.
pub fn build_session(log_path: &Path, execution_id: &str) -> Result<Vec<ExecutionRecord>, SfError> {
    let all_records = load_all_records(log_path)?;
    if all_records.is_empty() {
        return Err(SfError::new(
            ErrorCode::NotFound,
            format!("no execution records found in {}", log_path.display()),
        ));
    }

    let by_id: HashMap<&str, &ExecutionRecord> =
        all_records.iter().map(|r| (r.execution_id.as_str(), r)).collect();

    if !by_id.contains_key(execution_id) {
        return Err(SfError::new(
            ErrorCode::NotFound,
            format!("execution id not found: {execution_id}"),
        ));
    }

    let mut root_id = execution_id.to_string();
    loop {
        let Some(parent_id) = by_id.get(root_id.as_str()).unwrap().parent_execution_id.clone() else {
            break;
        };
        if !by_id.contains_key(parent_id.as_str()) {
            break;
        }
        root_id = parent_id;
    }

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for rec in &all_records {
        if let Some(parent) = &rec.parent_execution_id {
            children.entry(parent.as_str()).or_default().push(rec.execution_id.as_str());
        }
    }

    let mut session_ids = HashSet::new();
    let mut queue = VecDeque::from([root_id]);
    while let Some(current) = queue.pop_front() {
        if session_ids.contains(&current) {
            continue;
        }
        if let Some(kids) = children.get(current.as_str()) {
            for kid in kids {
                queue.push_back(kid.to_string());
            }
        }
        session_ids.insert(current);
    }

    let mut session_records: Vec<ExecutionRecord> = all_records
        .into_iter()
        .filter(|r| session_ids.contains(&r.execution_id))
        .collect();
    session_records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    Ok(session_records)
}

/// Return the most recent record's execution id (the last line in the
/// append-only log), or a [`ErrorCode::NotFound`] error if the log is
/// empty.
pub fn get_latest_execution(log_path: &Path) -> Result<String, SfError> {
    let all_records = load_all_records(log_path)?;
    all_records.last().map(|r| r.execution_id.clone()).ok_or_else(|| {
        SfError::new(
            ErrorCode::NotFound,
            format!("no execution records found in {}", log_path.display()),
        )
    })
}

fn format_duration(record: &ExecutionRecord) -> String {
    let total_ms = record.duration_ms();
    if total_ms < 1000 {
        return format!("{total_ms}ms");
    }
    let total_s = total_ms as f64 / 1000.0;
    if total_s < 60.0 {
        return format!("{total_s:.1}s");
    }
    let minutes = (total_s / 60.0) as i64;
    let seconds = total_s % 60.0;
    format!("{minutes}m{seconds:.0}s")
}

/// Render a session as a compact, two-space-indented tree: skill name,
/// success/failure marker, a shortened execution id, duration, and the
/// first 80 characters of the error on failure.
pub fn render_session_tree(records: &[ExecutionRecord]) -> String {
    if records.is_empty() {
        return "Session: (empty)".to_string();
    }

    let record_ids: HashSet<&str> = records.iter().map(|r| r.execution_id.as_str()).collect();

    let mut children: HashMap<Option<&str>, Vec<&ExecutionRecord>> = HashMap::new();
    for rec in records {
        children.entry(rec.parent_execution_id.as_deref()).or_default().push(rec);
    }
    for kids in children.values_mut() {
        kids.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    }

    let mut lines = vec!["Session:".to_string()];

    fn render_node(
        rec: &ExecutionRecord,
        depth: usize,
        children: &HashMap<Option<&str>, Vec<&ExecutionRecord>>,
        lines: &mut Vec<String>,
    ) {
        let indent = "  ".repeat(depth + 1);
        let marker = if rec.success { "\u{2705}" } else { "\u{274c}" };
        let short_id: String = rec.execution_id.chars().take(12).collect();
        let duration = format_duration(rec);
        let mut line = format!("{indent}{} {marker}  (id={short_id}\u{2026})  [{duration}]", rec.skill_name);
        if !rec.success {
            if let Some(err) = &rec.error {
                let truncated: String = if err.chars().count() > 80 {
                    err.chars().take(77).collect::<String>() + "..."
                } else {
                    err.clone()
                };
                line.push_str("  ");
                line.push_str(&truncated);
            }
        }
        lines.push(line);

        if let Some(kids) = children.get(&Some(rec.execution_id.as_str())) {
            for kid in kids {
                render_node(kid, depth + 1, children, lines);
            }
        }
    }

    let mut roots: Vec<&ExecutionRecord> = records
        .iter()
        .filter(|r| match &r.parent_execution_id {
            None => true,
            Some(parent) => !record_ids.contains(parent.as_str()),
        })
        .collect();
    roots.sort_by(|a, b| a.started_at.cmp(&b.started_at));

    for root in roots {
        render_node(root, 0, &children, &mut lines);
    }

    lines.join("\n")
}

fn find_record(log_path: &Path, execution_id: &str) -> Result<ExecutionRecord, SfError> {
    let all_records = load_all_records(log_path)?;
    all_records
        .into_iter()
        .find(|r| r.execution_id == execution_id)
        .ok_or_else(|| SfError::new(ErrorCode::NotFound, format!("execution id not found: {execution_id}")))
}

fn validate_replayable(
    registry_path: &Path,
    skills_root: &Path,
    original: &ExecutionRecord,
    resolver: &dyn SkillResolver,
) -> Result<(), SfError> {
    let entries = load_registry(registry_path)?;
    let entry = entries
        .into_iter()
        .find(|e| e.name == original.skill_name)
        .ok_or_else(|| {
            SfError::new(
                ErrorCode::NotFound,
                format!("skill '{}' not found in registry, cannot replay", original.skill_name),
            )
        })?;

    if !entry.hash.is_empty() && !original.source_hash.is_empty() && entry.hash != original.source_hash {
        return Err(SfError::new(
            ErrorCode::SourceDrift,
            format!(
                "source hash mismatch for '{}': registry has {}, original execution recorded {}",
                original.skill_name,
                short_hash(&entry.hash),
                short_hash(&original.source_hash)
            ),
        ));
    }

    load_skill(registry_path, skills_root, &original.skill_name, resolver)?;
    Ok(())
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect::<String>() + "\u{2026}"
}

/// Replay a past execution: re-verify trust, detect source drift, and
/// re-execute with the exact same input. Returns `(original, new)`; the
/// original record is never mutated, and `new`'s `parent_execution_id` is
/// set to the original's id.
pub fn replay_execution(
    log_path: &Path,
    registry_path: &Path,
    skills_root: &Path,
    resolver: &dyn SkillResolver,
    execution_id: &str,
) -> Result<(ExecutionRecord, ExecutionRecord), SfError> {
    let original = find_record(log_path, execution_id)?;
    validate_replayable(registry_path, skills_root, &original, resolver)?;

    let mut new_record = sf_consumer::consume_skill(
        registry_path,
        skills_root,
        &original.skill_name,
        resolver,
        original.input_json.clone(),
    );
    new_record.parent_execution_id = Some(original.execution_id.clone());

    Ok((original, new_record))
}
