//! Trusted execution records — the immutable output of `consume`/`consume_chain`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proposal::SideEffectClass;

/// One execution of a trusted skill, whether standalone or as a chain step.
///
/// Immutable once appended to the execution log. Never constructed from a
/// raised exception/panic: every failure path (trust, validation,
/// execution, schema-gate, mapping) produces a record with `success: false`
/// and a populated `error`, not a propagated [`sf_error::SfError`][serr].
///
/// [serr]: https://docs.rs/sf-error
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionRecord {
    /// Full hyphenated UUID (unlike every other entity's 12-hex-char id).
    pub execution_id: String,
    /// The execution this one chains from, if any.
    pub parent_execution_id: Option<String>,
    /// Name of the skill invoked.
    pub skill_name: String,
    /// The registry's `hash` for this skill at the moment execution started.
    pub source_hash: String,
    /// The skill's declared effect class.
    pub effect_class: SideEffectClass,
    /// The raw input map passed to the skill.
    pub input_json: Value,
    /// The skill's output map, if execution succeeded.
    pub output_json: Option<Value>,
    /// Whether execution succeeded.
    pub success: bool,
    /// `"<ErrorKind>: <message>"` if execution failed.
    pub error: Option<String>,
    /// RFC3339 start timestamp.
    pub started_at: String,
    /// RFC3339 completion timestamp.
    pub finished_at: String,
}

impl ExecutionRecord {
    /// Elapsed wall-clock duration in milliseconds, derived from the two
    /// RFC3339 timestamps. Returns `0` if either fails to parse (never
    /// panics — timestamps here are produced by this crate's own clock,
    /// but the record may have been deserialized from an untrusted log line).
    pub fn duration_ms(&self) -> i64 {
        let start = chrono::DateTime::parse_from_rfc3339(&self.started_at);
        let end = chrono::DateTime::parse_from_rfc3339(&self.finished_at);
        match (start, end) {
            (Ok(s), Ok(e)) => (e - s).num_milliseconds().max(0),
            _ => 0,
        }
    }
}
