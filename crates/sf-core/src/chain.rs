//! Deterministic chain specification: steps, field mappings, options.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single `to_field ← from_path` mapping used to build a chain step's
/// resolved input from a prior step's output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldMapping {
    /// The key to set in the resolved input map.
    pub to_field: String,
    /// Dotted path into the source step's output (`a.b.0.c`); integer
    /// components index sequences, any other component is a string key.
    pub from_path: String,
    /// The step index this mapping reads from. Defaults to `i - 1` (the
    /// immediately preceding step) when absent.
    pub from_step_index: Option<usize>,
}

/// A single step in a [`ChainSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChainStep {
    /// Name of the skill to invoke, as registered in `sf-registry`.
    pub skill_name: String,
    /// A fully-specified input map. Mutually exclusive with
    /// `input_template`/`mappings` — when present, used as-is.
    pub input: Option<BTreeMap<String, Value>>,
    /// Base input map, overlaid with resolved `mappings`. Used only when
    /// `input` is absent.
    pub input_template: Option<BTreeMap<String, Value>>,
    /// Field mappings resolved against a prior step's output and merged
    /// into `input_template`.
    pub mappings: Vec<FieldMapping>,
    /// Explicit parent step index for lineage. Defaults to `i - 1`.
    pub parent_index: Option<usize>,
}

/// Chain-level execution options.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ChainOptions {
    /// Halt the chain on the first failed step.
    pub stop_on_failure: bool,
}

/// A deterministic, ordered composition of skill invocations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChainSpec {
    /// Steps, executed sequentially in index order.
    pub steps: Vec<ChainStep>,
    /// Chain-level options.
    pub options: ChainOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_spec_roundtrips_through_json() {
        let spec = ChainSpec {
            steps: vec![
                ChainStep {
                    skill_name: "search".into(),
                    input: Some(BTreeMap::from([("query".into(), Value::from("ml"))])),
                    input_template: None,
                    mappings: vec![],
                    parent_index: None,
                },
                ChainStep {
                    skill_name: "summarize".into(),
                    input: None,
                    input_template: Some(BTreeMap::from([("style".into(), Value::from("bullet"))])),
                    mappings: vec![FieldMapping {
                        to_field: "path".into(),
                        from_path: "results.0.path".into(),
                        from_step_index: None,
                    }],
                    parent_index: None,
                },
            ],
            options: ChainOptions {
                stop_on_failure: true,
            },
        };

        let json = serde_json::to_string(&spec).unwrap();
        let back: ChainSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.steps.len(), 2);
        assert_eq!(back.steps[1].mappings[0].from_path, "results.0.path");
        assert!(back.options.stop_on_failure);
    }
}
