//! On-disk registry entries for trusted, loadable skills.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::proposal::SideEffectClass;

/// Deserialize `hash` leniently: a YAML/JSON loader may parse an
/// all-digit or all-hex-digit scalar as a number instead of a string.
/// Coerce it back to its original string form rather than erroring.
fn deserialize_hash<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HashValue {
        String(String),
        Int(i128),
        Float(f64),
    }

    match HashValue::deserialize(deserializer)? {
        HashValue::String(s) => Ok(s),
        HashValue::Int(n) => Ok(n.to_string()),
        HashValue::Float(n) => Ok(n.to_string()),
    }
}

/// A single entry in the trusted-skill registry file.
///
/// `hash` is the SHA-256 of the skill's source file at promotion time.
/// Invariant (enforced by `sf-registry::load_skill`, not by this type):
/// at load time, the hash recomputed from the file on disk must equal
/// `hash`, else the load is refused with a trust error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegistryEntry {
    /// Registry key, also the skill's display name.
    pub name: String,
    /// How to resolve and instantiate the skill's `Skill` implementation
    /// (module path, in this Rust rendering).
    pub module_reference: String,
    /// Human-readable description.
    pub description: String,
    /// Reference to the input type/schema.
    pub input_model_ref: String,
    /// Reference to the output type/schema.
    pub output_model_ref: String,
    /// Declared side-effect class.
    pub effect_class: SideEffectClass,
    /// Names of secrets this skill requires at runtime.
    pub required_secrets: Vec<String>,
    /// Monotonically increasing version, bumped on each promotion.
    pub version: u32,
    /// SHA-256 hex digest of the skill's source file, computed at promotion time.
    #[serde(deserialize_with = "deserialize_hash")]
    pub hash: String,
}
