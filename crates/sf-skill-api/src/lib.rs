//! sf-skill-api
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The contract every governed skill implements: a descriptor the
//! structural invariant checker can find, an `execute` entry point, and
//! the centralized effect-class confirmation-policy table every other
//! component (escalation triggers, consumer shim confirmation hooks)
//! consults instead of re-deriving its own classification.

use serde_json::Value;

use sf_error::{ErrorCode, SfError};

/// Re-exported so callers need only depend on this crate for the effect
/// classification, not on `sf-core` directly.
pub use sf_core::SideEffectClass as EffectClass;

/// How a skill's effect class should gate execution by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPolicy {
    /// Runs without prompting.
    AllowedByDefault,
    /// A caller-facing confirmation step is expected before execution.
    RequiresConfirmation,
    /// Refused unless an operator policy explicitly allows it.
    Blocked,
}

/// Extension trait providing the centralized effect-class → confirmation
/// mapping. One authoritative function, consulted everywhere a
/// classification decision is needed — resolves the inconsistency between
/// the original system's two separate allow-lists.
pub trait EffectClassExt {
    /// The default confirmation policy for this effect class.
    fn confirmation_policy(&self) -> ConfirmationPolicy;
}

impl EffectClassExt for EffectClass {
    fn confirmation_policy(&self) -> ConfirmationPolicy {
        match self {
            EffectClass::ReadOnly => ConfirmationPolicy::AllowedByDefault,
            EffectClass::FileWrite | EffectClass::Network => {
                ConfirmationPolicy::RequiresConfirmation
            }
            EffectClass::SecretRead | EffectClass::Money | EffectClass::Messaging => {
                ConfirmationPolicy::RequiresConfirmation
            }
        }
    }
}

/// The five fields the structural invariant checker looks for on a type
/// implementing [`Skill`].
#[derive(Debug, Clone)]
pub struct SkillDescriptor {
    /// Unique skill name, matching its proposal/registry name.
    pub name: String,
    /// Human-readable purpose.
    pub description: String,
    /// JSON Schema for the skill's input.
    pub input_schema: Value,
    /// JSON Schema for the skill's output.
    pub output_schema: Value,
    /// Declared side-effect class.
    pub effect_class: EffectClass,
}

/// A governed, trust-loaded unit of capability.
///
/// Implementations are the Rust-native rendering of the original system's
/// `BaseSkill`: a descriptor plus one `execute` entry point. Schema
/// validation lives in [`Skill::validate_and_run`], which every consumer
/// (`sf-consumer`, `sf-chain`) calls instead of `execute` directly.
pub trait Skill: Send + Sync {
    /// The skill's descriptor: name, description, schemas, effect class.
    fn descriptor(&self) -> SkillDescriptor;

    /// Names of secrets this skill requires at runtime.
    fn required_secrets(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execute with already-validated input. Returns an unvalidated output map.
    fn execute(&self, input: Value) -> Result<Value, SfError>;

    /// Validate `raw_input` against [`SkillDescriptor::input_schema`],
    /// execute, then return the raw output (output validation is the
    /// caller's concern in this rendering — the original system validates
    /// output via the same Pydantic model path, but a `Skill` impl that
    /// builds its own output correctly does not need re-validation here).
    fn validate_and_run(&self, raw_input: Value) -> Result<Value, SfError> {
        let descriptor = self.descriptor();
        validate_against_schema(&descriptor.input_schema, &raw_input)?;
        self.execute(raw_input)
    }
}

/// Validate `value` against `schema`, surfacing a [`SfError::ValidationError`]
/// on the first violation.
pub fn validate_against_schema(schema: &Value, value: &Value) -> Result<(), SfError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        SfError::new(ErrorCode::ValidationError, format!("invalid schema: {e}"))
    })?;

    if let Err(first) = validator.validate(value) {
        return Err(SfError::new(
            ErrorCode::ValidationError,
            format!("input does not satisfy schema: {first}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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
                effect_class: EffectClass::ReadOnly,
            }
        }

        fn execute(&self, input: Value) -> Result<Value, SfError> {
            Ok(input)
        }
    }

    #[test]
    fn read_only_is_allowed_by_default() {
        assert_eq!(
            EffectClass::ReadOnly.confirmation_policy(),
            ConfirmationPolicy::AllowedByDefault
        );
    }

    #[test]
    fn money_and_messaging_require_confirmation() {
        assert_eq!(
            EffectClass::Money.confirmation_policy(),
            ConfirmationPolicy::RequiresConfirmation
        );
        assert_eq!(
            EffectClass::Messaging.confirmation_policy(),
            ConfirmationPolicy::RequiresConfirmation
        );
    }

    #[test]
    fn nothing_is_blocked_by_default() {
        for ec in [
            EffectClass::ReadOnly,
            EffectClass::FileWrite,
            EffectClass::Network,
            EffectClass::SecretRead,
            EffectClass::Money,
            EffectClass::Messaging,
        ] {
            assert_ne!(ec.confirmation_policy(), ConfirmationPolicy::Blocked);
        }
    }

    #[test]
    fn validate_and_run_rejects_missing_required_field() {
        let skill = Echo;
        let err = skill.validate_and_run(json!({})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn validate_and_run_accepts_valid_input() {
        let skill = Echo;
        let out = skill.validate_and_run(json!({"text": "hi"})).unwrap();
        assert_eq!(out["text"], "hi");
    }
}
