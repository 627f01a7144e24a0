#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-error
//!
//! The unified error taxonomy every skill-forge crate funnels into. A
//! fallible operation never returns `rusqlite::Error`, `syn::Error`, or any
//! other library-native error type directly — it is wrapped into an
//! [`SfError`] variant carrying a stable [`ErrorCode`] and free-form
//! diagnostic context.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Broad grouping of [`ErrorCode`]s by failure domain, for callers that
/// want to branch on category without matching every individual code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Requested entity does not exist in the ledger or registry.
    Lookup,
    /// Trust/hash verification failed at load time.
    Trust,
    /// Input failed schema or shape validation.
    Validation,
    /// A skill or chain step raised during execution.
    Execution,
    /// A governance gate (diff allow-list, invariant, policy) rejected a change.
    Gate,
    /// An external process exceeded its time budget.
    Timeout,
    /// The ledger store could not complete an operation.
    Store,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lookup => "lookup",
            Self::Trust => "trust",
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Gate => "gate",
            Self::Timeout => "timeout",
            Self::Store => "store",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Stable, machine-readable error code. One per [`SfError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Requested proposal/build/verification/skill id not found.
    NotFound,
    /// Hash verification failed (missing, empty, or mismatched) at load.
    TrustError,
    /// Input did not conform to the declared schema.
    ValidationError,
    /// A skill's `execute` returned an error or panicked.
    ExecutionError,
    /// Sandbox diff fell outside the allow-list (including empty changeset).
    GateViolation,
    /// An external tool or build step exceeded its timeout.
    Timeout,
    /// The policy scanner found a forbidden construct.
    PolicyViolation,
    /// The invariant checker found a structural, scope, or safety violation.
    InvariantViolation,
    /// A chain step's resolved input failed the next step's schema gate.
    SchemaGate,
    /// A dotted-path field mapping could not be resolved.
    MappingError,
    /// The ledger store failed to read or write.
    StoreError,
    /// A loaded skill's source hash no longer matches what a replay recorded.
    SourceDrift,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound => ErrorCategory::Lookup,
            Self::TrustError | Self::SourceDrift => ErrorCategory::Trust,
            Self::ValidationError | Self::SchemaGate | Self::MappingError => {
                ErrorCategory::Validation
            }
            Self::ExecutionError => ErrorCategory::Execution,
            Self::GateViolation | Self::PolicyViolation | Self::InvariantViolation => {
                ErrorCategory::Gate
            }
            Self::Timeout => ErrorCategory::Timeout,
            Self::StoreError => ErrorCategory::Store,
        }
    }

    /// Stable `&'static str` representation (e.g. `"TRUST_ERROR"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::TrustError => "TRUST_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::GateViolation => "GATE_VIOLATION",
            Self::Timeout => "TIMEOUT",
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::InvariantViolation => "INVARIANT_VIOLATION",
            Self::SchemaGate => "SCHEMA_GATE",
            Self::MappingError => "MAPPING_ERROR",
            Self::StoreError => "STORE_ERROR",
            Self::SourceDrift => "SOURCE_DRIFT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arbitrary structured diagnostic context attached to an [`SfError`].
pub type ErrorContext = BTreeMap<String, serde_json::Value>;

/// Unified skill-forge error.
///
/// Every public fallible function in the workspace returns
/// `Result<T, SfError>`. The two execution-surface exceptions —
/// `sf_consumer::consume_skill` and `sf_chain::consume_chain` — never
/// return `Result` at all; in-band failures there become data on the
/// `ExecutionRecord`/`FailureAnalysis` rather than a propagated `SfError`.
#[derive(Debug, thiserror::Error)]
pub enum SfError {
    /// Requested entity not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// Trust/hash verification failed.
    #[error("trust check failed: {message}")]
    TrustError {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// Validation failure.
    #[error("validation failed: {message}")]
    ValidationError {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// A skill or chain step failed during execution.
    #[error("execution failed: {message}")]
    ExecutionError {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// A governance gate rejected the change.
    #[error("gate violation: {message}")]
    GateViolation {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// An external process exceeded its time budget.
    #[error("timed out: {message}")]
    Timeout {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// Policy scanner found a violation.
    #[error("policy violation: {message}")]
    PolicyViolation {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// Invariant checker found a violation.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// Chain step schema gate rejected the resolved input.
    #[error("schema gate failed: {message}")]
    SchemaGate {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// Dotted-path field mapping failed to resolve.
    #[error("mapping error: {message}")]
    MappingError {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// Ledger store operation failed.
    #[error("store error: {message}")]
    StoreError {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
    /// A loaded skill's source hash diverged from a recorded replay.
    #[error("source drift: {message}")]
    SourceDrift {
        /// Human-readable description.
        message: String,
        /// Structured context.
        context: ErrorContext,
    },
}

impl SfError {
    /// Construct a variant by [`ErrorCode`] with an empty context.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let context = ErrorContext::new();
        match code {
            ErrorCode::NotFound => Self::NotFound { message, context },
            ErrorCode::TrustError => Self::TrustError { message, context },
            ErrorCode::ValidationError => Self::ValidationError { message, context },
            ErrorCode::ExecutionError => Self::ExecutionError { message, context },
            ErrorCode::GateViolation => Self::GateViolation { message, context },
            ErrorCode::Timeout => Self::Timeout { message, context },
            ErrorCode::PolicyViolation => Self::PolicyViolation { message, context },
            ErrorCode::InvariantViolation => Self::InvariantViolation { message, context },
            ErrorCode::SchemaGate => Self::SchemaGate { message, context },
            ErrorCode::MappingError => Self::MappingError { message, context },
            ErrorCode::StoreError => Self::StoreError { message, context },
            ErrorCode::SourceDrift => Self::SourceDrift { message, context },
        }
    }

    /// Attach a key-value pair to the diagnostic context, converting `value`
    /// via [`serde_json::to_value`]. Silently skipped on serialization failure.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context_mut().insert(key.into(), v);
        }
        self
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::NotFound { context, .. }
            | Self::TrustError { context, .. }
            | Self::ValidationError { context, .. }
            | Self::ExecutionError { context, .. }
            | Self::GateViolation { context, .. }
            | Self::Timeout { context, .. }
            | Self::PolicyViolation { context, .. }
            | Self::InvariantViolation { context, .. }
            | Self::SchemaGate { context, .. }
            | Self::MappingError { context, .. }
            | Self::StoreError { context, .. }
            | Self::SourceDrift { context, .. } => context,
        }
    }

    /// The stable [`ErrorCode`] for this variant.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::TrustError { .. } => ErrorCode::TrustError,
            Self::ValidationError { .. } => ErrorCode::ValidationError,
            Self::ExecutionError { .. } => ErrorCode::ExecutionError,
            Self::GateViolation { .. } => ErrorCode::GateViolation,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::PolicyViolation { .. } => ErrorCode::PolicyViolation,
            Self::InvariantViolation { .. } => ErrorCode::InvariantViolation,
            Self::SchemaGate { .. } => ErrorCode::SchemaGate,
            Self::MappingError { .. } => ErrorCode::MappingError,
            Self::StoreError { .. } => ErrorCode::StoreError,
            Self::SourceDrift { .. } => ErrorCode::SourceDrift,
        }
    }

    /// Shorthand for `self.code().category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Structured diagnostic context attached to this error.
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::NotFound { context, .. }
            | Self::TrustError { context, .. }
            | Self::ValidationError { context, .. }
            | Self::ExecutionError { context, .. }
            | Self::GateViolation { context, .. }
            | Self::Timeout { context, .. }
            | Self::PolicyViolation { context, .. }
            | Self::InvariantViolation { context, .. }
            | Self::SchemaGate { context, .. }
            | Self::MappingError { context, .. }
            | Self::StoreError { context, .. }
            | Self::SourceDrift { context, .. } => context,
        }
    }
}

impl From<rusqlite::Error> for SfError {
    fn from(e: rusqlite::Error) -> Self {
        SfError::new(ErrorCode::StoreError, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_maps_to_expected_category() {
        assert_eq!(ErrorCode::NotFound.category(), ErrorCategory::Lookup);
        assert_eq!(ErrorCode::TrustError.category(), ErrorCategory::Trust);
        assert_eq!(ErrorCode::SourceDrift.category(), ErrorCategory::Trust);
        assert_eq!(ErrorCode::GateViolation.category(), ErrorCategory::Gate);
        assert_eq!(ErrorCode::StoreError.category(), ErrorCategory::Store);
    }

    #[test]
    fn new_then_code_roundtrips() {
        let err = SfError::new(ErrorCode::TrustError, "missing hash");
        assert_eq!(err.code(), ErrorCode::TrustError);
        assert!(err.to_string().contains("missing hash"));
    }

    #[test]
    fn with_context_attaches_value() {
        let err = SfError::new(ErrorCode::NotFound, "no such proposal")
            .with_context("proposal_id", "abc123");
        assert_eq!(
            err.context().get("proposal_id").unwrap(),
            &serde_json::json!("abc123")
        );
    }

    #[test]
    fn error_code_as_str_is_screaming_snake() {
        assert_eq!(ErrorCode::SchemaGate.as_str(), "SCHEMA_GATE");
        assert_eq!(ErrorCode::MappingError.as_str(), "MAPPING_ERROR");
    }
}
