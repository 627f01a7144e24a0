#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-invariant
//!
//! Three governance sub-checks composed into one structural gate, grounded
//! on the original system's `invariants.py`:
//!
//! 1. **Structural conformance** (AST): the skill file defines an `impl
//!    Skill for _` block whose `descriptor()` builds a `SkillDescriptor`
//!    with every required field, and whose declared effect class matches
//!    the proposal's.
//! 2. **Scope containment** (git diff): only the skill's own module and test
//!    paths were touched; anything under a protected path is a violation.
//!    Skipped if the workspace has no git metadata.
//! 3. **Extended safety** (AST): no `transmute` calls, no dynamic library
//!    loading (`Library::new`/`Library::open`), and no `std::env::set_var`
//!    call — the Rust-native analog of the original's
//!    `__import__`/`importlib.import_module` check.

use std::fs;
use std::path::Path;

use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Expr, ExprCall, ExprStruct, ImplItemFn, ItemImpl};

use sf_error::SfError;
use sf_git::git_diff_names;

/// One invariant check failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Which sub-check produced this violation: `"structural"`, `"scope"`, or `"safety"`.
    pub check: &'static str,
    /// Human-readable detail.
    pub message: String,
    /// Source line, when the violation has one.
    pub line: Option<usize>,
}

/// The combined result of all three sub-checks.
#[derive(Debug, Clone)]
pub struct InvariantResult {
    /// `true` iff every sub-check passed.
    pub ok: bool,
    /// Structural conformance result.
    pub structural_ok: bool,
    /// Scope containment result.
    pub scope_ok: bool,
    /// Extended safety result.
    pub safety_ok: bool,
    /// Every violation found, across all sub-checks.
    pub violations: Vec<InvariantViolation>,
}

const REQUIRED_DESCRIPTOR_FIELDS: &[&str] =
    &["name", "description", "input_schema", "output_schema", "effect_class"];

/// Paths no skill proposal may touch, regardless of its own module scope.
const PROTECTED_PATHS: &[&str] = &[
    "crates/sf-sandbox/",
    "crates/sf-ledger/",
    "crates/sf-policy/",
    "crates/sf-invariant/",
    "crates/sf-cli/",
    "Cargo.toml",
];

/// Run all three sub-checks and return the combined verdict.
pub fn check_invariants(
    skill_file: &Path,
    expected_effect_class: &str,
    proposal_name: &str,
    project_root: &Path,
) -> Result<InvariantResult, SfError> {
    let structural_violations = check_structural(skill_file, expected_effect_class)?;
    let scope_violations = check_scope(proposal_name, project_root)?;
    let safety_violations = check_extended_safety(skill_file)?;

    let structural_ok = structural_violations.is_empty();
    let scope_ok = scope_violations.is_empty();
    let safety_ok = safety_violations.is_empty();

    let mut violations = structural_violations;
    violations.extend(scope_violations);
    violations.extend(safety_violations);

    Ok(InvariantResult {
        ok: structural_ok && scope_ok && safety_ok,
        structural_ok,
        scope_ok,
        safety_ok,
        violations,
    })
}

struct DescriptorVisitor {
    found_impl: bool,
    found_descriptor_fn: bool,
    descriptor_fields: Vec<String>,
    effect_class_expr: Option<String>,
    violations: Vec<InvariantViolation>,
}

impl Default for DescriptorVisitor {
    fn default() -> Self {
        Self {
            found_impl: false,
            found_descriptor_fn: false,
            descriptor_fields: Vec::new(),
            effect_class_expr: None,
            violations: Vec::new(),
        }
    }
}

impl<'ast> Visit<'ast> for DescriptorVisitor {
    fn visit_item_impl(&mut self, node: &'ast ItemImpl) {
        let is_skill_impl = node
            .trait_
            .as_ref()
            .map(|(_, path, _)| {
                path.segments
                    .last()
                    .map(|seg| seg.ident == "Skill")
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if is_skill_impl {
            self.found_impl = true;
        }
        visit::visit_item_impl(self, node);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast ImplItemFn) {
        if node.sig.ident == "descriptor" {
            self.found_descriptor_fn = true;
            let mut struct_visitor = DescriptorStructVisitor::default();
            struct_visitor.visit_impl_item_fn(node);
            self.descriptor_fields = struct_visitor.fields;
            self.effect_class_expr = struct_visitor.effect_class_expr;
        }
        visit::visit_impl_item_fn(self, node);
    }
}

#[derive(Default)]
struct DescriptorStructVisitor {
    fields: Vec<String>,
    effect_class_expr: Option<String>,
}

impl<'ast> Visit<'ast> for DescriptorStructVisitor {
    fn visit_expr_struct(&mut self, node: &'ast ExprStruct) {
        let is_descriptor = node
            .path
            .segments
            .last()
            .map(|seg| seg.ident == "SkillDescriptor")
            .unwrap_or(false);
        if is_descriptor {
            for field in &node.fields {
                if let syn::Member::Named(ident) = &field.member {
                    let name = ident.to_string();
                    if name == "effect_class" {
                        self.effect_class_expr = expr_path_tail(&field.expr);
                    }
                    self.fields.push(name);
                }
            }
        }
        visit::visit_expr_struct(self, node);
    }
}

/// Returns the last path segment of a `Foo::Bar`-shaped expression, e.g.
/// `"ReadOnly"` for `EffectClass::ReadOnly`.
fn expr_path_tail(expr: &Expr) -> Option<String> {
    if let Expr::Path(p) = expr {
        p.path.segments.last().map(|seg| seg.ident.to_string())
    } else {
        None
    }
}

fn check_structural(
    skill_file: &Path,
    expected_effect_class: &str,
) -> Result<Vec<InvariantViolation>, SfError> {
    if !skill_file.exists() {
        return Ok(vec![InvariantViolation {
            check: "structural",
            message: format!("skill file not found: {}", skill_file.display()),
            line: None,
        }]);
    }

    let source = fs::read_to_string(skill_file)
        .map_err(|e| sf_error::SfError::new(sf_error::ErrorCode::StoreError, e.to_string()))?;

    let parsed = match syn::parse_file(&source) {
        Ok(f) => f,
        Err(e) => {
            return Ok(vec![InvariantViolation {
                check: "structural",
                message: format!("syntax error: {e}"),
                line: Some(e.span().start().line),
            }]);
        }
    };

    let mut visitor = DescriptorVisitor::default();
    visitor.visit_file(&parsed);

    let mut violations = Vec::new();

    if !visitor.found_impl || !visitor.found_descriptor_fn {
        violations.push(InvariantViolation {
            check: "structural",
            message: "no `impl Skill for _` with a `descriptor()` method found".to_string(),
            line: None,
        });
        return Ok(violations);
    }

    let missing: Vec<&str> = REQUIRED_DESCRIPTOR_FIELDS
        .iter()
        .filter(|f| !visitor.descriptor_fields.iter().any(|got| got == *f))
        .copied()
        .collect();
    if !missing.is_empty() {
        violations.push(InvariantViolation {
            check: "structural",
            message: format!("descriptor() is missing required fields: {}", missing.join(", ")),
            line: None,
        });
    }

    if let Some(variant) = &visitor.effect_class_expr {
        if variant != expected_effect_class {
            violations.push(InvariantViolation {
                check: "structural",
                message: format!(
                    "descriptor() effect_class is '{variant}', expected '{expected_effect_class}'"
                ),
                line: None,
            });
        }
    }

    Ok(violations)
}

fn check_scope(
    proposal_name: &str,
    project_root: &Path,
) -> Result<Vec<InvariantViolation>, SfError> {
    let Ok(changed) = git_diff_names(project_root) else {
        return Ok(Vec::new());
    };
    if changed.is_empty() {
        return Ok(Vec::new());
    }

    let expected_prefix = format!("crates/sf-skills/{proposal_name}");
    let test_prefix = format!("tests/test_skill_{proposal_name}");

    let mut violations = Vec::new();
    for path in &changed {
        if path.starts_with(&expected_prefix) || path.starts_with(&test_prefix) {
            continue;
        }
        if PROTECTED_PATHS.iter().any(|p| path.starts_with(p)) {
            violations.push(InvariantViolation {
                check: "scope",
                message: format!("protected path modified: {path}"),
                line: None,
            });
        }
    }
    Ok(violations)
}

struct SafetyVisitor {
    violations: Vec<InvariantViolation>,
}

impl<'ast> Visit<'ast> for SafetyVisitor {
    fn visit_expr_call(&mut self, node: &'ast ExprCall) {
        if let Expr::Path(p) = node.func.as_ref() {
            let segments: Vec<String> = p.path.segments.iter().map(|s| s.ident.to_string()).collect();
            let last = segments.last().map(String::as_str);

            if last == Some("transmute") {
                self.violations.push(InvariantViolation {
                    check: "safety",
                    message: "transmute() call detected".to_string(),
                    line: Some(node.span().start().line),
                });
            }

            let second_to_last = segments.len().checked_sub(2).map(|i| segments[i].as_str());
            if second_to_last == Some("Library") && matches!(last, Some("new") | Some("open")) {
                self.violations.push(InvariantViolation {
                    check: "safety",
                    message: "dynamic library load via Library::new/open detected".to_string(),
                    line: Some(node.span().start().line),
                });
            }

            if second_to_last == Some("env") && last == Some("set_var") {
                self.violations.push(InvariantViolation {
                    check: "safety",
                    message: "std::env::set_var() call detected".to_string(),
                    line: Some(node.span().start().line),
                });
            }
        }
        visit::visit_expr_call(self, node);
    }
}

fn check_extended_safety(skill_file: &Path) -> Result<Vec<InvariantViolation>, SfError> {
    if !skill_file.exists() {
        return Ok(Vec::new());
    }
    let source = fs::read_to_string(skill_file)
        .map_err(|e| sf_error::SfError::new(sf_error::ErrorCode::StoreError, e.to_string()))?;
    let Ok(parsed) = syn::parse_file(&source) else {
        return Ok(Vec::new());
    };
    let mut visitor = SafetyVisitor {
        violations: Vec::new(),
    };
    visitor.visit_file(&parsed);
    Ok(visitor.violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    const CONFORMING_SKILL: &str = r#"
        struct Echo;
        impl Skill for Echo {
            fn descriptor(&self) -> SkillDescriptor {
                SkillDescriptor {
                    name: "echo".into(),
                    description: "echoes".into(),
                    input_schema: json!({}),
                    output_schema: json!({}),
                    effect_class: EffectClass::ReadOnly,
                }
            }
            fn execute(&self, input: Value) -> Result<Value, SfError> { Ok(input) }
        }
    "#;

    #[test]
    fn conforming_skill_passes_structural_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "echo.rs", CONFORMING_SKILL);
        let violations = check_structural(&path, "ReadOnly").unwrap();
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn mismatched_effect_class_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "echo.rs", CONFORMING_SKILL);
        let violations = check_structural(&path, "Money").unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].check, "structural");
    }

    #[test]
    fn missing_skill_impl_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "echo.rs", "fn f() {}");
        let violations = check_structural(&path, "ReadOnly").unwrap();
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn transmute_call_is_flagged_unsafe() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            dir.path(),
            "echo.rs",
            "fn f(x: u32) -> f32 { unsafe { std::mem::transmute(x) } }",
        );
        let violations = check_extended_safety(&path).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].check, "safety");
    }

    #[test]
    fn missing_skill_file_is_structural_violation() {
        let violations = check_structural(Path::new("/nonexistent/skill.rs"), "ReadOnly").unwrap();
        assert_eq!(violations.len(), 1);
    }
}
