#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-policy
//!
//! Static analysis of proposed skill source ahead of promotion: forbidden
//! imports, forbidden dynamic-exec calls, and secret-leak-via-logging
//! patterns. Walks `syn`'s parsed AST rather than scanning text, the same
//! shape as the original system's `ast.NodeVisitor`-based scanner, adapted
//! to the module-per-skill rendering where a "skill" is a `.rs` file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Expr, ItemUse, Macro, UseTree};

use sf_error::{ErrorCode, SfError};

/// A single policy rule violation found in a scanned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    /// Path of the file the violation was found in.
    pub file: String,
    /// 1-indexed source line.
    pub line: usize,
    /// Name of the rule that fired.
    pub rule: String,
    /// Human-readable detail.
    pub detail: String,
}

/// The outcome of scanning one or more files.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Every violation found, in scan order.
    pub violations: Vec<PolicyViolation>,
    /// Count of files scanned.
    pub files_scanned: usize,
}

impl ScanResult {
    /// `true` iff no violations were found.
    pub fn ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A policy configuration, loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    /// Module path prefixes that may not be imported.
    #[serde(default)]
    pub forbidden_imports: Vec<String>,
    /// Whether outbound network access is permitted at all.
    #[serde(default)]
    pub allowed_network: bool,
    /// Path prefixes a skill is allowed to write under.
    #[serde(default)]
    pub allowed_write_paths: Vec<String>,
    /// Whether calls to `eval`/`exec`/`compile`-named functions are forbidden.
    #[serde(default = "default_true")]
    pub forbid_dynamic_exec: bool,
}

fn default_true() -> bool {
    true
}

impl Policy {
    /// Load a policy from a YAML file.
    pub fn from_yaml(path: &Path) -> Result<Self, SfError> {
        let text = fs::read_to_string(path).map_err(|e| {
            SfError::new(ErrorCode::StoreError, format!("read policy file failed: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        serde_yaml::from_str(&text).map_err(|e| {
            SfError::new(ErrorCode::ValidationError, format!("invalid policy yaml: {e}"))
        })
    }
}

/// Bare-name forbidden calls, matched against the last path segment alone.
const FORBIDDEN_CALL_NAMES: &[&str] = &["eval"];
/// Qualified forbidden calls, matched as (second-to-last segment, last segment)
/// so a call resolves regardless of how many path segments precede it —
/// `Command::new(..)` and `std::process::Command::new(..)` both match.
const FORBIDDEN_QUALIFIED_CALLS: &[(&str, &str)] =
    &[("Command", "new"), ("Library", "new"), ("Library", "open")];
const ENV_READ_MARKERS: &[&str] = &["env . var", "env . var_os", "getenv"];
const LOGGING_MACRO_NAMES: &[&str] = &[
    "println", "print", "eprintln", "eprint", "info", "warn", "error", "debug", "trace",
];

struct ViolationVisitor<'p> {
    policy: &'p Policy,
    filename: String,
    violations: Vec<PolicyViolation>,
}

impl<'p> ViolationVisitor<'p> {
    fn new(policy: &'p Policy, filename: String) -> Self {
        Self {
            policy,
            filename,
            violations: Vec::new(),
        }
    }

    fn push(&mut self, line: usize, rule: &str, detail: String) {
        self.violations.push(PolicyViolation {
            file: self.filename.clone(),
            line,
            rule: rule.to_string(),
            detail,
        });
    }

    fn check_use_tree(&mut self, tree: &UseTree, prefix: &str, line: usize) {
        match tree {
            UseTree::Path(p) => {
                let joined = if prefix.is_empty() {
                    p.ident.to_string()
                } else {
                    format!("{prefix}::{}", p.ident)
                };
                self.check_import_path(&joined, line);
                self.check_use_tree(&p.tree, &joined, line);
            }
            UseTree::Name(n) => {
                let joined = if prefix.is_empty() {
                    n.ident.to_string()
                } else {
                    format!("{prefix}::{}", n.ident)
                };
                self.check_import_path(&joined, line);
            }
            UseTree::Rename(r) => {
                let joined = if prefix.is_empty() {
                    r.ident.to_string()
                } else {
                    format!("{prefix}::{}", r.ident)
                };
                self.check_import_path(&joined, line);
            }
            UseTree::Glob(_) => {
                if !prefix.is_empty() {
                    self.check_import_path(prefix, line);
                }
            }
            UseTree::Group(g) => {
                for item in &g.items {
                    self.check_use_tree(item, prefix, line);
                }
            }
        }
    }

    fn check_import_path(&mut self, module_name: &str, line: usize) {
        for forbidden in &self.policy.forbidden_imports {
            if module_name == forbidden || module_name.starts_with(&format!("{forbidden}::")) {
                self.push(
                    line,
                    "forbidden_import",
                    format!("use of '{module_name}' is forbidden"),
                );
            }
        }
    }
}

impl<'ast, 'p> Visit<'ast> for ViolationVisitor<'p> {
    fn visit_item_use(&mut self, node: &'ast ItemUse) {
        let line = node.span().start().line;
        self.check_use_tree(&node.tree, "", line);
        visit::visit_item_use(self, node);
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if self.policy.forbid_dynamic_exec {
            if let Expr::Path(p) = node.func.as_ref() {
                let segments: Vec<String> = p.path.segments.iter().map(|s| s.ident.to_string()).collect();
                let last = segments.last().map(String::as_str);
                let second_to_last = segments.len().checked_sub(2).map(|i| segments[i].as_str());

                if let Some(name) = last {
                    if FORBIDDEN_CALL_NAMES.contains(&name) {
                        let line = node.span().start().line;
                        self.push(
                            line,
                            "forbid_dynamic_exec",
                            format!("call to {name}() is forbidden"),
                        );
                    }
                }

                if let (Some(prefix), Some(name)) = (second_to_last, last) {
                    if FORBIDDEN_QUALIFIED_CALLS.contains(&(prefix, name)) {
                        let line = node.span().start().line;
                        self.push(
                            line,
                            "forbid_dynamic_exec",
                            format!("call to {prefix}::{name}(..) is forbidden"),
                        );
                    }
                }
            }
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_macro(&mut self, node: &'ast Macro) {
        let Some(macro_name) = node.path.get_ident().map(|i| i.to_string()) else {
            visit::visit_macro(self, node);
            return;
        };
        if LOGGING_MACRO_NAMES.contains(&macro_name.as_str()) {
            let tokens = node.tokens.to_string();
            if ENV_READ_MARKERS.iter().any(|m| tokens.contains(m)) {
                let line = node.span().start().line;
                self.push(
                    line,
                    "secret_leak",
                    format!("{macro_name}!(...) argument reads an environment variable directly"),
                );
            }
        }
        visit::visit_macro(self, node);
    }
}

/// Scan a single Rust source file against `policy`.
pub fn scan_file(path: &Path, policy: &Policy) -> Result<Vec<PolicyViolation>, SfError> {
    let source = fs::read_to_string(path).map_err(|e| {
        SfError::new(ErrorCode::StoreError, format!("read failed: {e}"))
            .with_context("path", path.display().to_string())
    })?;
    let filename = path.display().to_string();

    let parsed = match syn::parse_file(&source) {
        Ok(f) => f,
        Err(e) => {
            return Ok(vec![PolicyViolation {
                file: filename,
                line: e.span().start().line,
                rule: "syntax_error".to_string(),
                detail: format!("cannot parse: {e}"),
            }]);
        }
    };

    let mut visitor = ViolationVisitor::new(policy, filename);
    visitor.visit_file(&parsed);
    Ok(visitor.violations)
}

/// Scan every `.rs` file under `directory` against `policy`, sorted by path.
pub fn scan_directory(directory: &Path, policy: &Policy) -> Result<ScanResult, SfError> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(directory)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();

    let mut result = ScanResult::default();
    for file in &files {
        result.files_scanned += 1;
        result.violations.extend(scan_file(file, policy)?);
    }
    Ok(result)
}

/// Render a [`ScanResult`] as a markdown report.
pub fn format_report(result: &ScanResult) -> String {
    let mut lines = vec!["# Policy Scan Report\n".to_string()];
    lines.push(format!("Files scanned: {}", result.files_scanned));
    lines.push(format!("Violations found: {}", result.violations.len()));
    lines.push(format!(
        "Status: {}\n",
        if result.ok() { "PASSED" } else { "FAILED" }
    ));

    if !result.violations.is_empty() {
        lines.push("## Violations\n".to_string());
        for v in &result.violations {
            lines.push(format!("- **{}:{}** [{}] {}", v.file, v.line, v.rule, v.detail));
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn policy() -> Policy {
        Policy {
            forbidden_imports: vec!["std::process".to_string(), "std::net".to_string()],
            allowed_network: false,
            allowed_write_paths: vec![],
            forbid_dynamic_exec: true,
        }
    }

    fn write_source(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn clean_source_has_no_violations() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "a.rs", "fn add(a: i32, b: i32) -> i32 { a + b }");
        let violations = scan_file(&path, &policy()).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn forbidden_import_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "a.rs", "use std::process::Command;\nfn f() {}");
        let violations = scan_file(&path, &policy()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "forbidden_import");
    }

    #[test]
    fn forbidden_import_prefix_match_does_not_overreach() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "a.rs", "use std::processing::Thing;\nfn f() {}");
        let violations = scan_file(&path, &policy()).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn dynamic_exec_call_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "a.rs", "fn f() { eval(x); }");
        let violations = scan_file(&path, &policy()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "forbid_dynamic_exec");
    }

    #[test]
    fn qualified_process_spawn_call_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            dir.path(),
            "a.rs",
            "fn f() { let _ = std::process::Command::new(\"sh\"); }",
        );
        let violations = scan_file(&path, &policy()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "forbid_dynamic_exec");
    }

    #[test]
    fn qualified_dynamic_library_load_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            dir.path(),
            "a.rs",
            "fn f() { let _ = unsafe { libloading::Library::new(\"libfoo.so\") }; }",
        );
        let violations = scan_file(&path, &policy()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "forbid_dynamic_exec");
    }

    #[test]
    fn secret_leak_via_logging_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            dir.path(),
            "a.rs",
            "fn f() { println!(\"{}\", std::env::var(\"API_KEY\").unwrap()); }",
        );
        let violations = scan_file(&path, &policy()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "secret_leak");
    }

    #[test]
    fn syntax_error_is_reported_as_violation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "a.rs", "fn f( {{{ not rust");
        let violations = scan_file(&path, &policy()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "syntax_error");
    }

    #[test]
    fn scan_directory_counts_files_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path(), "b.rs", "fn ok() {}");
        write_source(dir.path(), "a.rs", "use std::net::TcpStream;\nfn f() {}");
        let result = scan_directory(dir.path(), &policy()).unwrap();
        assert_eq!(result.files_scanned, 2);
        assert_eq!(result.violations.len(), 1);
        assert!(!result.ok());
    }

    #[test]
    fn format_report_includes_pass_fail_status() {
        let result = ScanResult {
            violations: vec![],
            files_scanned: 3,
        };
        let report = format_report(&result);
        assert!(report.contains("PASSED"));
        assert!(report.contains("Files scanned: 3"));
    }
}
