#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-sandbox
//!
//! The sandboxed build driver: stage a filtered copy of the workspace,
//! baseline it with git, hand it to an external builder binary bound by a
//! timeout, and gate the resulting diff against a strict allow-list before
//! copying anything back: a staged-copy idiom (`walkdir` + `tempfile` + a
//! baseline commit via `sf-git`) carrying forward a build-packet/attempt
//! lineage. The core is kept synchronous, matching the rest of this
//! workspace; `run_build_async` is a thin `tokio::task::spawn_blocking`
//! wrapper for callers that are already async.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use walkdir::WalkDir;

use sf_artifact::write_build_log;
use sf_core::{Build, BuildStatus, ProposalStatus};
use sf_error::{ErrorCode, SfError};
use sf_ledger::LedgerStore;

/// Filenames excluded from the staged copy regardless of include rules:
/// version control metadata and common secret-bearing files.
const EXCLUDED_NAMES: &[&str] = &[".git", ".env", ".env.local"];

/// Suffixes excluded from the staged copy (private keys, credential bundles).
const EXCLUDED_SUFFIXES: &[&str] = &[".pem", ".key", "credentials.json"];

/// Default builder binary name, looked up on `PATH`.
pub const DEFAULT_BUILDER_BINARY: &str = "skill-builder";

/// Default wall-clock budget for a single builder invocation.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// Inputs to a single sandboxed build attempt.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Root of the real workspace to mirror into the sandbox.
    pub source_root: PathBuf,
    /// Proposal this attempt belongs to.
    pub proposal_id: String,
    /// Proposed skill's name; the allow-listed output paths are derived
    /// from this via the `crates/sf-skills/{name}` convention.
    pub skill_name: String,
    /// Directory artifacts (build packet, build log) are written under.
    pub artifacts_dir: PathBuf,
    /// Builder binary name to invoke on `PATH`.
    pub builder_binary: String,
    /// Wall-clock budget for the builder invocation.
    pub timeout: Duration,
    /// The prior build attempt this one retries, if any.
    pub parent_build: Option<Build>,
}

impl BuildRequest {
    /// Construct a first-attempt build request with default binary/timeout.
    pub fn new(
        source_root: impl Into<PathBuf>,
        proposal_id: impl Into<String>,
        skill_name: impl Into<String>,
        artifacts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            proposal_id: proposal_id.into(),
            skill_name: skill_name.into(),
            artifacts_dir: artifacts_dir.into(),
            builder_binary: DEFAULT_BUILDER_BINARY.to_string(),
            timeout: DEFAULT_BUILD_TIMEOUT,
            parent_build: None,
        }
    }

    fn allowed_paths(&self) -> Vec<String> {
        vec![
            format!("crates/sf-skills/{}/src/lib.rs", self.skill_name),
            format!("tests/test_skill_{}.rs", self.skill_name),
        ]
    }
}

/// Result of a sandboxed build attempt.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Ledger row for this attempt, already persisted with a final status.
    pub build: Build,
    /// Paths changed in the sandbox, relative to its root.
    pub changed_paths: Vec<String>,
    /// `true` if the diff passed the allow-list gate.
    pub gate_passed: bool,
    /// Builder process exit code, if it ran to completion.
    pub exit_code: Option<i32>,
}

/// Run a sandboxed build attempt synchronously.
///
/// Stages a filtered copy of `request.source_root`, baselines it with git,
/// writes a build packet, invokes the builder binary with a timeout, gates
/// the resulting diff against `request.allowed_paths()`, copies back only
/// allow-listed files on a pass, and records a [`Build`] row plus a build
/// log artifact via `ledger`.
pub fn run_build(ledger: &LedgerStore, request: &BuildRequest) -> Result<BuildOutcome, SfError> {
    let staged = tempfile::tempdir().map_err(|e| {
        SfError::new(ErrorCode::ExecutionError, format!("create sandbox dir failed: {e}"))
    })?;

    stage_workspace(&request.source_root, staged.path())?;
    sf_git::ensure_git_repo(staged.path());

    let mut build = match &request.parent_build {
        Some(parent) => Build::retry_of(parent, staged.path().display().to_string()),
        None => Build::new(request.proposal_id.clone(), staged.path().display().to_string()),
    };
    ledger.insert_build(&build)?;

    let packet = build_packet_content(request, staged.path());
    write_build_log(ledger, &request.artifacts_dir, &packet, &format!("{}_packet", build.id))
        .map_err(|e| {
            warn!(target: "sf_sandbox", build_id = %build.id, "failed to write build packet: {e}");
            e
        })?;

    if which(&request.builder_binary).is_none() {
        let summary = format!("builder binary '{}' not found on PATH", request.builder_binary);
        finish_build(ledger, &mut build, BuildStatus::Failed, Some(summary.clone()))?;
        write_build_log(ledger, &request.artifacts_dir, &summary, &build.id)?;
        return Err(SfError::new(ErrorCode::ExecutionError, summary)
            .with_context("build_id", build.id.clone()));
    }

    let started = Instant::now();
    let run_result = run_with_timeout(
        &request.builder_binary,
        staged.path(),
        request.timeout,
    );

    let (exit_code, stdout, stderr, timed_out) = match run_result {
        Ok(outcome) => outcome,
        Err(e) => {
            let summary = format!("builder invocation failed: {e}");
            finish_build(ledger, &mut build, BuildStatus::Failed, Some(summary.clone()))?;
            write_build_log(ledger, &request.artifacts_dir, &summary, &build.id)?;
            return Err(SfError::new(ErrorCode::ExecutionError, summary)
                .with_context("build_id", build.id.clone()));
        }
    };

    if timed_out {
        let summary = format!(
            "builder timed out after {:?}",
            request.timeout
        );
        finish_build(ledger, &mut build, BuildStatus::Failed, Some(summary.clone()))?;
        let log = render_build_log(&build, &request.builder_binary, started.elapsed(), exit_code, &stdout, &stderr, false, &[]);
        write_build_log(ledger, &request.artifacts_dir, &log, &build.id)?;
        return Err(SfError::new(ErrorCode::Timeout, summary).with_context("build_id", build.id.clone()));
    }

    let changed = sf_git::git_diff_names(staged.path()).map_err(|e| {
        SfError::new(ErrorCode::ExecutionError, format!("failed to read sandbox diff: {e}"))
    })?;

    let allowed = request.allowed_paths();
    let gate_passed = evaluate_gate(&changed, &allowed);

    let log = render_build_log(
        &build,
        &request.builder_binary,
        started.elapsed(),
        exit_code,
        &stdout,
        &stderr,
        gate_passed,
        &changed,
    );
    write_build_log(ledger, &request.artifacts_dir, &log, &build.id)?;

    if !gate_passed {
        let summary = gate_violation_summary(&changed, &allowed);
        finish_build(ledger, &mut build, BuildStatus::Failed, Some(summary))?;
        return Ok(BuildOutcome {
            build,
            changed_paths: changed,
            gate_passed: false,
            exit_code,
        });
    }

    copy_back(staged.path(), &request.source_root, &changed)?;
    finish_build(ledger, &mut build, BuildStatus::Succeeded, Some("diff within allow-list".into()))?;
    ledger.update_proposal_status(&request.proposal_id, ProposalStatus::Built)?;

    Ok(BuildOutcome {
        build,
        changed_paths: changed,
        gate_passed: true,
        exit_code,
    })
}

/// Async wrapper around [`run_build`] for callers already on a tokio runtime.
///
/// `ledger` is not `Sync`-shared across the blocking call; this clones
/// nothing itself and expects the caller's `Arc<LedgerStore>` (or
/// equivalent) to be `Send`, so the blocking subprocess call can be parked
/// off the async executor thread.
pub async fn run_build_async(
    ledger: std::sync::Arc<LedgerStore>,
    request: BuildRequest,
) -> Result<BuildOutcome, SfError> {
    tokio::task::spawn_blocking(move || run_build(&ledger, &request))
        .await
        .map_err(|e| SfError::new(ErrorCode::ExecutionError, format!("sandbox task panicked: {e}")))?
}

fn finish_build(
    ledger: &LedgerStore,
    build: &mut Build,
    status: BuildStatus,
    summary: Option<String>,
) -> Result<(), SfError> {
    let finished_at = sf_core::now_rfc3339();
    ledger.update_build(&build.id, status, &finished_at, summary.as_deref())?;
    build.status = status;
    build.finished_at = Some(finished_at);
    build.summary = summary;
    Ok(())
}

fn stage_workspace(src_root: &Path, dest_root: &Path) -> Result<(), SfError> {
    debug!(target: "sf_sandbox", from = %src_root.display(), to = %dest_root.display(), "staging sandbox workspace");

    let walker = WalkDir::new(src_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded(e.file_name().to_string_lossy().as_ref()));

    for entry in walker {
        let entry = entry.map_err(|e| {
            SfError::new(ErrorCode::ExecutionError, format!("walk source workspace failed: {e}"))
        })?;
        let path = entry.path();
        let rel = path.strip_prefix(src_root).unwrap_or(path);
        if rel.as_os_str().is_empty() {
            continue;
        }

        let dest_path = dest_root.join(rel);
        if entry.file_type().is_symlink() {
            continue;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| {
                SfError::new(ErrorCode::ExecutionError, format!("create dir failed: {e}"))
            })?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    SfError::new(ErrorCode::ExecutionError, format!("create dir failed: {e}"))
                })?;
            }
            fs::copy(path, &dest_path).map_err(|e| {
                SfError::new(ErrorCode::ExecutionError, format!("copy {} failed: {e}", rel.display()))
            })?;
        }
    }

    Ok(())
}

fn is_excluded(file_name: &str) -> bool {
    EXCLUDED_NAMES.contains(&file_name) || EXCLUDED_SUFFIXES.iter().any(|suf| file_name.ends_with(suf))
}

/// Returns `true` if every changed path is allow-listed, every required
/// allow-listed path was actually touched, and the changeset is non-empty.
fn evaluate_gate(changed: &[String], allowed: &[String]) -> bool {
    if changed.is_empty() {
        return false;
    }
    if !changed.iter().all(|p| allowed.contains(p)) {
        return false;
    }
    allowed.iter().all(|p| changed.contains(p))
}

fn gate_violation_summary(changed: &[String], allowed: &[String]) -> String {
    if changed.is_empty() {
        return "sandbox produced an empty changeset".to_string();
    }
    let unexpected: Vec<&String> = changed.iter().filter(|p| !allowed.contains(p)).collect();
    if !unexpected.is_empty() {
        return format!("diff touched disallowed paths: {unexpected:?}");
    }
    let missing: Vec<&String> = allowed.iter().filter(|p| !changed.contains(p)).collect();
    format!("diff is missing required paths: {missing:?}")
}

/// Copy allow-listed files from the sandbox back into the real workspace.
/// Refuses symlinks and any path that would traverse outside `dest_root`.
fn copy_back(staged: &Path, dest_root: &Path, changed: &[String]) -> Result<(), SfError> {
    for rel in changed {
        let rel_path = Path::new(rel);
        if rel_path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(SfError::new(
                ErrorCode::GateViolation,
                format!("refusing to copy back path-traversal entry: {rel}"),
            ));
        }

        let src = staged.join(rel_path);
        let meta = fs::symlink_metadata(&src).map_err(|e| {
            SfError::new(ErrorCode::ExecutionError, format!("stat {rel} failed: {e}"))
        })?;
        if meta.file_type().is_symlink() {
            return Err(SfError::new(
                ErrorCode::GateViolation,
                format!("refusing to copy back symlink: {rel}"),
            ));
        }

        let dest = dest_root.join(rel_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SfError::new(ErrorCode::ExecutionError, format!("create dir failed: {e}"))
            })?;
        }
        fs::copy(&src, &dest).map_err(|e| {
            SfError::new(ErrorCode::ExecutionError, format!("copy back {rel} failed: {e}"))
        })?;
    }
    Ok(())
}

fn which(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Spawn `binary` in `cwd`, wait up to `timeout`, killing it on expiry.
/// Returns `(exit_code, stdout, stderr, timed_out)`.
fn run_with_timeout(
    binary: &str,
    cwd: &Path,
    timeout: Duration,
) -> Result<(Option<i32>, String, String, bool), SfError> {
    let mut child: Child = Command::new(binary)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SfError::new(ErrorCode::ExecutionError, format!("spawn builder failed: {e}")))?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| SfError::new(ErrorCode::ExecutionError, format!("poll builder failed: {e}")))?
        {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    match status {
        Some(status) => Ok((status.code(), stdout, stderr, false)),
        None => Ok((None, stdout, stderr, true)),
    }
}

fn build_packet_content(request: &BuildRequest, staged_path: &Path) -> String {
    format!(
        "# Build Packet\n\n\
         ## Proposal\n{}\n\n\
         ## Skill\n{}\n\n\
         ## Sandbox\n{}\n\n\
         ## Allowed Paths\n{:#?}\n\n\
         ## Builder\n{}\n",
        request.proposal_id,
        request.skill_name,
        staged_path.display(),
        request.allowed_paths(),
        request.builder_binary,
    )
}

fn render_build_log(
    build: &Build,
    builder_binary: &str,
    elapsed: Duration,
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
    gate_passed: bool,
    changed: &[String],
) -> String {
    const MAX_CAPTURE: usize = 4000;
    let truncate = |s: &str| -> String {
        if s.len() > MAX_CAPTURE {
            format!("{}...\n[truncated, {} bytes total]", &s[..MAX_CAPTURE], s.len())
        } else {
            s.to_string()
        }
    };

    format!(
        "# Build Log: {}\n\n\
         builder: {builder_binary}\n\
         elapsed: {elapsed:?}\n\
         exit_code: {exit_code:?}\n\
         gate_passed: {gate_passed}\n\
         changed_paths: {changed:?}\n\n\
         ## stdout\n```\n{}\n```\n\n\
         ## stderr\n```\n{}\n```\n",
        build.id,
        truncate(stdout),
        truncate(stderr),
    )
}
