#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-ledger
//!
//! The SQLite-backed system of record for the propose/build/verify/promote
//! lifecycle: five tables (`skill_proposals`, `builds`, `verifications`,
//! `promotions`, `artifacts`) plus a `schema_version` row, opened with WAL
//! journaling and foreign keys enforced, matching the connection setup and
//! forward-only numbered migrations of the original ledger store.

mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use sf_core::artifact::{Artifact, ArtifactKind};
use sf_core::build::{Build, BuildStatus};
use sf_core::promotion::Promotion;
use sf_core::proposal::{ProposalStatus, SideEffectClass, SkillProposal};
use sf_core::verification::{Verification, VerificationStatus};
use sf_error::{ErrorCode, SfError};

pub use schema::{Migration, MIGRATIONS, SCHEMA_SQL, SCHEMA_VERSION};

/// A handle to the skill-forge ledger database.
///
/// Wraps a single `rusqlite::Connection` behind a `Mutex`: the ledger is
/// accessed from at most a handful of CLI call sites at a time, so a
/// connection pool buys nothing worth the added complexity.
pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    /// Open (creating if absent) the ledger database at `path`, enabling WAL
    /// journaling and foreign key enforcement, then bring the schema up to
    /// [`SCHEMA_VERSION`] via [`MIGRATIONS`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SfError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory ledger, primarily for tests.
    pub fn open_in_memory() -> Result<Self, SfError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---- proposals ----------------------------------------------------

    /// Insert a new skill proposal.
    pub fn insert_proposal(&self, proposal: &SkillProposal) -> Result<(), SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.execute(
            "INSERT INTO skill_proposals
                (id, name, description, io_schema_json, side_effect_class,
                 required_secrets_json, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                proposal.id,
                proposal.name,
                proposal.description,
                proposal.io_schema_json,
                side_effect_class_to_str(proposal.side_effect_class),
                proposal.required_secrets_json,
                proposal_status_to_str(proposal.status),
                proposal.created_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch a proposal by id.
    pub fn get_proposal(&self, id: &str) -> Result<SkillProposal, SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.query_row(
            "SELECT id, name, description, io_schema_json, side_effect_class,
                    required_secrets_json, status, created_at
             FROM skill_proposals WHERE id = ?1",
            params![id],
            row_to_proposal,
        )
        .optional()?
        .ok_or_else(|| {
            SfError::new(ErrorCode::NotFound, format!("no proposal with id {id}"))
                .with_context("proposal_id", id)
        })
    }

    /// Transition `id`'s status in place. Does not itself validate the
    /// transition — callers consult [`ProposalStatus::can_transition_to`]
    /// before calling this.
    pub fn update_proposal_status(&self, id: &str, status: ProposalStatus) -> Result<(), SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let rows = conn.execute(
            "UPDATE skill_proposals SET status = ?1 WHERE id = ?2",
            params![proposal_status_to_str(status), id],
        )?;
        if rows == 0 {
            return Err(
                SfError::new(ErrorCode::NotFound, format!("no proposal with id {id}"))
                    .with_context("proposal_id", id),
            );
        }
        Ok(())
    }

    /// List proposals, optionally filtered by status, newest first.
    pub fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<SkillProposal>, SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let base = "SELECT id, name, description, io_schema_json, side_effect_class,
                           required_secrets_json, status, created_at
                    FROM skill_proposals";
        let mut out = Vec::new();
        if let Some(status) = status {
            let mut stmt =
                conn.prepare(&format!("{base} WHERE status = ?1 ORDER BY created_at DESC"))?;
            let rows = stmt.query_map(params![proposal_status_to_str(status)], row_to_proposal)?;
            for row in rows {
                out.push(row?);
            }
        } else {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY created_at DESC"))?;
            let rows = stmt.query_map([], row_to_proposal)?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }

    // ---- builds ---------------------------------------------------------

    /// Insert a new build attempt.
    pub fn insert_build(&self, build: &Build) -> Result<(), SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.execute(
            "INSERT INTO builds
                (id, proposal_id, branch_name, started_at, finished_at, status,
                 summary, attempt_number, parent_build_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                build.id,
                build.proposal_id,
                build.branch_name,
                build.started_at,
                build.finished_at,
                build_status_to_str(build.status),
                build.summary,
                build.attempt_number,
                build.parent_build_id,
            ],
        )?;
        Ok(())
    }

    /// Apply a partial update to a build's status/finished_at/summary.
    pub fn update_build(
        &self,
        id: &str,
        status: BuildStatus,
        finished_at: &str,
        summary: Option<&str>,
    ) -> Result<(), SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let rows = conn.execute(
            "UPDATE builds SET status = ?1, finished_at = ?2, summary = ?3 WHERE id = ?4",
            params![build_status_to_str(status), finished_at, summary, id],
        )?;
        if rows == 0 {
            return Err(SfError::new(ErrorCode::NotFound, format!("no build with id {id}"))
                .with_context("build_id", id));
        }
        Ok(())
    }

    /// Fetch a build by id.
    pub fn get_build(&self, id: &str) -> Result<Build, SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.query_row(
            "SELECT id, proposal_id, branch_name, started_at, finished_at, status,
                    summary, attempt_number, parent_build_id
             FROM builds WHERE id = ?1",
            params![id],
            row_to_build,
        )
        .optional()?
        .ok_or_else(|| {
            SfError::new(ErrorCode::NotFound, format!("no build with id {id}"))
                .with_context("build_id", id)
        })
    }

    /// List every build attempt for a proposal, oldest first.
    pub fn get_builds_for_proposal(&self, proposal_id: &str) -> Result<Vec<Build>, SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, proposal_id, branch_name, started_at, finished_at, status,
                    summary, attempt_number, parent_build_id
             FROM builds WHERE proposal_id = ?1 ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map(params![proposal_id], row_to_build)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ---- verifications --------------------------------------------------

    /// Insert a verification record.
    pub fn insert_verification(&self, v: &Verification) -> Result<(), SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.execute(
            "INSERT INTO verifications
                (id, proposal_id, status, ruff_ok, mypy_ok, pytest_ok, policy_ok,
                 invariant_ok, report_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                v.id,
                v.proposal_id,
                verification_status_to_str(v.status),
                v.ruff_ok,
                v.mypy_ok,
                v.pytest_ok,
                v.policy_ok,
                v.invariant_ok,
                v.report_path,
                v.created_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch the newest verification record for a proposal.
    pub fn get_latest_verification(&self, proposal_id: &str) -> Result<Verification, SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.query_row(
            "SELECT id, proposal_id, status, ruff_ok, mypy_ok, pytest_ok, policy_ok,
                    invariant_ok, report_path, created_at
             FROM verifications WHERE proposal_id = ?1
             ORDER BY created_at DESC LIMIT 1",
            params![proposal_id],
            row_to_verification,
        )
        .optional()?
        .ok_or_else(|| {
            SfError::new(
                ErrorCode::NotFound,
                format!("no verification for proposal {proposal_id}"),
            )
            .with_context("proposal_id", proposal_id)
        })
    }

    // ---- promotions -------------------------------------------------------

    /// Insert a promotion (status transition audit) record.
    pub fn insert_promotion(&self, p: &Promotion) -> Result<(), SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.execute(
            "INSERT INTO promotions
                (id, proposal_id, from_status, to_status, approved_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                p.id,
                p.proposal_id,
                proposal_status_to_str(p.from_status),
                proposal_status_to_str(p.to_status),
                p.approved_by,
                p.created_at,
            ],
        )?;
        Ok(())
    }

    // ---- artifacts ----------------------------------------------------------

    /// Insert an artifact record.
    pub fn insert_artifact(&self, a: &Artifact) -> Result<(), SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.execute(
            "INSERT INTO artifacts (id, kind, path, sha256, created_at, related_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                a.id,
                artifact_kind_to_str(a.kind),
                a.path,
                a.sha256,
                a.created_at,
                a.related_id,
            ],
        )?;
        Ok(())
    }

    /// List every artifact related to a given proposal/build id, newest first.
    pub fn get_artifacts_for_related(&self, related_id: &str) -> Result<Vec<Artifact>, SfError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, kind, path, sha256, created_at, related_id
             FROM artifacts WHERE related_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![related_id], row_to_artifact)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn init_db(conn: &Connection) -> Result<(), SfError> {
    let has_version_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();

    if !has_version_table {
        info!("initializing fresh ledger schema at version {SCHEMA_VERSION}");
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let current: i64 = conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;
    if current >= SCHEMA_VERSION {
        debug!(current, "ledger schema already current");
        return Ok(());
    }

    run_migrations(conn, current)
}

fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), SfError> {
    conn.pragma_update(None, "foreign_keys", false)?;
    let result = (|| -> rusqlite::Result<()> {
        for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
            info!(version = migration.version, "applying ledger migration");
            for stmt in migration.statements {
                conn.execute(stmt, [])?;
            }
            conn.execute("UPDATE schema_version SET version = ?1", params![migration.version])?;
        }
        Ok(())
    })();
    conn.pragma_update(None, "foreign_keys", true)?;
    result?;
    Ok(())
}

fn side_effect_class_to_str(c: SideEffectClass) -> &'static str {
    match c {
        SideEffectClass::ReadOnly => "READ_ONLY",
        SideEffectClass::FileWrite => "FILE_WRITE",
        SideEffectClass::Network => "NETWORK",
        SideEffectClass::SecretRead => "SECRET_READ",
        SideEffectClass::Money => "MONEY",
        SideEffectClass::Messaging => "MESSAGING",
    }
}

fn side_effect_class_from_str(s: &str) -> Result<SideEffectClass, SfError> {
    match s {
        "READ_ONLY" => Ok(SideEffectClass::ReadOnly),
        "FILE_WRITE" => Ok(SideEffectClass::FileWrite),
        "NETWORK" => Ok(SideEffectClass::Network),
        "SECRET_READ" => Ok(SideEffectClass::SecretRead),
        "MONEY" => Ok(SideEffectClass::Money),
        "MESSAGING" => Ok(SideEffectClass::Messaging),
        other => Err(SfError::new(
            ErrorCode::StoreError,
            format!("unknown side_effect_class in ledger row: {other}"),
        )),
    }
}

fn proposal_status_to_str(s: ProposalStatus) -> &'static str {
    match s {
        ProposalStatus::Proposed => "PROPOSED",
        ProposalStatus::Rejected => "REJECTED",
        ProposalStatus::Built => "BUILT",
        ProposalStatus::Verified => "VERIFIED",
        ProposalStatus::Trusted => "TRUSTED",
    }
}

fn proposal_status_from_str(s: &str) -> Result<ProposalStatus, SfError> {
    match s {
        "PROPOSED" => Ok(ProposalStatus::Proposed),
        "REJECTED" => Ok(ProposalStatus::Rejected),
        "BUILT" => Ok(ProposalStatus::Built),
        "VERIFIED" => Ok(ProposalStatus::Verified),
        "TRUSTED" => Ok(ProposalStatus::Trusted),
        other => Err(SfError::new(
            ErrorCode::StoreError,
            format!("unknown status in ledger row: {other}"),
        )),
    }
}

fn build_status_to_str(s: BuildStatus) -> &'static str {
    match s {
        BuildStatus::Started => "STARTED",
        BuildStatus::Failed => "FAILED",
        BuildStatus::Succeeded => "SUCCEEDED",
    }
}

fn build_status_from_str(s: &str) -> Result<BuildStatus, SfError> {
    match s {
        "STARTED" => Ok(BuildStatus::Started),
        "FAILED" => Ok(BuildStatus::Failed),
        "SUCCEEDED" => Ok(BuildStatus::Succeeded),
        other => Err(SfError::new(
            ErrorCode::StoreError,
            format!("unknown build status in ledger row: {other}"),
        )),
    }
}

fn verification_status_to_str(s: VerificationStatus) -> &'static str {
    match s {
        VerificationStatus::Failed => "FAILED",
        VerificationStatus::Passed => "PASSED",
    }
}

fn verification_status_from_str(s: &str) -> Result<VerificationStatus, SfError> {
    match s {
        "FAILED" => Ok(VerificationStatus::Failed),
        "PASSED" => Ok(VerificationStatus::Passed),
        other => Err(SfError::new(
            ErrorCode::StoreError,
            format!("unknown verification status in ledger row: {other}"),
        )),
    }
}

fn artifact_kind_to_str(k: ArtifactKind) -> &'static str {
    match k {
        ArtifactKind::SkillSpec => "SKILL_SPEC",
        ArtifactKind::PatchSummary => "PATCH_SUMMARY",
        ArtifactKind::VerificationReport => "VERIFICATION_REPORT",
        ArtifactKind::Note => "NOTE",
        ArtifactKind::BuildPacket => "BUILD_PACKET",
        ArtifactKind::BuildLog => "BUILD_LOG",
        ArtifactKind::ResearchNote => "RESEARCH_NOTE",
    }
}

fn artifact_kind_from_str(s: &str) -> Result<ArtifactKind, SfError> {
    match s {
        "SKILL_SPEC" => Ok(ArtifactKind::SkillSpec),
        "PATCH_SUMMARY" => Ok(ArtifactKind::PatchSummary),
        "VERIFICATION_REPORT" => Ok(ArtifactKind::VerificationReport),
        "NOTE" => Ok(ArtifactKind::Note),
        "BUILD_PACKET" => Ok(ArtifactKind::BuildPacket),
        "BUILD_LOG" => Ok(ArtifactKind::BuildLog),
        "RESEARCH_NOTE" => Ok(ArtifactKind::ResearchNote),
        other => Err(SfError::new(
            ErrorCode::StoreError,
            format!("unknown artifact kind in ledger row: {other}"),
        )),
    }
}

fn row_to_proposal(row: &Row<'_>) -> rusqlite::Result<SkillProposal> {
    let side_effect_class: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(SkillProposal {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        io_schema_json: row.get(3)?,
        side_effect_class: side_effect_class_from_str(&side_effect_class)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        required_secrets_json: row.get(5)?,
        status: proposal_status_from_str(&status)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        created_at: row.get(7)?,
    })
}

fn row_to_build(row: &Row<'_>) -> rusqlite::Result<Build> {
    let status: String = row.get(5)?;
    Ok(Build {
        id: row.get(0)?,
        proposal_id: row.get(1)?,
        branch_name: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: build_status_from_str(&status)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        summary: row.get(6)?,
        attempt_number: row.get(7)?,
        parent_build_id: row.get(8)?,
    })
}

fn row_to_verification(row: &Row<'_>) -> rusqlite::Result<Verification> {
    let status: String = row.get(2)?;
    Ok(Verification {
        id: row.get(0)?,
        proposal_id: row.get(1)?,
        status: verification_status_from_str(&status)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        ruff_ok: row.get(3)?,
        mypy_ok: row.get(4)?,
        pytest_ok: row.get(5)?,
        policy_ok: row.get(6)?,
        invariant_ok: row.get(7)?,
        report_path: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    let kind: String = row.get(1)?;
    Ok(Artifact {
        id: row.get(0)?,
        kind: artifact_kind_from_str(&kind)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        path: row.get(2)?,
        sha256: row.get(3)?,
        created_at: row.get(4)?,
        related_id: row.get(5)?,
    })
}
