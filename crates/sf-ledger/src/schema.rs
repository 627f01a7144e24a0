//! Schema definition and forward-only numbered migrations.

/// Current schema version. Bump alongside a new entry in [`MIGRATIONS`].
pub const SCHEMA_VERSION: i64 = 5;

/// Initial schema, applied verbatim to a fresh database.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS skill_proposals (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    io_schema_json TEXT NOT NULL,
    side_effect_class TEXT NOT NULL CHECK (
        side_effect_class IN ('READ_ONLY', 'FILE_WRITE', 'NETWORK',
                              'SECRET_READ', 'MONEY', 'MESSAGING')
    ),
    required_secrets_json TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'PROPOSED' CHECK (
        status IN ('PROPOSED', 'REJECTED', 'BUILT', 'VERIFIED', 'TRUSTED')
    ),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS builds (
    id TEXT PRIMARY KEY,
    proposal_id TEXT NOT NULL REFERENCES skill_proposals(id),
    branch_name TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    finished_at TEXT,
    status TEXT NOT NULL DEFAULT 'STARTED' CHECK (
        status IN ('STARTED', 'FAILED', 'SUCCEEDED')
    ),
    summary TEXT,
    attempt_number INTEGER NOT NULL DEFAULT 1,
    parent_build_id TEXT REFERENCES builds(id)
);

CREATE TABLE IF NOT EXISTS verifications (
    id TEXT PRIMARY KEY,
    proposal_id TEXT NOT NULL REFERENCES skill_proposals(id),
    status TEXT NOT NULL CHECK (status IN ('FAILED', 'PASSED')),
    ruff_ok INTEGER NOT NULL DEFAULT 0,
    mypy_ok INTEGER NOT NULL DEFAULT 0,
    pytest_ok INTEGER NOT NULL DEFAULT 0,
    policy_ok INTEGER NOT NULL DEFAULT 0,
    invariant_ok INTEGER NOT NULL DEFAULT 0,
    report_path TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS promotions (
    id TEXT PRIMARY KEY,
    proposal_id TEXT NOT NULL REFERENCES skill_proposals(id),
    from_status TEXT NOT NULL,
    to_status TEXT NOT NULL,
    approved_by TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (
        kind IN ('SKILL_SPEC', 'PATCH_SUMMARY', 'VERIFICATION_REPORT',
                 'NOTE', 'BUILD_PACKET', 'BUILD_LOG', 'RESEARCH_NOTE')
    ),
    path TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    related_id TEXT
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

/// One migration: the schema version it brings the database to, and the
/// ordered SQL statements that perform it.
pub struct Migration {
    /// Target schema version.
    pub version: i64,
    /// Statements applied in order.
    pub statements: &'static [&'static str],
}

/// Forward-only migrations, applied in ascending version order when the
/// stored `schema_version` is below [`SCHEMA_VERSION`]. Mirrors the
/// original system's `MIGRATIONS` dict exactly, including the table
/// rebuilds SQLite requires for widened CHECK constraints.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        statements: &[
            "ALTER TABLE verifications ADD COLUMN invariant_ok INTEGER NOT NULL DEFAULT 0",
        ],
    },
    Migration {
        version: 3,
        statements: &[
            r#"CREATE TABLE artifacts_new (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL CHECK (
                    kind IN ('SKILL_SPEC', 'PATCH_SUMMARY', 'VERIFICATION_REPORT',
                             'NOTE', 'BUILD_PACKET', 'BUILD_LOG')
                ),
                path TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                related_id TEXT
            )"#,
            "INSERT INTO artifacts_new SELECT * FROM artifacts",
            "DROP TABLE artifacts",
            "ALTER TABLE artifacts_new RENAME TO artifacts",
        ],
    },
    Migration {
        version: 4,
        statements: &[
            "ALTER TABLE builds ADD COLUMN attempt_number INTEGER NOT NULL DEFAULT 1",
            "ALTER TABLE builds ADD COLUMN parent_build_id TEXT REFERENCES builds(id)",
            r#"CREATE TABLE artifacts_new (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL CHECK (
                    kind IN ('SKILL_SPEC', 'PATCH_SUMMARY', 'VERIFICATION_REPORT',
                             'NOTE', 'BUILD_PACKET', 'BUILD_LOG', 'RESEARCH_NOTE')
                ),
                path TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                related_id TEXT
            )"#,
            "INSERT INTO artifacts_new SELECT * FROM artifacts",
            "DROP TABLE artifacts",
            "ALTER TABLE artifacts_new RENAME TO artifacts",
        ],
    },
    Migration {
        version: 5,
        statements: &[
            r#"CREATE TABLE skill_proposals_new (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                io_schema_json TEXT NOT NULL,
                side_effect_class TEXT NOT NULL CHECK (
                    side_effect_class IN ('READ_ONLY', 'FILE_WRITE', 'NETWORK',
                                          'SECRET_READ', 'MONEY', 'MESSAGING')
                ),
                required_secrets_json TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'PROPOSED' CHECK (
                    status IN ('PROPOSED', 'REJECTED', 'BUILT', 'VERIFIED', 'TRUSTED')
                ),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            )"#,
            "INSERT INTO skill_proposals_new SELECT * FROM skill_proposals",
            "DROP TABLE skill_proposals",
            "ALTER TABLE skill_proposals_new RENAME TO skill_proposals",
        ],
    },
];
