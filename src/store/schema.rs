//! Embedded database schema.
//!
//! Every statement is idempotent so the whole batch can be re-applied to
//! a database that is missing some of its tables.

/// Tables that must exist before the vault is usable.
pub(crate) const REQUIRED_TABLES: &[&str] = &[
    "system",
    "access_tokens",
    "organizations",
    "projects",
    "environments",
    "variable_definitions",
    "variable_values",
    "audit_log",
];

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS system (
    id              TEXT PRIMARY KEY CHECK (id = 'config'),
    password_hash   TEXT NOT NULL,
    key_salt        TEXT,
    kdf_iterations  INTEGER NOT NULL DEFAULT 100000,
    name            TEXT,
    email           TEXT,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS access_tokens (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    token_hash    TEXT NOT NULL UNIQUE,
    created_at    TEXT NOT NULL,
    last_used_at  TEXT,
    expires_at    TEXT
);

CREATE TABLE IF NOT EXISTS organizations (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    organization_id  TEXT REFERENCES organizations (id) ON DELETE SET NULL,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS environments (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (project_id, slug)
);

CREATE TABLE IF NOT EXISTS variable_definitions (
    id             TEXT PRIMARY KEY,
    project_id     TEXT NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    key            TEXT NOT NULL,
    description    TEXT,
    default_value  TEXT,
    is_secret      INTEGER NOT NULL DEFAULT 0,
    updated_at     TEXT NOT NULL,
    UNIQUE (project_id, key)
);

CREATE TABLE IF NOT EXISTS variable_values (
    id              TEXT PRIMARY KEY,
    environment_id  TEXT NOT NULL REFERENCES environments (id) ON DELETE CASCADE,
    definition_id   TEXT NOT NULL REFERENCES variable_definitions (id) ON DELETE CASCADE,
    value           TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (environment_id, definition_id)
);

CREATE TABLE IF NOT EXISTS audit_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp  TEXT NOT NULL,
    operation  TEXT NOT NULL,
    subject    TEXT,
    details    TEXT
);
";
