#![forbid(unsafe_code)]

use super::{StoreError, now_ms};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

const SCHEMA_VERSION: i64 = 1;

const REQUIRED_TABLES: &[&str] = &[
    "store_state",
    "organizations",
    "blocks",
    "block_history",
    "agents",
    "blocks_agents",
    "identities",
    "identities_blocks",
];

/// Refuses databases written by an unknown schema instead of migrating them.
pub(super) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = REQUIRED_TABLES.iter().copied().collect();

    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }

    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::InvalidInput(
                "RESET_REQUIRED: required table is missing",
            ));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

pub(super) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS organizations (
          organization TEXT PRIMARY KEY,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS blocks (
          id TEXT PRIMARY KEY,
          organization TEXT NOT NULL,
          label TEXT NOT NULL,
          description TEXT,
          value TEXT NOT NULL,
          value_limit INTEGER NOT NULL CHECK(value_limit >= 0),
          metadata_json TEXT NOT NULL,
          is_template INTEGER NOT NULL DEFAULT 0,
          template_name TEXT,
          project_id TEXT,
          current_history_id TEXT
            REFERENCES block_history(id)
            ON DELETE SET NULL,
          version INTEGER NOT NULL CHECK(version >= 1),
          last_updated_by TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(organization) REFERENCES organizations(organization) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_blocks_organization_created
          ON blocks(organization, created_at_ms, id);

        CREATE TABLE IF NOT EXISTS block_history (
          id TEXT PRIMARY KEY,
          organization TEXT NOT NULL,
          block_id TEXT NOT NULL,
          sequence_number INTEGER NOT NULL CHECK(sequence_number >= 1),
          label TEXT NOT NULL,
          description TEXT,
          value TEXT NOT NULL,
          value_limit INTEGER NOT NULL CHECK(value_limit >= 0),
          metadata_json TEXT NOT NULL,
          actor_kind TEXT NOT NULL CHECK(actor_kind IN ('user', 'agent')),
          actor_id TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE(block_id, sequence_number),
          FOREIGN KEY(block_id) REFERENCES blocks(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS agents (
          id TEXT PRIMARY KEY,
          organization TEXT NOT NULL,
          name TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(organization) REFERENCES organizations(organization) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_agents_organization_created
          ON agents(organization, created_at_ms, id);

        CREATE TABLE IF NOT EXISTS blocks_agents (
          agent_id TEXT NOT NULL,
          block_id TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY(agent_id, block_id),
          FOREIGN KEY(agent_id) REFERENCES agents(id) ON DELETE CASCADE,
          FOREIGN KEY(block_id) REFERENCES blocks(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_blocks_agents_block
          ON blocks_agents(block_id, agent_id);

        CREATE TABLE IF NOT EXISTS identities (
          id TEXT PRIMARY KEY,
          organization TEXT NOT NULL,
          identifier_key TEXT NOT NULL,
          name TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE(organization, identifier_key),
          FOREIGN KEY(organization) REFERENCES organizations(organization) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS identities_blocks (
          identity_id TEXT NOT NULL,
          block_id TEXT NOT NULL,
          PRIMARY KEY(identity_id, block_id),
          FOREIGN KEY(identity_id) REFERENCES identities(id) ON DELETE CASCADE,
          FOREIGN KEY(block_id) REFERENCES blocks(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_identities_blocks_block
          ON identities_blocks(block_id, identity_id);
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}
