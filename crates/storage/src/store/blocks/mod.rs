#![forbid(unsafe_code)]

mod bulk;
mod create;
mod list;
mod update;

use super::{SqliteStore, StoreError, canonicalize_block, canonicalize_organization, from_sqlite_usize, to_sqlite_i64};
use mb_core::ids::{BlockId, CheckpointId, OrganizationId};
use mb_core::{Actor, Block};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde_json::Value as JsonValue;

/// Block projection shared by every block query; `b` is the blocks alias.
pub(super) const BLOCK_COLUMNS: &str = "b.id, b.organization, b.label, b.description, b.value, \
     b.value_limit, b.metadata_json, b.is_template, b.template_name, b.project_id, \
     b.current_history_id, b.version, b.last_updated_by, b.created_at_ms, b.updated_at_ms";

impl SqliteStore {
    pub fn get_block(
        &self,
        organization_id: &str,
        block_id: &str,
    ) -> Result<Option<Block>, StoreError> {
        let organization_id = canonicalize_organization(organization_id)?;
        let block_id = canonicalize_block(block_id)?;
        load_block(&self.conn, &organization_id, &block_id)
    }

    /// Looks up several blocks at once. The result is positional: one entry
    /// per requested id, `None` where the id does not resolve.
    pub fn get_blocks_by_ids(
        &self,
        organization_id: &str,
        block_ids: &[String],
    ) -> Result<Vec<Option<Block>>, StoreError> {
        let organization_id = canonicalize_organization(organization_id)?;
        let mut out = Vec::with_capacity(block_ids.len());
        for raw in block_ids {
            let block = match BlockId::try_new(raw.trim()) {
                Ok(block_id) => load_block(&self.conn, &organization_id, &block_id)?,
                Err(_) => None,
            };
            out.push(block);
        }
        Ok(out)
    }

    pub fn count_blocks(&self, organization_id: &str) -> Result<usize, StoreError> {
        let organization_id = canonicalize_organization(organization_id)?;
        let count = self.conn.query_row(
            "SELECT COUNT(1) FROM blocks WHERE organization=?1",
            params![organization_id.as_str()],
            |row| row.get::<_, i64>(0),
        )?;
        from_sqlite_usize(count)
    }
}

pub(super) fn load_block(
    conn: &Connection,
    organization_id: &OrganizationId,
    block_id: &BlockId,
) -> Result<Option<Block>, StoreError> {
    let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks b WHERE b.id=?1 AND b.organization=?2");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![block_id.as_str(), organization_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(block_from_row(row)?)),
        None => Ok(None),
    }
}

pub(super) fn require_block(
    conn: &Connection,
    organization_id: &OrganizationId,
    block_id: &BlockId,
) -> Result<Block, StoreError> {
    load_block(conn, organization_id, block_id)?
        .ok_or_else(|| StoreError::block_not_found(block_id.as_str()))
}

/// Maps a row selected with [`BLOCK_COLUMNS`].
pub(super) fn block_from_row(row: &Row<'_>) -> Result<Block, StoreError> {
    let id = BlockId::try_new(row.get::<_, String>(0)?)
        .map_err(|_| StoreError::InvalidInput("invalid block row"))?;
    let organization_id = OrganizationId::try_new(row.get::<_, String>(1)?)
        .map_err(|_| StoreError::InvalidInput("invalid block row"))?;
    let current_history_id = row
        .get::<_, Option<String>>(10)?
        .map(CheckpointId::try_new)
        .transpose()
        .map_err(|_| StoreError::InvalidInput("invalid block row"))?;

    Ok(Block {
        id,
        organization_id,
        label: row.get(2)?,
        description: row.get(3)?,
        value: row.get(4)?,
        limit: from_sqlite_usize(row.get(5)?)?,
        metadata: parse_metadata(&row.get::<_, String>(6)?)?,
        is_template: row.get::<_, i64>(7)? != 0,
        template_name: row.get(8)?,
        project_id: row.get(9)?,
        current_history_id,
        version: row.get(11)?,
        last_updated_by: row.get(12)?,
        created_at_ms: row.get(13)?,
        updated_at_ms: row.get(14)?,
    })
}

pub(super) fn encode_metadata(metadata: &JsonValue) -> Result<String, StoreError> {
    serde_json::to_string(metadata).map_err(|_| StoreError::InvalidInput("invalid metadata"))
}

pub(super) fn parse_metadata(raw: &str) -> Result<JsonValue, StoreError> {
    serde_json::from_str(raw).map_err(|_| StoreError::InvalidInput("invalid metadata_json"))
}

/// Writes every mutable column of `block` back, guarded by its `version`.
///
/// Fails with `ConcurrentModification` when the stored version moved on
/// since `block` was read. Returns the block as stored, with the bumped
/// version.
pub(super) fn write_block_tx(
    tx: &Transaction<'_>,
    block: &Block,
    actor: &Actor,
    now_ms: i64,
) -> Result<Block, StoreError> {
    let changed = tx.execute(
        r#"
        UPDATE blocks
        SET label=?4, description=?5, value=?6, value_limit=?7, metadata_json=?8,
            is_template=?9, template_name=?10, project_id=?11, current_history_id=?12,
            version=version + 1, last_updated_by=?13, updated_at_ms=?14
        WHERE id=?1 AND organization=?2 AND version=?3
        "#,
        params![
            block.id.as_str(),
            block.organization_id.as_str(),
            block.version,
            block.label,
            block.description,
            block.value,
            to_sqlite_i64(block.limit)?,
            encode_metadata(&block.metadata)?,
            i64::from(block.is_template),
            block.template_name,
            block.project_id,
            block.current_history_id.as_ref().map(CheckpointId::as_str),
            actor.id(),
            now_ms,
        ],
    )?;

    if changed == 0 {
        let actual = tx
            .query_row(
                "SELECT version FROM blocks WHERE id=?1 AND organization=?2",
                params![block.id.as_str(), block.organization_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        return Err(match actual {
            Some(actual) => StoreError::ConcurrentModification {
                block_id: block.id.as_str().to_string(),
                expected: block.version,
                actual,
            },
            None => StoreError::block_not_found(block.id.as_str()),
        });
    }

    let mut stored = block.clone();
    stored.version = block.version + 1;
    stored.last_updated_by = Some(actor.id().to_string());
    stored.updated_at_ms = now_ms;
    Ok(stored)
}

/// Fits `value` into `limit`, logging when characters had to be dropped.
pub(super) fn clamp_logged(block_id: &BlockId, value: String, limit: usize) -> (String, bool) {
    let clamped = mb_core::clamp_value(value, limit);
    if let Some(original) = clamped.truncated_from {
        tracing::warn!(
            block_id = %block_id,
            length = original,
            limit,
            "value length exceeds block limit, truncating"
        );
    }
    let truncated = clamped.truncated_from.is_some();
    (clamped.value, truncated)
}
