#![forbid(unsafe_code)]

//! Linear checkpoint history per block.
//!
//! Each block owns a stack of checkpoints numbered by `sequence_number`.
//! `blocks.current_history_id` marks the checkpoint the block's fields were
//! last saved to or restored from. Undo and redo move that marker to the
//! nearest lower/higher sequence still present (gaps are tolerated).
//! Checkpointing while below the top of the stack first deletes everything
//! above the marker: redo history is discarded once a new branch starts.

mod checkpoint;
mod navigate;

use super::blocks::{clamp_logged, encode_metadata, parse_metadata, require_block};
use super::{SqliteStore, StoreError, canonicalize_block, canonicalize_organization, from_sqlite_usize, to_sqlite_i64};
use mb_core::ids::{BlockId, CheckpointId, OrganizationId};
use mb_core::{ActorKind, Block, BlockFields, Checkpoint};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};

const CHECKPOINT_COLUMNS: &str = "id, block_id, sequence_number, label, description, value, \
     value_limit, metadata_json, actor_kind, actor_id, created_at_ms";

impl SqliteStore {
    /// All checkpoints of a block, oldest first.
    pub fn list_block_history(
        &self,
        organization_id: &str,
        block_id: &str,
    ) -> Result<Vec<Checkpoint>, StoreError> {
        let organization_id = canonicalize_organization(organization_id)?;
        let block_id = canonicalize_block(block_id)?;
        require_block(&self.conn, &organization_id, &block_id)?;

        let sql = format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM block_history \
             WHERE block_id=?1 AND organization=?2 \
             ORDER BY sequence_number ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![block_id.as_str(), organization_id.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(checkpoint_from_row(row)?);
        }
        Ok(out)
    }
}

/// Loads the block a history operation works on.
///
/// A caller-supplied copy is merged into the transaction in place of the
/// stored row: its fields and version become the transaction's view of the
/// block, and the closing versioned write rejects it if it is stale. Its
/// value is clamped to its limit like any other write.
fn session_block_tx(
    tx: &Transaction<'_>,
    organization_id: &OrganizationId,
    block_id: &BlockId,
    preloaded: Option<Block>,
) -> Result<Block, StoreError> {
    let stored = require_block(tx, organization_id, block_id)?;
    match preloaded {
        None => Ok(stored),
        Some(mut preloaded) => {
            if preloaded.id != stored.id || preloaded.organization_id != stored.organization_id {
                return Err(StoreError::InvalidInput(
                    "preloaded block does not match the requested block",
                ));
            }
            if preloaded.version != stored.version {
                tracing::debug!(
                    block_id = %block_id,
                    preloaded_version = preloaded.version,
                    stored_version = stored.version,
                    "preloaded block is stale"
                );
            }
            let value = std::mem::take(&mut preloaded.value);
            preloaded.value = clamp_logged(&preloaded.id, value, preloaded.limit).0;
            Ok(preloaded)
        }
    }
}

/// Sequence number of `checkpoint_id`, if it exists and belongs to `block_id`.
fn checkpoint_sequence(
    conn: &Connection,
    block_id: &BlockId,
    checkpoint_id: &CheckpointId,
) -> Result<Option<i64>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT sequence_number FROM block_history WHERE id=?1 AND block_id=?2",
            params![checkpoint_id.as_str(), block_id.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?)
}

fn insert_checkpoint_tx(
    tx: &Transaction<'_>,
    organization_id: &OrganizationId,
    checkpoint: &Checkpoint,
) -> Result<(), StoreError> {
    let fields = &checkpoint.fields;
    tx.execute(
        r#"
        INSERT INTO block_history(id, organization, block_id, sequence_number, label, description,
                                  value, value_limit, metadata_json, actor_kind, actor_id, created_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            checkpoint.id.as_str(),
            organization_id.as_str(),
            checkpoint.block_id.as_str(),
            checkpoint.sequence_number,
            fields.label,
            fields.description,
            fields.value,
            to_sqlite_i64(fields.limit)?,
            encode_metadata(&fields.metadata)?,
            checkpoint.actor_kind.as_str(),
            checkpoint.actor_id,
            checkpoint.created_at_ms,
        ],
    )?;
    Ok(())
}

fn checkpoint_from_row(row: &Row<'_>) -> Result<Checkpoint, StoreError> {
    let id = CheckpointId::try_new(row.get::<_, String>(0)?)
        .map_err(|_| StoreError::InvalidInput("invalid checkpoint row"))?;
    let block_id = BlockId::try_new(row.get::<_, String>(1)?)
        .map_err(|_| StoreError::InvalidInput("invalid checkpoint row"))?;
    let actor_kind = ActorKind::parse(&row.get::<_, String>(8)?)
        .ok_or(StoreError::InvalidInput("invalid checkpoint actor_kind"))?;

    Ok(Checkpoint {
        id,
        block_id,
        sequence_number: row.get(2)?,
        fields: BlockFields {
            label: row.get(3)?,
            description: row.get(4)?,
            value: row.get(5)?,
            limit: from_sqlite_usize(row.get(6)?)?,
            metadata: parse_metadata(&row.get::<_, String>(7)?)?,
        },
        actor_kind,
        actor_id: row.get(9)?,
        created_at_ms: row.get(10)?,
    })
}
