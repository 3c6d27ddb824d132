#![forbid(unsafe_code)]

use super::super::blocks::write_block_tx;
use super::super::{BlockHistoryRequest, SqliteStore, StoreError, canonicalize_block, canonicalize_organization};
use super::{CHECKPOINT_COLUMNS, checkpoint_from_row, checkpoint_sequence, session_block_tx};
use mb_core::ids::BlockId;
use mb_core::{Block, Checkpoint, HistoryDirection};
use rusqlite::{Connection, params};

impl SqliteStore {
    /// Restores the block to the closest earlier checkpoint.
    pub fn undo_checkpoint_block(&mut self, request: BlockHistoryRequest) -> Result<Block, StoreError> {
        self.move_block(request, HistoryDirection::Undo)
    }

    /// Restores the block to the closest later checkpoint.
    pub fn redo_checkpoint_block(&mut self, request: BlockHistoryRequest) -> Result<Block, StoreError> {
        self.move_block(request, HistoryDirection::Redo)
    }

    #[tracing::instrument(skip_all, fields(block_id = %request.block_id, direction = %direction))]
    fn move_block(
        &mut self,
        request: BlockHistoryRequest,
        direction: HistoryDirection,
    ) -> Result<Block, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let block_id = canonicalize_block(&request.block_id)?;
        let now_ms = self.now_ms();

        let tx = self.write_tx()?;
        let mut block = session_block_tx(&tx, &organization_id, &block_id, request.preloaded)?;

        let Some(current_id) = block.current_history_id.clone() else {
            return Err(StoreError::NoHistory {
                block_id: block_id.as_str().to_string(),
            });
        };
        let current_seq = checkpoint_sequence(&tx, &block_id, &current_id)?.ok_or_else(|| {
            StoreError::NotFound {
                kind: "checkpoint",
                id: current_id.as_str().to_string(),
            }
        })?;

        let Some(target) = neighbour_checkpoint(&tx, &block_id, current_seq, direction)? else {
            return Err(StoreError::AtBoundary {
                block_id: block_id.as_str().to_string(),
                direction,
                sequence: current_seq,
            });
        };

        let target_seq = target.sequence_number;
        block.apply_fields(target.fields);
        block.current_history_id = Some(target.id);
        let block = write_block_tx(&tx, &block, &request.actor, now_ms)?;
        tx.commit()?;

        tracing::debug!(from = current_seq, to = target_seq, "block moved through history");
        Ok(block)
    }
}

/// The nearest checkpoint below (undo) or above (redo) `current_seq`.
fn neighbour_checkpoint(
    conn: &Connection,
    block_id: &BlockId,
    current_seq: i64,
    direction: HistoryDirection,
) -> Result<Option<Checkpoint>, StoreError> {
    let (op, order) = match direction {
        HistoryDirection::Undo => ("<", "DESC"),
        HistoryDirection::Redo => (">", "ASC"),
    };
    let sql = format!(
        "SELECT {CHECKPOINT_COLUMNS} FROM block_history \
         WHERE block_id=?1 AND sequence_number {op} ?2 \
         ORDER BY sequence_number {order} \
         LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![block_id.as_str(), current_seq])?;
    match rows.next()? {
        Some(row) => Ok(Some(checkpoint_from_row(row)?)),
        None => Ok(None),
    }
}
