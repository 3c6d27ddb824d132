#![forbid(unsafe_code)]

use super::super::blocks::write_block_tx;
use super::super::{BlockHistoryRequest, SqliteStore, StoreError, canonicalize_block, canonicalize_organization, generate_id};
use super::{checkpoint_sequence, insert_checkpoint_tx, session_block_tx};
use mb_core::ids::CheckpointId;
use mb_core::{Block, Checkpoint};
use rusqlite::params;

impl SqliteStore {
    /// Saves the block's current fields as a new checkpoint and points the
    /// block at it.
    ///
    /// When the block sits below the top of its history (after an undo),
    /// every later checkpoint is deleted first, so the new checkpoint always
    /// gets `current + 1` and nothing is left to redo.
    #[tracing::instrument(skip_all, fields(block_id = %request.block_id, actor = request.actor.id()))]
    pub fn checkpoint_block(&mut self, request: BlockHistoryRequest) -> Result<Block, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let block_id = canonicalize_block(&request.block_id)?;
        let now_ms = self.now_ms();

        let tx = self.write_tx()?;
        let mut block = session_block_tx(&tx, &organization_id, &block_id, request.preloaded)?;

        let current_seq = match block.current_history_id.as_ref() {
            Some(current) => checkpoint_sequence(&tx, &block_id, current)?.unwrap_or(0),
            None => 0,
        };

        let pruned = tx.execute(
            "DELETE FROM block_history WHERE block_id=?1 AND sequence_number > ?2",
            params![block_id.as_str(), current_seq],
        )?;

        let checkpoint_id = CheckpointId::try_new(generate_id("block_history"))
            .map_err(|_| StoreError::InvalidInput("invalid checkpoint id"))?;
        let checkpoint = Checkpoint {
            id: checkpoint_id,
            block_id: block_id.clone(),
            sequence_number: current_seq + 1,
            fields: block.fields(),
            actor_kind: request.actor.kind(),
            actor_id: request.actor.id().to_string(),
            created_at_ms: now_ms,
        };
        insert_checkpoint_tx(&tx, &organization_id, &checkpoint)?;

        block.current_history_id = Some(checkpoint.id.clone());
        let block = write_block_tx(&tx, &block, &request.actor, now_ms)?;
        tx.commit()?;

        tracing::debug!(
            sequence = checkpoint.sequence_number,
            pruned,
            "checkpoint created"
        );
        Ok(block)
    }
}
