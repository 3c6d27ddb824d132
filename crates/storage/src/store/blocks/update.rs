#![forbid(unsafe_code)]

use super::super::{
    SqliteStore, StoreError, UpdateBlockRequest, canonicalize_block, canonicalize_organization,
};
use super::{clamp_logged, require_block, write_block_tx};
use mb_core::Block;
use rusqlite::params;

impl SqliteStore {
    /// Applies a partial update. No checkpoint is taken; call
    /// [`SqliteStore::checkpoint_block`] to save the new state.
    #[tracing::instrument(skip_all, fields(block_id = %request.block_id))]
    pub fn update_block(&mut self, request: UpdateBlockRequest) -> Result<Block, StoreError> {
        if request.is_empty() {
            return Err(StoreError::InvalidInput("no fields to edit"));
        }
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let block_id = canonicalize_block(&request.block_id)?;
        if let Some(label) = request.label.as_deref()
            && label.trim().is_empty()
        {
            return Err(StoreError::InvalidInput("label must not be empty"));
        }

        let now_ms = self.now_ms();
        let tx = self.write_tx()?;
        let mut block = require_block(&tx, &organization_id, &block_id)?;

        if let Some(expected) = request.expected_version
            && expected != block.version
        {
            return Err(StoreError::ConcurrentModification {
                block_id: block_id.as_str().to_string(),
                expected,
                actual: block.version,
            });
        }

        if let Some(label) = request.label {
            block.label = label.trim().to_string();
        }
        if let Some(description) = request.description {
            block.description = description;
        }
        if let Some(limit) = request.limit {
            block.limit = limit;
        }
        if let Some(metadata) = request.metadata {
            block.metadata = metadata;
        }
        if let Some(is_template) = request.is_template {
            block.is_template = is_template;
        }
        if let Some(template_name) = request.template_name {
            block.template_name = template_name;
        }
        if let Some(project_id) = request.project_id {
            block.project_id = project_id;
        }
        let value = request.value.unwrap_or_else(|| std::mem::take(&mut block.value));
        block.value = clamp_logged(&block.id, value, block.limit).0;

        let block = write_block_tx(&tx, &block, &request.actor, now_ms)?;
        tx.commit()?;
        Ok(block)
    }

    /// Hard-deletes a block together with its checkpoints and every agent or
    /// identity association.
    pub fn delete_block(&mut self, organization_id: &str, block_id: &str) -> Result<(), StoreError> {
        let organization_id = canonicalize_organization(organization_id)?;
        let block_id = canonicalize_block(block_id)?;

        let tx = self.write_tx()?;
        let deleted = tx.execute(
            "DELETE FROM blocks WHERE id=?1 AND organization=?2",
            params![block_id.as_str(), organization_id.as_str()],
        )?;
        if deleted == 0 {
            return Err(StoreError::block_not_found(block_id.as_str()));
        }
        tx.commit()?;

        tracing::debug!(block_id = %block_id, "block deleted");
        Ok(())
    }
}
