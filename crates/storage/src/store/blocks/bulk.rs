#![forbid(unsafe_code)]

use super::super::{
    BulkUpdateReport, BulkUpdateValuesRequest, SqliteStore, StoreError, canonicalize_organization,
};
use super::{clamp_logged, load_block, write_block_tx};
use mb_core::ids::BlockId;

impl SqliteStore {
    /// Overwrites the value of many blocks in one transaction.
    ///
    /// This is a direct-write path: no checkpoint is taken. Ids that do not
    /// resolve are skipped and values longer than their block's limit are
    /// cut to the limit; both are logged at warn level and reported, never
    /// returned as errors.
    #[tracing::instrument(skip_all, fields(count = request.updates.len()))]
    pub fn bulk_update_block_values(
        &mut self,
        request: BulkUpdateValuesRequest,
    ) -> Result<BulkUpdateReport, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let mut report = BulkUpdateReport::default();
        if request.updates.is_empty() {
            return Ok(report);
        }

        let now_ms = self.now_ms();
        let tx = self.write_tx()?;
        for (raw_id, value) in request.updates {
            let block = match BlockId::try_new(raw_id.trim()) {
                Ok(block_id) => load_block(&tx, &organization_id, &block_id)?,
                Err(_) => None,
            };
            let Some(mut block) = block else {
                report.skipped.push(raw_id);
                continue;
            };

            let (value, truncated) = clamp_logged(&block.id, value, block.limit);
            block.value = value;
            let block = write_block_tx(&tx, &block, &request.actor, now_ms)?;
            if truncated {
                report.truncated.push(block.id.clone());
            }
            report.updated.push(block.id);
        }
        tx.commit()?;

        if !report.skipped.is_empty() {
            tracing::warn!(
                missing = ?report.skipped,
                "block ids not found or inaccessible, skipping during bulk update"
            );
        }
        Ok(report)
    }
}
