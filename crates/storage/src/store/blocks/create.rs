#![forbid(unsafe_code)]

use super::super::{
    CreateBlockRequest, SqliteStore, StoreError, canonicalize_block, canonicalize_organization,
    ensure_organization_tx, generate_id, is_constraint_violation, to_sqlite_i64,
};
use super::{clamp_logged, encode_metadata};
use mb_core::Block;
use mb_core::ids::OrganizationId;
use rusqlite::{Transaction, params};

impl SqliteStore {
    /// Creates a block without taking a checkpoint.
    pub fn create_block(&mut self, request: CreateBlockRequest) -> Result<Block, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let now_ms = self.now_ms();
        let default_limit = self.config.default_block_limit;
        let created_at_ms = request
            .created_at_ms
            .map(|ts| self.normalize_ts(ts))
            .unwrap_or(now_ms);

        let tx = self.write_tx()?;
        ensure_organization_tx(&tx, &organization_id, now_ms)?;
        let block = insert_block_tx(
            &tx,
            &organization_id,
            request,
            default_limit,
            created_at_ms,
        )?;
        tx.commit()?;

        tracing::debug!(block_id = %block.id, label = %block.label, "block created");
        Ok(block)
    }

    /// Creates several blocks in one transaction; any failure creates none.
    pub fn batch_create_blocks(
        &mut self,
        requests: Vec<CreateBlockRequest>,
    ) -> Result<Vec<Block>, StoreError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let now_ms = self.now_ms();
        let default_limit = self.config.default_block_limit;
        let prepared = requests
            .into_iter()
            .map(|request| {
                let organization_id = canonicalize_organization(&request.organization_id)?;
                let created_at_ms = request
                    .created_at_ms
                    .map(|ts| self.normalize_ts(ts))
                    .unwrap_or(now_ms);
                Ok((organization_id, created_at_ms, request))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let tx = self.write_tx()?;
        let mut out = Vec::with_capacity(prepared.len());
        for (organization_id, created_at_ms, request) in prepared {
            ensure_organization_tx(&tx, &organization_id, now_ms)?;
            out.push(insert_block_tx(
                &tx,
                &organization_id,
                request,
                default_limit,
                created_at_ms,
            )?);
        }
        tx.commit()?;

        tracing::debug!(count = out.len(), "blocks created in batch");
        Ok(out)
    }
}

fn insert_block_tx(
    tx: &Transaction<'_>,
    organization_id: &OrganizationId,
    request: CreateBlockRequest,
    default_limit: usize,
    created_at_ms: i64,
) -> Result<Block, StoreError> {
    let block_id = match request.block_id.as_deref() {
        Some(raw) => canonicalize_block(raw)?,
        None => canonicalize_block(&generate_id("block"))?,
    };
    let label = request.label.trim().to_string();
    if label.is_empty() {
        return Err(StoreError::InvalidInput("label must not be empty"));
    }
    let limit = request.limit.unwrap_or(default_limit);
    let metadata = request
        .metadata
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    let (value, _) = clamp_logged(&block_id, request.value, limit);

    let block = Block {
        id: block_id,
        organization_id: organization_id.clone(),
        label,
        description: request.description,
        value,
        limit,
        metadata,
        is_template: request.is_template,
        template_name: request.template_name,
        project_id: request.project_id,
        current_history_id: None,
        version: 1,
        last_updated_by: Some(request.actor.id().to_string()),
        created_at_ms,
        updated_at_ms: created_at_ms,
    };

    let insert = tx.execute(
        r#"
        INSERT INTO blocks(id, organization, label, description, value, value_limit, metadata_json,
                           is_template, template_name, project_id, current_history_id, version,
                           last_updated_by, created_at_ms, updated_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11, ?12, ?13, ?14)
        "#,
        params![
            block.id.as_str(),
            block.organization_id.as_str(),
            block.label,
            block.description,
            block.value,
            to_sqlite_i64(block.limit)?,
            encode_metadata(&block.metadata)?,
            i64::from(block.is_template),
            block.template_name,
            block.project_id,
            block.version,
            block.last_updated_by,
            block.created_at_ms,
            block.updated_at_ms,
        ],
    );

    if let Err(err) = insert {
        if is_constraint_violation(&err) {
            return Err(StoreError::InvalidInput("block already exists"));
        }
        return Err(StoreError::Sql(err));
    }

    Ok(block)
}
