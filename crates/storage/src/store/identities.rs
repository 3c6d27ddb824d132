#![forbid(unsafe_code)]

use super::blocks::require_block;
use super::{
    CreateIdentityRequest, LinkIdentityBlockRequest, SqliteStore, StoreError, canonicalize_block,
    canonicalize_identity, canonicalize_organization, ensure_organization_tx, generate_id,
    is_constraint_violation,
};
use mb_core::Identity;
use rusqlite::{OptionalExtension, params};

impl SqliteStore {
    /// Registers an identity. `identifier_key` is unique per organization.
    pub fn create_identity(&mut self, request: CreateIdentityRequest) -> Result<Identity, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let identity_id = match request.identity_id.as_deref() {
            Some(raw) => canonicalize_identity(raw)?,
            None => canonicalize_identity(&generate_id("identity"))?,
        };
        let identifier_key = request.identifier_key.trim().to_string();
        if identifier_key.is_empty() {
            return Err(StoreError::InvalidInput("identifier_key must not be empty"));
        }
        let now_ms = self.now_ms();
        let created_at_ms = request
            .created_at_ms
            .map(|ts| self.normalize_ts(ts))
            .unwrap_or(now_ms);

        let tx = self.write_tx()?;
        ensure_organization_tx(&tx, &organization_id, now_ms)?;
        let insert = tx.execute(
            "INSERT INTO identities(id, organization, identifier_key, name, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                identity_id.as_str(),
                organization_id.as_str(),
                identifier_key,
                request.name,
                created_at_ms
            ],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::InvalidInput("identity already exists"));
            }
            return Err(StoreError::Sql(err));
        }
        tx.commit()?;

        Ok(Identity {
            id: identity_id,
            organization_id,
            identifier_key,
            name: request.name,
            created_at_ms,
        })
    }

    /// Links a block to an identity. Linking twice is a no-op.
    pub fn link_identity_block(&mut self, request: LinkIdentityBlockRequest) -> Result<(), StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let identity_id = canonicalize_identity(&request.identity_id)?;
        let block_id = canonicalize_block(&request.block_id)?;

        let tx = self.write_tx()?;
        let identity_exists = tx
            .query_row(
                "SELECT 1 FROM identities WHERE id=?1 AND organization=?2",
                params![identity_id.as_str(), organization_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !identity_exists {
            return Err(StoreError::NotFound {
                kind: "identity",
                id: identity_id.as_str().to_string(),
            });
        }
        require_block(&tx, &organization_id, &block_id)?;

        tx.execute(
            "INSERT OR IGNORE INTO identities_blocks(identity_id, block_id) VALUES (?1, ?2)",
            params![identity_id.as_str(), block_id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }
}
