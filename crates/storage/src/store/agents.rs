#![forbid(unsafe_code)]

use super::blocks::require_block;
use super::pager::PageQuery;
use super::{
    AttachBlockRequest, CreateAgentRequest, ListAgentsForBlockRequest, Page, SqliteStore,
    StoreError, canonicalize_agent, canonicalize_block, canonicalize_organization,
    ensure_organization_tx, generate_id, is_constraint_violation,
};
use mb_core::Agent;
use mb_core::ids::{AgentId, OrganizationId};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

const AGENT_COLUMNS: &str = "a.id, a.organization, a.name, a.created_at_ms";

impl SqliteStore {
    pub fn create_agent(&mut self, request: CreateAgentRequest) -> Result<Agent, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let agent_id = match request.agent_id.as_deref() {
            Some(raw) => canonicalize_agent(raw)?,
            None => canonicalize_agent(&generate_id("agent"))?,
        };
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("agent name must not be empty"));
        }
        let now_ms = self.now_ms();
        let created_at_ms = request
            .created_at_ms
            .map(|ts| self.normalize_ts(ts))
            .unwrap_or(now_ms);

        let tx = self.write_tx()?;
        ensure_organization_tx(&tx, &organization_id, now_ms)?;
        let insert = tx.execute(
            "INSERT INTO agents(id, organization, name, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![agent_id.as_str(), organization_id.as_str(), name, created_at_ms],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::InvalidInput("agent already exists"));
            }
            return Err(StoreError::Sql(err));
        }
        tx.commit()?;

        Ok(Agent {
            id: agent_id,
            organization_id,
            name,
            created_at_ms,
        })
    }

    /// Attaches a block to an agent. Attaching the same pair twice is a no-op.
    pub fn attach_block_to_agent(&mut self, request: AttachBlockRequest) -> Result<(), StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let agent_id = canonicalize_agent(&request.agent_id)?;
        let block_id = canonicalize_block(&request.block_id)?;
        let now_ms = self.now_ms();

        let tx = self.write_tx()?;
        require_agent(&tx, &organization_id, &agent_id)?;
        let block = require_block(&tx, &organization_id, &block_id)?;

        let label_taken = tx
            .query_row(
                "SELECT 1 FROM blocks_agents ba JOIN blocks b ON b.id = ba.block_id \
                 WHERE ba.agent_id=?1 AND b.label=?2 AND b.id<>?3",
                params![agent_id.as_str(), block.label, block_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if label_taken {
            return Err(StoreError::InvalidInput(
                "agent already has a block with this label",
            ));
        }

        tx.execute(
            "INSERT OR IGNORE INTO blocks_agents(agent_id, block_id, created_at_ms) VALUES (?1, ?2, ?3)",
            params![agent_id.as_str(), block_id.as_str(), now_ms],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Detaches a block from an agent; returns whether an attachment existed.
    pub fn detach_block_from_agent(&mut self, request: AttachBlockRequest) -> Result<bool, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let agent_id = canonicalize_agent(&request.agent_id)?;
        let block_id = canonicalize_block(&request.block_id)?;

        let tx = self.write_tx()?;
        require_agent(&tx, &organization_id, &agent_id)?;
        let removed = tx.execute(
            "DELETE FROM blocks_agents WHERE agent_id=?1 AND block_id=?2",
            params![agent_id.as_str(), block_id.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Lists the agents a block is attached to, with the same keyset cursors
    /// as [`SqliteStore::list_blocks`].
    pub fn list_agents_for_block(
        &self,
        request: ListAgentsForBlockRequest,
    ) -> Result<Page<Agent>, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;
        let block_id = canonicalize_block(&request.block_id)?;
        require_block(&self.conn, &organization_id, &block_id)?;

        let mut query = PageQuery::new("agents", "a", AGENT_COLUMNS);
        query.filter(
            "a.organization = ?",
            [Value::Text(organization_id.as_str().to_string())],
        );
        query.filter(
            "a.id IN (SELECT agent_id FROM blocks_agents WHERE block_id = ?)",
            [Value::Text(block_id.as_str().to_string())],
        );
        query.cursors(
            &self.conn,
            organization_id.as_str(),
            request.after.as_deref(),
            request.before.as_deref(),
            request.ascending,
        )?;

        let (sql, params) = query.build(request.ascending, request.limit)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(agent_from_row(row)?);
        }

        Ok(Page::from_items(out, request.limit, |agent| agent.id.as_str()))
    }
}

fn require_agent(
    conn: &Connection,
    organization_id: &OrganizationId,
    agent_id: &AgentId,
) -> Result<(), StoreError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM agents WHERE id=?1 AND organization=?2",
            params![agent_id.as_str(), organization_id.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound {
            kind: "agent",
            id: agent_id.as_str().to_string(),
        })
    }
}

fn agent_from_row(row: &Row<'_>) -> Result<Agent, StoreError> {
    Ok(Agent {
        id: AgentId::try_new(row.get::<_, String>(0)?)
            .map_err(|_| StoreError::InvalidInput("invalid agent row"))?,
        organization_id: OrganizationId::try_new(row.get::<_, String>(1)?)
            .map_err(|_| StoreError::InvalidInput("invalid agent row"))?,
        name: row.get(2)?,
        created_at_ms: row.get(3)?,
    })
}
