#![forbid(unsafe_code)]

mod agents;
mod blocks;
mod config;
mod error;
mod history;
mod identities;
mod pager;
mod requests;
mod schema;

pub use config::{StoreConfig, resolve_data_dir};
pub use error::StoreError;
pub use pager::{DEFAULT_PAGE_LIMIT, Page};
pub use requests::*;

use mb_core::ids::{AgentId, BlockId, IdentityId, OrganizationId};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior, params};
use std::path::Path;

const DB_FILE_NAME: &str = "memblocks.db";

/// Block store backed by a single SQLite connection.
///
/// Each mutating call runs in its own transaction; dropping a transaction on
/// an error path rolls it back, so a failed call leaves nothing behind.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(StoreConfig::new(storage_dir))
    }

    pub fn open_with_config(config: StoreConfig) -> Result<Self, StoreError> {
        if config.timestamp_granularity_ms < 1 {
            return Err(StoreError::InvalidInput(
                "timestamp_granularity_ms must be >= 1",
            ));
        }
        std::fs::create_dir_all(&config.storage_dir)?;

        let db_path = config.storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        schema::preflight_gate(&conn)?;
        schema::install_schema(&conn)?;

        tracing::debug!(storage_dir = %config.storage_dir.display(), "block store opened");
        Ok(Self { conn, config })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Starts a write transaction that holds the database write lock from its
    /// first statement, so the read half of a read-mutate-write cycle cannot
    /// interleave with another connection's write.
    fn write_tx(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Current time rounded down to the configured timestamp granularity.
    fn now_ms(&self) -> i64 {
        self.normalize_ts(now_ms())
    }

    fn normalize_ts(&self, ts_ms: i64) -> i64 {
        let granularity = self.config.timestamp_granularity_ms;
        if granularity <= 1 {
            ts_ms
        } else {
            ts_ms - ts_ms.rem_euclid(granularity)
        }
    }
}

fn ensure_organization_tx(
    tx: &Transaction<'_>,
    organization_id: &OrganizationId,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO organizations(organization, created_at_ms) VALUES (?1, ?2)",
        params![organization_id.as_str(), now_ms],
    )?;
    Ok(())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn from_sqlite_usize(value: i64) -> Result<usize, StoreError> {
    usize::try_from(value).map_err(|_| StoreError::InvalidInput("negative value in row"))
}

fn canonicalize_organization(value: &str) -> Result<OrganizationId, StoreError> {
    OrganizationId::try_new(value.trim())
        .map_err(|_| StoreError::InvalidInput("invalid organization_id"))
}

fn canonicalize_block(value: &str) -> Result<BlockId, StoreError> {
    BlockId::try_new(value.trim()).map_err(|_| StoreError::InvalidInput("invalid block_id"))
}

fn canonicalize_agent(value: &str) -> Result<AgentId, StoreError> {
    AgentId::try_new(value.trim()).map_err(|_| StoreError::InvalidInput("invalid agent_id"))
}

fn canonicalize_identity(value: &str) -> Result<IdentityId, StoreError> {
    IdentityId::try_new(value.trim()).map_err(|_| StoreError::InvalidInput("invalid identity_id"))
}

/// Generates a prefixed random id such as `block-6f1c...`.
fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = generate_id("block");
        let b = generate_id("block");
        assert!(a.starts_with("block-"));
        assert_ne!(a, b);
        assert!(BlockId::try_new(a).is_ok());
    }

    #[test]
    fn canonicalize_trims_and_validates() {
        assert_eq!(canonicalize_block("  block-1 ").unwrap().as_str(), "block-1");
        assert!(matches!(
            canonicalize_block("   "),
            Err(StoreError::InvalidInput("invalid block_id"))
        ));
        assert!(matches!(
            canonicalize_organization("-bad"),
            Err(StoreError::InvalidInput("invalid organization_id"))
        ));
    }

    #[test]
    fn sqlite_integer_conversions_reject_out_of_range() {
        assert_eq!(to_sqlite_i64(7).unwrap(), 7);
        assert_eq!(from_sqlite_usize(7).unwrap(), 7);
        assert!(from_sqlite_usize(-1).is_err());
    }
}
