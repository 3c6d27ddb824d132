#![forbid(unsafe_code)]

use mb_core::HistoryDirection;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("{kind} not found (id={id})")]
    NotFound { kind: &'static str, id: String },
    #[error("block has no history (block_id={block_id})")]
    NoHistory { block_id: String },
    #[error("cannot {direction} past checkpoint (block_id={block_id}, seq={sequence})")]
    AtBoundary {
        block_id: String,
        direction: HistoryDirection,
        sequence: i64,
    },
    #[error(
        "concurrent modification (block_id={block_id}, expected_version={expected}, actual_version={actual})"
    )]
    ConcurrentModification {
        block_id: String,
        expected: i64,
        actual: i64,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQL",
            Self::InvalidInput(message) if message.starts_with("RESET_REQUIRED") => {
                "RESET_REQUIRED"
            }
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::NoHistory { .. } => "NO_HISTORY",
            Self::AtBoundary { .. } => "AT_BOUNDARY",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
        }
    }

    pub(crate) fn block_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "block",
            id: id.into(),
        }
    }
}
