#![forbid(unsafe_code)]

use crate::ActorKind;
use crate::ids::{BlockId, CheckpointId, OrganizationId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default maximum length of a block value, in characters.
pub const DEFAULT_BLOCK_LIMIT: usize = 20_000;

/// The part of a block that a checkpoint captures and undo/redo restores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockFields {
    pub label: String,
    pub description: Option<String>,
    pub value: String,
    pub limit: usize,
    pub metadata: JsonValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub organization_id: OrganizationId,
    pub label: String,
    pub description: Option<String>,
    pub value: String,
    pub limit: usize,
    pub metadata: JsonValue,
    pub is_template: bool,
    pub template_name: Option<String>,
    pub project_id: Option<String>,
    /// Checkpoint holding the last saved state; `None` until the first checkpoint.
    pub current_history_id: Option<CheckpointId>,
    /// Optimistic concurrency token, bumped by every write.
    pub version: i64,
    pub last_updated_by: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Block {
    pub fn fields(&self) -> BlockFields {
        BlockFields {
            label: self.label.clone(),
            description: self.description.clone(),
            value: self.value.clone(),
            limit: self.limit,
            metadata: self.metadata.clone(),
        }
    }

    pub fn apply_fields(&mut self, fields: BlockFields) {
        self.label = fields.label;
        self.description = fields.description;
        self.value = fields.value;
        self.limit = fields.limit;
        self.metadata = fields.metadata;
    }
}

/// Immutable snapshot of a block at one point of its edit history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub block_id: BlockId,
    pub sequence_number: i64,
    pub fields: BlockFields,
    pub actor_kind: ActorKind,
    pub actor_id: String,
    pub created_at_ms: i64,
}

/// Direction of a move through a block's checkpoint stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HistoryDirection {
    Undo,
    Redo,
}

impl HistoryDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryDirection::Undo => "undo",
            HistoryDirection::Redo => "redo",
        }
    }
}

impl std::fmt::Display for HistoryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of fitting a value into a block's limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClampedValue {
    pub value: String,
    /// Original length in characters when the value had to be cut.
    pub truncated_from: Option<usize>,
}

/// Cuts `value` down to at most `limit` characters.
///
/// Lengths are counted in Unicode scalar values so a cut never lands inside
/// a multi-byte character.
pub fn clamp_value(value: String, limit: usize) -> ClampedValue {
    match value.char_indices().nth(limit) {
        None => ClampedValue {
            value,
            truncated_from: None,
        },
        Some((byte_end, _)) => {
            let original = value.chars().count();
            let mut value = value;
            value.truncate(byte_end);
            ClampedValue {
                value,
                truncated_from: Some(original),
            }
        }
    }
}
