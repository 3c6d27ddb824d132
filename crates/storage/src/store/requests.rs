#![forbid(unsafe_code)]

use super::pager::DEFAULT_PAGE_LIMIT;
use mb_core::ids::BlockId;
use mb_core::{Actor, Block};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct CreateBlockRequest {
    pub organization_id: String,
    /// Generated as `block-<uuid>` when absent.
    pub block_id: Option<String>,
    pub label: String,
    pub description: Option<String>,
    pub value: String,
    /// Falls back to the store's default block limit.
    pub limit: Option<usize>,
    pub metadata: Option<JsonValue>,
    pub is_template: bool,
    pub template_name: Option<String>,
    pub project_id: Option<String>,
    pub actor: Actor,
    /// Defaults to the current time.
    pub created_at_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateBlockRequest {
    pub organization_id: String,
    pub block_id: String,
    pub expected_version: Option<i64>,
    pub label: Option<String>,
    pub description: Option<Option<String>>,
    pub value: Option<String>,
    pub limit: Option<usize>,
    pub metadata: Option<JsonValue>,
    pub is_template: Option<bool>,
    pub template_name: Option<Option<String>>,
    pub project_id: Option<Option<String>>,
    pub actor: Actor,
}

impl UpdateBlockRequest {
    /// An update of `block_id` that changes nothing yet.
    pub fn new(organization_id: impl Into<String>, block_id: impl Into<String>, actor: Actor) -> Self {
        Self {
            organization_id: organization_id.into(),
            block_id: block_id.into(),
            expected_version: None,
            label: None,
            description: None,
            value: None,
            limit: None,
            metadata: None,
            is_template: None,
            template_name: None,
            project_id: None,
            actor,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.description.is_none()
            && self.value.is_none()
            && self.limit.is_none()
            && self.metadata.is_none()
            && self.is_template.is_none()
            && self.template_name.is_none()
            && self.project_id.is_none()
    }
}

/// Input of checkpoint, undo and redo.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockHistoryRequest {
    pub organization_id: String,
    pub block_id: String,
    pub actor: Actor,
    /// A copy of the block the caller already holds. It is merged into the
    /// transaction in place of the stored row; its `version` is what the
    /// final write is checked against.
    pub preloaded: Option<Block>,
}

impl BlockHistoryRequest {
    pub fn new(organization_id: impl Into<String>, block_id: impl Into<String>, actor: Actor) -> Self {
        Self {
            organization_id: organization_id.into(),
            block_id: block_id.into(),
            actor,
            preloaded: None,
        }
    }

    pub fn with_preloaded(mut self, block: Block) -> Self {
        self.preloaded = Some(block);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkUpdateValuesRequest {
    pub organization_id: String,
    /// block id -> new value
    pub updates: BTreeMap<String, String>,
    pub actor: Actor,
}

/// What a bulk value write did. Missing ids and oversized values never fail
/// the call; they are only reported here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkUpdateReport {
    pub updated: Vec<BlockId>,
    pub truncated: Vec<BlockId>,
    pub skipped: Vec<String>,
}

/// Optional predicates for [`ListBlocksRequest`]; all set filters are ANDed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockFilters {
    pub label: Option<String>,
    pub is_template: Option<bool>,
    pub template_name: Option<String>,
    pub project_id: Option<String>,
    /// Substring match on the label; ignored when `label` is set.
    pub label_search: Option<String>,
    pub description_search: Option<String>,
    pub value_search: Option<String>,
    pub identity_id: Option<String>,
    pub identifier_keys: Option<Vec<String>>,
    pub connected_to_agents_count_gt: Option<i64>,
    pub connected_to_agents_count_lt: Option<i64>,
    pub connected_to_agents_count_eq: Option<Vec<i64>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListBlocksRequest {
    pub organization_id: String,
    pub filters: BlockFilters,
    pub after: Option<String>,
    pub before: Option<String>,
    /// `None` lists everything.
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl ListBlocksRequest {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            filters: BlockFilters::default(),
            after: None,
            before: None,
            limit: Some(DEFAULT_PAGE_LIMIT),
            ascending: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateAgentRequest {
    pub organization_id: String,
    pub agent_id: Option<String>,
    pub name: String,
    pub created_at_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachBlockRequest {
    pub organization_id: String,
    pub agent_id: String,
    pub block_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListAgentsForBlockRequest {
    pub organization_id: String,
    pub block_id: String,
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<usize>,
    pub ascending: bool,
}

impl ListAgentsForBlockRequest {
    pub fn new(organization_id: impl Into<String>, block_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            block_id: block_id.into(),
            after: None,
            before: None,
            limit: Some(DEFAULT_PAGE_LIMIT),
            ascending: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateIdentityRequest {
    pub organization_id: String,
    pub identity_id: Option<String>,
    pub identifier_key: String,
    pub name: String,
    pub created_at_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkIdentityBlockRequest {
    pub organization_id: String,
    pub identity_id: String,
    pub block_id: String,
}
