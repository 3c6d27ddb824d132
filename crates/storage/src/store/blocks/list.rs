#![forbid(unsafe_code)]

use super::super::pager::{PageQuery, contains_pattern, placeholders};
use super::super::{
    BlockFilters, ListBlocksRequest, Page, SqliteStore, StoreError, canonicalize_organization,
};
use super::{BLOCK_COLUMNS, block_from_row};
use mb_core::Block;
use rusqlite::params_from_iter;
use rusqlite::types::Value;

/// Per-block attachment counts; blocks with no agents have no row here.
const AGENT_COUNT_SUBQUERY: &str = "(SELECT block_id, COUNT(agent_id) AS agent_count \
     FROM blocks_agents GROUP BY block_id) ac";

impl SqliteStore {
    /// Lists blocks ordered by `(created_at_ms, id)`, one page at a time.
    ///
    /// Cursors that do not resolve (deleted row, other organization) are
    /// ignored rather than rejected.
    #[tracing::instrument(skip_all, fields(organization_id = %request.organization_id))]
    pub fn list_blocks(&self, request: ListBlocksRequest) -> Result<Page<Block>, StoreError> {
        let organization_id = canonicalize_organization(&request.organization_id)?;

        let mut query = PageQuery::new("blocks", "b", BLOCK_COLUMNS);
        query.filter(
            "b.organization = ?",
            [Value::Text(organization_id.as_str().to_string())],
        );
        apply_block_filters(&mut query, &request.filters);
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
            out.push(block_from_row(row)?);
        }

        Ok(Page::from_items(out, request.limit, |block| block.id.as_str()))
    }
}

fn apply_block_filters(query: &mut PageQuery, filters: &BlockFilters) {
    let b = query.alias();

    if let Some(label) = filters.label.as_deref() {
        query.filter(format!("{b}.label = ?"), [Value::Text(label.to_string())]);
    } else if let Some(needle) = filters.label_search.as_deref() {
        query.filter(
            format!("{b}.label LIKE ? ESCAPE '\\'"),
            [Value::Text(contains_pattern(needle))],
        );
    }
    if let Some(is_template) = filters.is_template {
        query.filter(
            format!("{b}.is_template = ?"),
            [Value::Integer(i64::from(is_template))],
        );
    }
    if let Some(template_name) = filters.template_name.as_deref() {
        query.filter(
            format!("{b}.template_name = ?"),
            [Value::Text(template_name.to_string())],
        );
    }
    if let Some(project_id) = filters.project_id.as_deref() {
        query.filter(
            format!("{b}.project_id = ?"),
            [Value::Text(project_id.to_string())],
        );
    }
    if let Some(needle) = filters.description_search.as_deref() {
        query.filter(
            format!("{b}.description LIKE ? ESCAPE '\\'"),
            [Value::Text(contains_pattern(needle))],
        );
    }
    if let Some(needle) = filters.value_search.as_deref() {
        query.filter(
            format!("{b}.value LIKE ? ESCAPE '\\'"),
            [Value::Text(contains_pattern(needle))],
        );
    }

    apply_agent_count_filters(query, filters);

    if let Some(keys) = filters.identifier_keys.as_ref().filter(|keys| !keys.is_empty()) {
        query.join(format!("JOIN identities_blocks ibk ON ibk.block_id = {b}.id"));
        query.join("JOIN identities ik ON ik.id = ibk.identity_id");
        query.filter(
            format!("ik.identifier_key IN ({})", placeholders(keys.len())),
            keys.iter().map(|key| Value::Text(key.clone())),
        );
        query.distinct();
    }
    if let Some(identity_id) = filters.identity_id.as_deref() {
        query.join(format!("JOIN identities_blocks ibi ON ibi.block_id = {b}.id"));
        query.filter(
            "ibi.identity_id = ?",
            [Value::Text(identity_id.trim().to_string())],
        );
        query.distinct();
    }
}

/// Filters on the number of agents a block is attached to.
///
/// Blocks attached to no agent have no row in the aggregate, so whenever a
/// threshold can admit a count of zero (any `lt`, a negative `gt`, an `eq`
/// list containing 0) the aggregate is outer-joined and a missing count
/// reads as 0. An inner join would silently drop those blocks.
fn apply_agent_count_filters(query: &mut PageQuery, filters: &BlockFilters) {
    let gt = filters.connected_to_agents_count_gt;
    let lt = filters.connected_to_agents_count_lt;
    let eq = filters.connected_to_agents_count_eq.as_ref();
    if gt.is_none() && lt.is_none() && eq.is_none() {
        return;
    }

    let b = query.alias();
    let needs_zero = gt.is_some_and(|gt| gt < 0)
        || lt.is_some()
        || eq.is_some_and(|values| values.contains(&0));
    let count = if needs_zero {
        query.join(format!(
            "LEFT JOIN {AGENT_COUNT_SUBQUERY} ON ac.block_id = {b}.id"
        ));
        "COALESCE(ac.agent_count, 0)"
    } else {
        query.join(format!("JOIN {AGENT_COUNT_SUBQUERY} ON ac.block_id = {b}.id"));
        "ac.agent_count"
    };

    if let Some(gt) = gt {
        query.filter(format!("{count} > ?"), [Value::Integer(gt)]);
    }
    if let Some(lt) = lt {
        query.filter(format!("{count} < ?"), [Value::Integer(lt)]);
    }
    if let Some(eq) = eq {
        if eq.is_empty() {
            query.filter("0 = 1", std::iter::empty());
        } else {
            query.filter(
                format!("{count} IN ({})", placeholders(eq.len())),
                eq.iter().map(|value| Value::Integer(*value)),
            );
        }
    }
    query.distinct();
}
