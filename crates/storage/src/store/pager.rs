#![forbid(unsafe_code)]

//! Keyset pagination over `(created_at_ms, id)`.
//!
//! A cursor is the id of a row seen on a previous page. It is resolved to its
//! sort position with a point lookup and turned into a strict tuple
//! comparison, so pages stay stable while rows are inserted or deleted
//! elsewhere in the collection. Rows sharing a timestamp (coarse clocks,
//! batch inserts) are ordered by id, which keeps the order total.

use super::StoreError;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};

pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// One page of a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Id of the last item when the page came back full; pass it as `after`
    /// to fetch the next page. `None` once the listing is exhausted.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub(super) fn from_items(items: Vec<T>, limit: Option<usize>, id_of: impl Fn(&T) -> &str) -> Self {
        let full = limit.is_some_and(|limit| items.len() >= limit);
        let next_cursor = if full {
            items.last().map(|item| id_of(item).to_string())
        } else {
            None
        };
        Self { items, next_cursor }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CursorEdge {
    After,
    Before,
}

/// Sort position of a resolved cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct SortPosition {
    pub(super) created_at_ms: i64,
    pub(super) id: String,
}

/// Looks up the sort position of `id` in `table`.
///
/// `None` when the row is gone or belongs to another organization; callers
/// then drop the cursor instead of failing.
pub(super) fn resolve_cursor(
    conn: &Connection,
    table: &'static str,
    organization: &str,
    id: &str,
) -> Result<Option<SortPosition>, StoreError> {
    let sql = format!("SELECT created_at_ms, id FROM {table} WHERE id=?1 AND organization=?2");
    Ok(conn
        .query_row(&sql, params![id, organization], |row| {
            Ok(SortPosition {
                created_at_ms: row.get(0)?,
                id: row.get(1)?,
            })
        })
        .optional()?)
}

/// Comparison operator that keeps rows strictly on the far side of a cursor.
fn keyset_operator(edge: CursorEdge, ascending: bool) -> &'static str {
    match (edge, ascending) {
        (CursorEdge::After, true) | (CursorEdge::Before, false) => ">",
        (CursorEdge::After, false) | (CursorEdge::Before, true) => "<",
    }
}

/// Incrementally assembled `SELECT` with positional parameters.
///
/// Parameters are bound in the order clauses are added, which is also the
/// order their placeholders appear in the generated SQL.
#[derive(Debug)]
pub(super) struct PageQuery {
    alias: &'static str,
    table: &'static str,
    columns: &'static str,
    joins: Vec<String>,
    clauses: Vec<String>,
    params: Vec<Value>,
    distinct: bool,
}

impl PageQuery {
    pub(super) fn new(table: &'static str, alias: &'static str, columns: &'static str) -> Self {
        Self {
            alias,
            table,
            columns,
            joins: Vec::new(),
            clauses: Vec::new(),
            params: Vec::new(),
            distinct: false,
        }
    }

    pub(super) fn alias(&self) -> &'static str {
        self.alias
    }

    /// Adds a parameterless join.
    pub(super) fn join(&mut self, sql: impl Into<String>) {
        self.joins.push(sql.into());
    }

    pub(super) fn filter(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    /// Collapses duplicate rows produced by one-to-many joins.
    pub(super) fn distinct(&mut self) {
        self.distinct = true;
    }

    /// Restricts rows to those strictly after/before `position` in the
    /// listing's sort order.
    pub(super) fn keyset(&mut self, position: &SortPosition, edge: CursorEdge, ascending: bool) {
        let op = keyset_operator(edge, ascending);
        let alias = self.alias;
        self.filter(
            format!(
                "({alias}.created_at_ms {op} ? OR ({alias}.created_at_ms = ? AND {alias}.id {op} ?))"
            ),
            [
                Value::Integer(position.created_at_ms),
                Value::Integer(position.created_at_ms),
                Value::Text(position.id.clone()),
            ],
        );
    }

    /// Resolves and applies the `after` / `before` cursors.
    pub(super) fn cursors(
        &mut self,
        conn: &Connection,
        organization: &str,
        after: Option<&str>,
        before: Option<&str>,
        ascending: bool,
    ) -> Result<(), StoreError> {
        for (edge, cursor) in [(CursorEdge::After, after), (CursorEdge::Before, before)] {
            let Some(cursor) = cursor.map(str::trim).filter(|value| !value.is_empty()) else {
                continue;
            };
            match resolve_cursor(conn, self.table, organization, cursor)? {
                Some(position) => self.keyset(&position, edge, ascending),
                None => {
                    tracing::debug!(
                        table = self.table,
                        cursor,
                        ?edge,
                        "cursor does not resolve, listing without it"
                    );
                }
            }
        }
        Ok(())
    }

    /// Renders the statement and its parameters.
    ///
    /// With `DISTINCT` the projection already contains both sort columns, so
    /// de-duplication happens on whole rows and the `ORDER BY` stays valid.
    pub(super) fn build(mut self, ascending: bool, limit: Option<usize>) -> Result<(String, Vec<Value>), StoreError> {
        let alias = self.alias;
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(self.columns);
        sql.push_str(" FROM ");
        sql.push_str(self.table);
        sql.push(' ');
        sql.push_str(alias);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        let direction = if ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(
            " ORDER BY {alias}.created_at_ms {direction}, {alias}.id {direction}"
        ));
        if let Some(limit) = limit {
            if limit == 0 {
                return Err(StoreError::InvalidInput("limit must be > 0"));
            }
            sql.push_str(" LIMIT ?");
            self.params.push(Value::Integer(super::to_sqlite_i64(limit)?));
        }
        Ok((sql, self.params))
    }
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards in the needle
/// escaped. Pair with `ESCAPE '\'`.
pub(super) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// `?, ?, ?` for an `IN (...)` list of `len` items.
pub(super) fn placeholders(len: usize) -> String {
    vec!["?"; len].join(", ")
}
