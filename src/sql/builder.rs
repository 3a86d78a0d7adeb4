//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from entity
//! descriptors, plus the FK statements behind connect/disconnect/replace.

use crate::query::ListArgs;
use crate::schema::{EntityDescriptor, RelationKind};
use serde_json::Value;
use std::collections::HashMap;

/// Describes one eager-loaded relation for a single-query select: the related
/// entity is attached as a scalar subquery (json_agg of id objects for
/// to_many, a single id object for to_one).
pub struct IncludeSelect<'a> {
    pub name: &'a str,
    pub kind: RelationKind,
    pub related: &'a EntityDescriptor,
    pub fk_column: &'a str,
}

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from the static schema).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// Placeholder with an SQL cast when the column declares a pg type (so string
/// values bind correctly against timestamptz columns).
fn placeholder(entity: &EntityDescriptor, column: &str, n: usize) -> String {
    entity
        .column(column)
        .and_then(|c| c.pg_type)
        .map(|t| format!("${}::{}", n, t))
        .unwrap_or_else(|| format!("${}", n))
}

fn select_column_list(entity: &EntityDescriptor, alias: Option<&str>) -> String {
    entity
        .columns
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{}.{}", a, quoted(c.name)),
            None => quoted(c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn include_subquery(owner: &EntityDescriptor, inc: &IncludeSelect<'_>) -> String {
    let rel_table = quoted(inc.related.table_name);
    let rel_pk = quoted(inc.related.pk_column);
    match inc.kind {
        RelationKind::ToMany => format!(
            "(SELECT COALESCE(json_agg(json_build_object('id', sub.{pk}) ORDER BY sub.{pk}), '[]'::json) \
             FROM {table} sub WHERE sub.{fk} = {main}.{owner_pk}) AS {name}",
            pk = rel_pk,
            table = rel_table,
            fk = quoted(inc.fk_column),
            main = MAIN_ALIAS,
            owner_pk = quoted(owner.pk_column),
            name = quoted(inc.name),
        ),
        RelationKind::ToOne => format!(
            "(SELECT json_build_object('id', sub.{pk}) FROM {table} sub \
             WHERE sub.{pk} = {main}.{fk}) AS {name}",
            pk = rel_pk,
            table = rel_table,
            main = MAIN_ALIAS,
            fk = quoted(inc.fk_column),
            name = quoted(inc.name),
        ),
    }
}

fn push_filters(
    q: &mut QueryBuf,
    entity: &EntityDescriptor,
    filters: &[(String, Value)],
    alias: Option<&str>,
) -> Vec<String> {
    let mut parts = Vec::new();
    for (col, val) in filters {
        if !entity.has_column(col) {
            continue;
        }
        let n = q.push_param(val.clone());
        let lhs = match alias {
            Some(a) => format!("{}.{}", a, quoted(col)),
            None => quoted(col),
        };
        parts.push(format!("{} = {}", lhs, placeholder(entity, col, n)));
    }
    parts
}

/// SELECT by primary key, scalar columns only. Caller binds id as sole param.
pub fn select_by_id(entity: &EntityDescriptor) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = $1",
        select_column_list(entity, None),
        quoted(entity.table_name),
        quoted(entity.pk_column)
    );
    q
}

/// SELECT by primary key with all direct relations attached as subqueries.
pub fn select_by_id_with_includes(
    entity: &EntityDescriptor,
    includes: &[IncludeSelect<'_>],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for inc in includes {
        parts.push(include_subquery(entity, inc));
    }
    q.sql = format!(
        "SELECT {} FROM {} {} WHERE {}.{} = $1",
        parts.join(", "),
        quoted(entity.table_name),
        MAIN_ALIAS,
        MAIN_ALIAS,
        quoted(entity.pk_column)
    );
    q
}

/// SELECT list: equality filters ANDed, ORDER BY the validated sort column
/// (primary key when none), OFFSET/LIMIT from skip/take, relations attached
/// as subqueries.
pub fn select_list(
    entity: &EntityDescriptor,
    args: &ListArgs,
    includes: &[IncludeSelect<'_>],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for inc in includes {
        parts.push(include_subquery(entity, inc));
    }
    let where_parts = push_filters(&mut q, entity, &args.filters, Some(MAIN_ALIAS));
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    let order_clause = match &args.sort {
        Some((col, dir)) => format!(
            " ORDER BY {}.{} {}",
            MAIN_ALIAS,
            quoted(col),
            dir.as_sql()
        ),
        None => format!(" ORDER BY {}.{}", MAIN_ALIAS, quoted(entity.pk_column)),
    };
    q.sql = format!(
        "SELECT {} FROM {} {}{}{} LIMIT {} OFFSET {}",
        parts.join(", "),
        quoted(entity.table_name),
        MAIN_ALIAS,
        where_clause,
        order_clause,
        args.take,
        args.skip
    );
    q
}

/// SELECT COUNT(*) with the same equality filters as a list (no paging/sort).
pub fn count(entity: &EntityDescriptor, filters: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_parts = push_filters(&mut q, entity, filters, None);
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quoted(entity.table_name),
        where_clause
    );
    q
}

/// SELECT pk FROM entity WHERE pk IN (...). Resolves which of the requested
/// ids exist.
pub fn select_ids_in(entity: &EntityDescriptor, ids: &[String]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = quoted(entity.pk_column);
    let table = quoted(entity.table_name);
    if ids.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", pk, table);
        return q;
    }
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| format!("${}", q.push_param(Value::String(id.clone()))))
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        pk,
        table,
        pk,
        placeholders.join(", "),
        pk
    );
    q
}

/// INSERT: columns and placeholders from the descriptor, values from body.
/// Columns with a DB default are omitted when body does not provide a value.
pub fn insert(entity: &EntityDescriptor, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let val = body.get(c.name).cloned();
        if val.is_none() && c.has_default {
            continue;
        }
        let n = q.push_param(val.unwrap_or(Value::Null));
        cols.push(quoted(c.name));
        placeholders.push(placeholder(entity, c.name, n));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(entity.table_name),
        cols.join(", "),
        placeholders.join(", "),
        select_column_list(entity, None)
    );
    q
}

/// UPDATE by id: SET only descriptor columns present in body, in declaration
/// order. Bumps updated_at unless the body sets it explicitly. With nothing
/// to set, degrades to a SELECT so the caller still gets the existence check.
pub fn update(entity: &EntityDescriptor, id: &Value, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(entity.table_name);
    let pk = quoted(entity.pk_column);
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.name == entity.pk_column {
            continue;
        }
        let Some(v) = body.get(c.name) else { continue };
        let n = q.push_param(v.clone());
        sets.push(format!("{} = {}", quoted(c.name), placeholder(entity, c.name, n)));
    }
    if sets.is_empty() {
        q.params.push(id.clone());
        q.sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            select_column_list(entity, None),
            table,
            pk
        );
        return q;
    }
    if !body.contains_key("updated_at") {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    let id_param = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
        table,
        sets.join(", "),
        pk,
        id_param,
        select_column_list(entity, None)
    );
    q
}

/// DELETE by id. Caller binds id as sole param.
pub fn delete(entity: &EntityDescriptor) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "DELETE FROM {} WHERE {} = $1 RETURNING {}",
        quoted(entity.table_name),
        quoted(entity.pk_column),
        quoted(entity.pk_column)
    );
    q
}

/// Point the FK of the given related rows at the owner (connect / the
/// attaching half of replace). Already-attached rows are a no-op, so the
/// statement is idempotent.
pub fn claim_related(
    related: &EntityDescriptor,
    fk_column: &str,
    owner_id: &str,
    ids: &[String],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let owner = q.push_param(Value::String(owner_id.to_string()));
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| format!("${}", q.push_param(Value::String(id.clone()))))
        .collect();
    q.sql = format!(
        "UPDATE {} SET {} = ${} WHERE {} IN ({})",
        quoted(related.table_name),
        quoted(fk_column),
        owner,
        quoted(related.pk_column),
        placeholders.join(", ")
    );
    q
}

/// Null the FK of the given rows, but only where they currently point at the
/// owner (disconnect). Rows that never pointed at the owner are untouched.
pub fn release_related(
    related: &EntityDescriptor,
    fk_column: &str,
    owner_id: &str,
    ids: &[String],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let fk = quoted(fk_column);
    let owner = q.push_param(Value::String(owner_id.to_string()));
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| format!("${}", q.push_param(Value::String(id.clone()))))
        .collect();
    q.sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = ${} AND {} IN ({})",
        quoted(related.table_name),
        fk,
        fk,
        owner,
        quoted(related.pk_column),
        placeholders.join(", ")
    );
    q
}

/// Null the FK on every row attached to the owner except the given set (the
/// detaching half of replace). With an empty keep set, detaches everything.
pub fn release_all_except(
    related: &EntityDescriptor,
    fk_column: &str,
    owner_id: &str,
    keep_ids: &[String],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let fk = quoted(fk_column);
    let owner = q.push_param(Value::String(owner_id.to_string()));
    if keep_ids.is_empty() {
        q.sql = format!(
            "UPDATE {} SET {} = NULL WHERE {} = ${}",
            quoted(related.table_name),
            fk,
            fk,
            owner
        );
        return q;
    }
    let placeholders: Vec<String> = keep_ids
        .iter()
        .map(|id| format!("${}", q.push_param(Value::String(id.clone()))))
        .collect();
    q.sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = ${} AND {} NOT IN ({})",
        quoted(related.table_name),
        fk,
        fk,
        owner,
        quoted(related.pk_column),
        placeholders.join(", ")
    );
    q
}
