//! Generic CRUD execution against PostgreSQL. One implementation serves all
//! five entities; behavior differences live in the descriptors.

use crate::dto::{reference_ids, to_dto};
use crate::error::AppError;
use crate::query::ListArgs;
use crate::schema::{EntityDescriptor, Model, RelationKind, RelationSpec};
use crate::service::RequestValidator;
use crate::sql::{
    count, delete, insert, select_by_id, select_by_id_with_includes, select_ids_in, select_list,
    update, IncludeSelect, PgBindValue, QueryBuf,
};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

pub struct EntityService;

impl EntityService {
    /// Insert a new row from the input DTO. Relation references that resolve
    /// to no existing row are silently omitted; provided to_many id lists
    /// claim the referenced child rows. The entity is reloaded by its key
    /// after the save and NotFound raised if it cannot be found again.
    pub async fn create(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        body: &HashMap<String, Value>,
    ) -> Result<Value, AppError> {
        let (mut scalars, to_many) = Self::split_body(pool, model, entity, body, false).await?;
        RequestValidator::validate(&scalars, &entity.validation)?;

        let id = match scalars.get(entity.pk_column).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                scalars.insert(entity.pk_column.to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut tx = pool.begin().await?;
        let q = insert(entity, &scalars);
        Self::execute_returning_one_tx(&mut tx, &q)
            .await?
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))?;
        for (rel, ids) in &to_many {
            Self::claim_in_tx(&mut tx, model, rel, &id, ids).await?;
        }
        tx.commit().await?;

        // Reload through the normal read path: consistency check plus eager
        // relations for the response body.
        Self::get(pool, model, entity, &id).await
    }

    /// Fetch one entity with eager-loaded direct relations.
    pub async fn get(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        id: &str,
    ) -> Result<Value, AppError> {
        let includes = Self::includes_for(model, entity);
        let q = select_by_id_with_includes(entity, &includes);
        let row = Self::query_one(pool, &q.sql, &[Value::String(id.to_string())])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", entity.name, id)))?;
        Ok(to_dto(entity, row))
    }

    /// Filtered, paginated, sorted list with eager relations. Never fails for
    /// "no matches".
    pub async fn list(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        args: &ListArgs,
    ) -> Result<Vec<Value>, AppError> {
        let includes = Self::includes_for(model, entity);
        let q = select_list(entity, args, &includes);
        let rows = Self::query_many(pool, &q).await?;
        Ok(rows.into_iter().map(|r| to_dto(entity, r)).collect())
    }

    /// PATCH merge: only provided non-null scalar fields overwrite existing
    /// values. A provided relation list replaces the whole collection (empty
    /// resolved set allowed here, unlike the `replace` operation). A missing
    /// row at save time is NotFound.
    pub async fn update(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        id: &str,
        body: &HashMap<String, Value>,
    ) -> Result<(), AppError> {
        let (scalars, to_many) = Self::split_body(pool, model, entity, body, true).await?;
        RequestValidator::validate_partial(&scalars, &entity.validation)?;

        let mut tx = pool.begin().await?;
        let q = update(entity, &Value::String(id.to_string()), &scalars);
        Self::execute_returning_one_tx(&mut tx, &q)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", entity.name, id)))?;
        for (rel, ids) in &to_many {
            let related = Self::related_entity(model, rel)?;
            let resolved = Self::resolve_ids_tx(&mut tx, related, ids).await?;
            let q = crate::sql::release_all_except(related, rel.fk_column, id, &resolved);
            Self::execute_tx(&mut tx, &q).await?;
            if !resolved.is_empty() {
                let q = crate::sql::claim_related(related, rel.fk_column, id, &resolved);
                Self::execute_tx(&mut tx, &q).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Hard delete. NotFound if the row is already gone.
    pub async fn delete(
        pool: &PgPool,
        entity: &EntityDescriptor,
        id: &str,
    ) -> Result<(), AppError> {
        let q = delete(entity);
        let row = Self::execute_returning_one_with_params(
            pool,
            &q.sql,
            &[Value::String(id.to_string())],
        )
        .await?;
        row.ok_or_else(|| AppError::NotFound(format!("{} {}", entity.name, id)))?;
        Ok(())
    }

    /// Cardinality of the filtered set, without materializing it.
    pub async fn count(
        pool: &PgPool,
        entity: &EntityDescriptor,
        filters: &[(String, Value)],
    ) -> Result<i64, AppError> {
        let q = count(entity, filters);
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        tracing::debug!(sql = %q.sql, "query");
        let row = query.fetch_one(pool).await?;
        use sqlx::Row;
        Ok(row.try_get::<i64, _>(0)?)
    }

    /// Split an input body into scalar column values and to_many relation id
    /// lists. to_one references are resolved here and folded into their FK
    /// column (unresolvable references are dropped). With `skip_nulls` (the
    /// PATCH merge), null fields are ignored instead of written.
    async fn split_body(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        body: &HashMap<String, Value>,
        skip_nulls: bool,
    ) -> Result<(HashMap<String, Value>, Vec<(RelationSpec, Vec<String>)>), AppError> {
        let mut scalars = HashMap::new();
        let mut to_many = Vec::new();
        for (key, value) in body {
            if let Some(rel) = entity.relation(key) {
                if value.is_null() {
                    continue;
                }
                match rel.kind {
                    RelationKind::ToMany => {
                        to_many.push((rel.clone(), reference_ids(value)));
                    }
                    RelationKind::ToOne => {
                        let related = Self::related_entity(model, rel)?;
                        let ids = reference_ids(value);
                        let resolved = Self::resolve_ids(pool, related, &ids).await?;
                        if let Some(id) = resolved.into_iter().next() {
                            scalars.insert(rel.fk_column.to_string(), Value::String(id));
                        }
                    }
                }
                continue;
            }
            if let Some((col, v)) = scalar_for_column(entity, key, value, skip_nulls) {
                scalars.insert(col, v);
            }
        }
        Ok((scalars, to_many))
    }

    pub(crate) fn related_entity<'a>(
        model: &'a Model,
        rel: &RelationSpec,
    ) -> Result<&'a EntityDescriptor, AppError> {
        model
            .entity_by_path(rel.target)
            .ok_or_else(|| AppError::BadRequest(format!("unknown relation target '{}'", rel.target)))
    }

    pub(crate) fn includes_for<'a>(
        model: &'a Model,
        entity: &'a EntityDescriptor,
    ) -> Vec<IncludeSelect<'a>> {
        entity
            .relations
            .iter()
            .filter_map(|r| {
                model.entity_by_path(r.target).map(|related| IncludeSelect {
                    name: r.name,
                    kind: r.kind,
                    related,
                    fk_column: r.fk_column,
                })
            })
            .collect()
    }

    /// Which of the requested ids exist in the related table.
    pub(crate) async fn resolve_ids(
        pool: &PgPool,
        entity: &EntityDescriptor,
        ids: &[String],
    ) -> Result<Vec<String>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let q = select_ids_in(entity, ids);
        let rows = Self::query_many(pool, &q).await?;
        Ok(Self::collect_ids(entity, rows))
    }

    async fn resolve_ids_tx(
        tx: &mut sqlx::PgConnection,
        entity: &EntityDescriptor,
        ids: &[String],
    ) -> Result<Vec<String>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let q = select_ids_in(entity, ids);
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&mut *tx).await?;
        let rows = rows.iter().map(row_to_json).collect();
        Ok(Self::collect_ids(entity, rows))
    }

    fn collect_ids(entity: &EntityDescriptor, rows: Vec<Value>) -> Vec<String> {
        rows.iter()
            .filter_map(|r| r.get(entity.pk_column).and_then(Value::as_str).map(String::from))
            .collect()
    }

    async fn claim_in_tx(
        tx: &mut sqlx::PgConnection,
        model: &Model,
        rel: &RelationSpec,
        owner_id: &str,
        ids: &[String],
    ) -> Result<(), AppError> {
        let related = Self::related_entity(model, rel)?;
        let resolved = Self::resolve_ids_tx(tx, related, ids).await?;
        if resolved.is_empty() {
            return Ok(());
        }
        let q = crate::sql::claim_related(related, rel.fk_column, owner_id, &resolved);
        Self::execute_tx(tx, &q).await
    }

    /// Fetch the owner row (scalar columns only) or NotFound. Shared
    /// existence check for the relation operations.
    pub(crate) async fn require_owner(
        pool: &PgPool,
        entity: &EntityDescriptor,
        id: &str,
    ) -> Result<Value, AppError> {
        let q = select_by_id(entity);
        Self::query_one(pool, &q.sql, &[Value::String(id.to_string())])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", entity.name, id)))
    }

    pub(crate) async fn query_one(
        pool: &PgPool,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    pub(crate) async fn query_many(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub(crate) async fn execute(pool: &PgPool, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let done = query.execute(pool).await?;
        Ok(done.rows_affected())
    }

    async fn execute_returning_one_with_params(
        pool: &PgPool,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "execute");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn execute_returning_one_tx(
        tx: &mut sqlx::PgConnection,
        q: &QueryBuf,
    ) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute (tx)");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&mut *tx).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    pub(crate) async fn execute_tx(
        tx: &mut sqlx::PgConnection,
        q: &QueryBuf,
    ) -> Result<(), AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute (tx)");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        query.execute(&mut *tx).await?;
        Ok(())
    }
}

/// Scalar half of the body split: unknown keys are dropped, camelCase keys
/// land in their snake_case column, and under the PATCH merge a null field
/// means "leave it alone" rather than "write NULL".
fn scalar_for_column(
    entity: &EntityDescriptor,
    key: &str,
    value: &Value,
    skip_nulls: bool,
) -> Option<(String, Value)> {
    let col = crate::case::to_snake_case(key);
    if !entity.has_column(&col) {
        return None;
    }
    if skip_nulls && value.is_null() {
        return None;
    }
    Some((col, value.clone()))
}

pub(crate) fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::social_model;
    use serde_json::json;

    #[test]
    fn patch_merge_skips_nulls_that_create_would_write() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        assert_eq!(scalar_for_column(tweets, "content", &Value::Null, true), None);
        assert_eq!(
            scalar_for_column(tweets, "content", &Value::Null, false),
            Some(("content".to_string(), Value::Null))
        );
        assert_eq!(
            scalar_for_column(tweets, "content", &json!("hi"), true),
            Some(("content".to_string(), json!("hi")))
        );
    }

    #[test]
    fn camel_case_fields_land_in_snake_case_columns() {
        let model = social_model();
        let users = model.entity_by_path("users").unwrap();
        assert_eq!(
            scalar_for_column(users, "firstName", &json!("Ada"), false),
            Some(("first_name".to_string(), json!("Ada")))
        );
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let model = social_model();
        let users = model.entity_by_path("users").unwrap();
        assert_eq!(
            scalar_for_column(users, "favoriteColor", &json!("teal"), false),
            None
        );
    }
}
