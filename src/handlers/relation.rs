//! Relationship handlers: connect (ids as repeated `id` query params),
//! disconnect and replace (ids in the JSON body), and related reads.

use crate::dto::ids_from_body;
use crate::error::AppError;
use crate::handlers::entity::lookup_entity;
use crate::query::ListArgs;
use crate::schema::RelationKind;
use crate::service::EntityService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

fn ids_from_pairs(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, _)| k == "id")
        .map(|(_, v)| v.clone())
        .collect()
}

/// GET /api/{entity}/{id}/{relation}: list the collection (to_many) or fetch
/// the single parent (to_one).
pub async fn related(
    State(state): State<AppState>,
    Path((path_segment, id, relation)): Path<(String, String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let rel = entity
        .relation(&relation)
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, relation)))?;
    match rel.kind {
        RelationKind::ToMany => {
            let related = EntityService::related_entity(state.model.as_ref(), rel)?;
            let args = ListArgs::from_pairs(related, &pairs)?;
            let rows =
                EntityService::find_related(&state.pool, state.model.as_ref(), entity, &id, rel, args)
                    .await?;
            Ok((StatusCode::OK, Json(Value::Array(rows))))
        }
        RelationKind::ToOne => {
            let dto =
                EntityService::get_to_one(&state.pool, state.model.as_ref(), entity, &id, rel)
                    .await?;
            Ok((StatusCode::OK, Json(dto)))
        }
    }
}

pub async fn connect(
    State(state): State<AppState>,
    Path((path_segment, id, relation)): Path<(String, String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<StatusCode, AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let ids = ids_from_pairs(&pairs);
    EntityService::connect(&state.pool, state.model.as_ref(), entity, &id, &relation, &ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disconnect(
    State(state): State<AppState>,
    Path((path_segment, id, relation)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<StatusCode, AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let ids = ids_from_body(&body)?;
    EntityService::disconnect(&state.pool, state.model.as_ref(), entity, &id, &relation, &ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace(
    State(state): State<AppState>,
    Path((path_segment, id, relation)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<StatusCode, AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let ids = ids_from_body(&body)?;
    EntityService::replace(&state.pool, state.model.as_ref(), entity, &id, &relation, &ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_ids_come_from_repeated_id_params() {
        let pairs = vec![
            ("id".to_string(), "l1".to_string()),
            ("other".to_string(), "x".to_string()),
            ("id".to_string(), "l2".to_string()),
        ];
        assert_eq!(ids_from_pairs(&pairs), vec!["l1".to_string(), "l2".to_string()]);
    }
}
