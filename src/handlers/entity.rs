//! Entity CRUD handlers: create, read, list, update, delete, meta. Pure
//! translation between transport and the EntityService; the entity is
//! resolved from the path segment.

use crate::error::AppError;
use crate::query::ListArgs;
use crate::schema::EntityDescriptor;
use crate::service::EntityService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

pub(crate) fn lookup_entity<'a>(
    state: &'a AppState,
    path_segment: &str,
) -> Result<&'a EntityDescriptor, AppError> {
    state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))
}

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<(StatusCode, Json<Vec<Value>>), AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let args = ListArgs::from_pairs(entity, &pairs)?;
    let rows = EntityService::list(&state.pool, state.model.as_ref(), entity, &args).await?;
    Ok((StatusCode::OK, Json(rows)))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let body = body_to_map(body)?;
    let dto = EntityService::create(&state.pool, state.model.as_ref(), entity, &body).await?;
    Ok((StatusCode::CREATED, Json(dto)))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let dto = EntityService::get(&state.pool, state.model.as_ref(), entity, &id).await?;
    Ok((StatusCode::OK, Json(dto)))
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<StatusCode, AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let body = body_to_map(body)?;
    EntityService::update(&state.pool, state.model.as_ref(), entity, &id, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    EntityService::delete(&state.pool, entity, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/{entity}/meta: count of the filtered set as `{"count": N}`.
/// Filters come from the query string; skip/take/sort are accepted but do not
/// affect the count.
pub async fn meta(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let entity = lookup_entity(&state, &path_segment)?;
    let args = ListArgs::from_pairs(entity, &pairs)?;
    let count = EntityService::count(&state.pool, entity, &args.filters).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "count": count }))))
}
