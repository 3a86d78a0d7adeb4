//! Relationship mutation: connect / disconnect / replace on to_many
//! collections, plus related reads. The asymmetry between connect (fails when
//! nothing resolves) and disconnect (silently ignores missing ids) is part of
//! the contract.

use crate::dto::to_dto;
use crate::error::AppError;
use crate::query::ListArgs;
use crate::schema::{EntityDescriptor, Model, RelationKind, RelationSpec};
use crate::service::EntityService;
use crate::sql::{claim_related, release_all_except, release_related, select_list, QueryBuf};
use serde_json::Value;
use sqlx::PgPool;

impl EntityService {
    /// Add the resolved related rows to the owner's collection (set union,
    /// idempotent). NotFound when the owner is missing or none of the ids
    /// resolve.
    pub async fn connect(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        owner_id: &str,
        relation: &str,
        ids: &[String],
    ) -> Result<(), AppError> {
        let rel = require_collection(entity, relation)?;
        Self::require_owner(pool, entity, owner_id).await?;
        let related = Self::related_entity(model, rel)?;
        let resolved = require_resolved(rel, owner_id, Self::resolve_ids(pool, related, ids).await?)?;
        let q = claim_related(related, rel.fk_column, owner_id, &resolved);
        Self::execute(pool, &q).await?;
        Ok(())
    }

    /// Remove each matching related row from the owner's collection. Ids that
    /// do not resolve or are not attached are ignored without error.
    pub async fn disconnect(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        owner_id: &str,
        relation: &str,
        ids: &[String],
    ) -> Result<(), AppError> {
        let rel = require_collection(entity, relation)?;
        Self::require_owner(pool, entity, owner_id).await?;
        let related = Self::related_entity(model, rel)?;
        if let Some(q) = release_plan(related, rel.fk_column, owner_id, ids) {
            Self::execute(pool, &q).await?;
        }
        Ok(())
    }

    /// Overwrite the owner's collection with exactly the resolved set. Rows
    /// not named are detached (FK nulled), not deleted. NotFound when the
    /// owner is missing or the resolved set is empty.
    pub async fn replace(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        owner_id: &str,
        relation: &str,
        ids: &[String],
    ) -> Result<(), AppError> {
        let rel = require_collection(entity, relation)?;
        Self::require_owner(pool, entity, owner_id).await?;
        let related = Self::related_entity(model, rel)?;
        let resolved = require_resolved(rel, owner_id, Self::resolve_ids(pool, related, ids).await?)?;
        let mut tx = pool.begin().await?;
        let q = release_all_except(related, rel.fk_column, owner_id, &resolved);
        Self::execute_tx(&mut tx, &q).await?;
        let q = claim_related(related, rel.fk_column, owner_id, &resolved);
        Self::execute_tx(&mut tx, &q).await?;
        tx.commit().await?;
        Ok(())
    }

    /// List the owner's to_many collection pre-filtered by its FK, with the
    /// usual filter/sort/pagination on top. No owner-existence check: an
    /// absent owner simply has an empty collection.
    pub async fn find_related(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        owner_id: &str,
        rel: &RelationSpec,
        args: ListArgs,
    ) -> Result<Vec<Value>, AppError> {
        let related = Self::related_entity(model, rel)?;
        let args = args.with_filter(rel.fk_column, Value::String(owner_id.to_string()));
        let includes = Self::includes_for(model, related);
        let q = select_list(related, &args, &includes);
        let rows = Self::query_many(pool, &q).await?;
        Ok(rows.into_iter().map(|r| to_dto(related, r)).collect())
    }

    /// Fetch the single to_one related entity (e.g. the User of a Tweet).
    /// NotFound when the owner is missing, the reference is unset, or it
    /// dangles.
    pub async fn get_to_one(
        pool: &PgPool,
        model: &Model,
        entity: &EntityDescriptor,
        owner_id: &str,
        rel: &RelationSpec,
    ) -> Result<Value, AppError> {
        let owner = Self::require_owner(pool, entity, owner_id).await?;
        let related = Self::related_entity(model, rel)?;
        let fk = owner
            .get(rel.fk_column)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::NotFound(format!("{} has no {}", entity.name, rel.name))
            })?
            .to_string();
        Self::get(pool, model, related, &fk).await
    }
}

/// connect and replace act only on rows that exist; when nothing resolves the
/// owner's collection is left untouched and the caller gets NotFound.
fn require_resolved(
    rel: &RelationSpec,
    owner_id: &str,
    resolved: Vec<String>,
) -> Result<Vec<String>, AppError> {
    if resolved.is_empty() {
        return Err(AppError::NotFound(format!(
            "no {} found for {}",
            rel.name, owner_id
        )));
    }
    Ok(resolved)
}

/// disconnect's side of the asymmetry: an empty id list is already satisfied,
/// and the release statement matches on both owner FK and id, so ids that do
/// not resolve (or belong to someone else) simply touch no rows.
fn release_plan(
    related: &EntityDescriptor,
    fk_column: &str,
    owner_id: &str,
    ids: &[String],
) -> Option<QueryBuf> {
    if ids.is_empty() {
        return None;
    }
    Some(release_related(related, fk_column, owner_id, ids))
}

/// Relation mutation only applies to collections; anything else is an unknown
/// route from the caller's point of view.
fn require_collection<'a>(
    entity: &'a EntityDescriptor,
    relation: &str,
) -> Result<&'a RelationSpec, AppError> {
    entity
        .relation(relation)
        .filter(|r| r.kind == RelationKind::ToMany)
        .ok_or_else(|| {
            AppError::NotFound(format!("{}/{}", entity.path_segment, relation))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::social_model;

    #[test]
    fn connect_and_replace_refuse_an_empty_resolved_set() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        let likes = tweets.relation("likes").unwrap();

        let err = require_resolved(likes, "t1", Vec::new()).unwrap_err();
        match err {
            AppError::NotFound(msg) => assert!(msg.contains("likes"), "{}", msg),
            other => panic!("expected NotFound, got {:?}", other),
        }

        let resolved = vec!["l1".to_string()];
        assert_eq!(require_resolved(likes, "t1", resolved.clone()).unwrap(), resolved);
    }

    #[test]
    fn disconnect_ignores_ids_that_do_not_match() {
        let model = social_model();
        let likes = model.entity_by_path("likes").unwrap();

        // nothing requested: nothing to run, still a success
        assert!(release_plan(likes, "tweet_id", "t1", &[]).is_none());

        // a stray id is constrained out by the owner FK, not rejected
        let ids = vec!["l1".to_string(), "not-there".to_string()];
        let q = release_plan(likes, "tweet_id", "t1", &ids).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"likes\" SET \"tweet_id\" = NULL WHERE \"tweet_id\" = $1 AND \"id\" IN ($2, $3)"
        );
        assert_eq!(q.params[0], serde_json::json!("t1"));
    }

    #[test]
    fn collection_lookup_rejects_to_one_and_unknown_names() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        assert!(require_collection(tweets, "likes").is_ok());
        assert!(matches!(
            require_collection(tweets, "user"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            require_collection(tweets, "bookmarks"),
            Err(AppError::NotFound(_))
        ));
    }
}
