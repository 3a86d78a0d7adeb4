//! DTO mapping: persisted rows (snake_case columns, FK columns) to transport
//! shapes (camelCase fields, relations as `{"id": ...}` objects), and the
//! id-reference shapes accepted on the way in.

use crate::case::to_camel_case;
use crate::error::AppError;
use crate::schema::{EntityDescriptor, RelationKind};
use serde_json::{json, Map, Value};

/// Map one row to its DTO. The row may already carry relation keys produced
/// by the include subqueries; to_one FK columns are folded into the relation
/// object and never exposed as scalar fields.
pub fn to_dto(entity: &EntityDescriptor, row: Value) -> Value {
    let Value::Object(mut row) = row else { return row };
    let mut out = Map::new();
    for rel in &entity.relations {
        match row.remove(rel.name) {
            Some(v) => {
                out.insert(rel.name.to_string(), v);
            }
            None => {
                // No include in the row: fold to_one from the FK value.
                if rel.kind == RelationKind::ToOne {
                    let v = match row.get(rel.fk_column) {
                        Some(Value::String(id)) => json!({ "id": id }),
                        _ => Value::Null,
                    };
                    out.insert(rel.name.to_string(), v);
                }
            }
        }
    }
    for c in &entity.columns {
        if entity.is_fk_column(c.name) {
            row.remove(c.name);
            continue;
        }
        if let Some(v) = row.remove(c.name) {
            out.insert(to_camel_case(c.name), v);
        }
    }
    Value::Object(out)
}

/// Extract ids from a relation reference value on a create/update body:
/// either a list of `{"id": ...}` objects / plain strings (to_many), or a
/// single object / string (to_one).
pub fn reference_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(one_id).collect(),
        other => one_id(other).into_iter().collect(),
    }
}

fn one_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(m) => m.get("id").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

/// Parse the JSON body of disconnect/replace: an array of id references.
pub fn ids_from_body(body: &Value) -> Result<Vec<String>, AppError> {
    match body {
        Value::Array(_) => Ok(reference_ids(body)),
        _ => Err(AppError::BadRequest("body must be a JSON array of ids".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::social_model;
    use serde_json::json;

    #[test]
    fn tweet_row_folds_fk_into_user_object() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        let row = json!({
            "id": "t1",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "comment": null,
            "content": "hello",
            "user_id": "u1"
        });
        let dto = to_dto(tweets, row);
        assert_eq!(dto["id"], "t1");
        assert_eq!(dto["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(dto["user"], json!({ "id": "u1" }));
        assert!(dto.get("userId").is_none());
        assert!(dto.get("user_id").is_none());
    }

    #[test]
    fn included_relations_pass_through() {
        let model = social_model();
        let tweets = model.entity_by_path("tweets").unwrap();
        let row = json!({
            "id": "t1",
            "content": "hello",
            "user_id": "u1",
            "likes": [{ "id": "l2" }],
            "retweets": [],
            "user": null
        });
        let dto = to_dto(tweets, row);
        assert_eq!(dto["likes"], json!([{ "id": "l2" }]));
        assert_eq!(dto["retweets"], json!([]));
        // Included user is authoritative: dangling FK renders as null.
        assert_eq!(dto["user"], Value::Null);
    }

    #[test]
    fn reference_ids_accept_objects_and_strings() {
        assert_eq!(
            reference_ids(&json!([{ "id": "a" }, "b", 3])),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(reference_ids(&json!({ "id": "a" })), vec!["a".to_string()]);
        assert_eq!(reference_ids(&json!("a")), vec!["a".to_string()]);
        assert!(reference_ids(&json!(null)).is_empty());
    }

    #[test]
    fn ids_from_body_rejects_non_arrays() {
        assert!(ids_from_body(&json!({ "id": "a" })).is_err());
        assert_eq!(ids_from_body(&json!(["a"])).unwrap(), vec!["a".to_string()]);
    }
}
