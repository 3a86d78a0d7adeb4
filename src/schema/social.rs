//! The five social entities, declared by hand. Column names are snake_case;
//! the API boundary converts to and from camelCase.

use super::descriptor::{
    ColumnInfo, EntityDescriptor, Model, RelationKind, RelationSpec, ValidationRule,
};
use std::collections::HashMap;

fn text(name: &'static str) -> ColumnInfo {
    ColumnInfo {
        name,
        pg_type: None,
        has_default: false,
    }
}

fn timestamp(name: &'static str) -> ColumnInfo {
    ColumnInfo {
        name,
        pg_type: Some("timestamptz"),
        has_default: true,
    }
}

fn max_length(n: u32) -> ValidationRule {
    ValidationRule {
        max_length: Some(n),
        ..ValidationRule::default()
    }
}

fn required() -> ValidationRule {
    ValidationRule {
        required: true,
        ..ValidationRule::default()
    }
}

/// Build the full social model: Users, Tweets, Likes, Retweets, Followers.
pub fn social_model() -> Model {
    let users = EntityDescriptor {
        name: "User",
        path_segment: "users",
        table_name: "users",
        pk_column: "id",
        columns: vec![
            text("id"),
            timestamp("created_at"),
            timestamp("updated_at"),
            text("email"),
            text("first_name"),
            text("last_name"),
            text("password"),
            text("roles"),
            text("username"),
        ],
        relations: vec![
            RelationSpec {
                name: "tweets",
                kind: RelationKind::ToMany,
                target: "tweets",
                fk_column: "user_id",
            },
            RelationSpec {
                name: "retweets",
                kind: RelationKind::ToMany,
                target: "retweets",
                fk_column: "user_id",
            },
            RelationSpec {
                name: "likes",
                kind: RelationKind::ToMany,
                target: "likes",
                fk_column: "user_id",
            },
        ],
        validation: HashMap::from([
            ("password", required()),
            ("roles", required()),
            ("username", required()),
            ("first_name", max_length(256)),
            ("last_name", max_length(256)),
            (
                "email",
                ValidationRule {
                    format: Some("email"),
                    ..ValidationRule::default()
                },
            ),
        ]),
    };

    let tweets = EntityDescriptor {
        name: "Tweet",
        path_segment: "tweets",
        table_name: "tweets",
        pk_column: "id",
        columns: vec![
            text("id"),
            timestamp("created_at"),
            timestamp("updated_at"),
            text("comment"),
            text("content"),
            text("user_id"),
        ],
        relations: vec![
            RelationSpec {
                name: "likes",
                kind: RelationKind::ToMany,
                target: "likes",
                fk_column: "tweet_id",
            },
            RelationSpec {
                name: "retweets",
                kind: RelationKind::ToMany,
                target: "retweets",
                fk_column: "tweet_id",
            },
            RelationSpec {
                name: "user",
                kind: RelationKind::ToOne,
                target: "users",
                fk_column: "user_id",
            },
        ],
        validation: HashMap::from([
            ("comment", max_length(1000)),
            ("content", max_length(1000)),
        ]),
    };

    let likes = EntityDescriptor {
        name: "Like",
        path_segment: "likes",
        table_name: "likes",
        pk_column: "id",
        columns: vec![
            text("id"),
            timestamp("created_at"),
            timestamp("updated_at"),
            text("tweet_id"),
            text("user_id"),
        ],
        relations: vec![
            RelationSpec {
                name: "tweet",
                kind: RelationKind::ToOne,
                target: "tweets",
                fk_column: "tweet_id",
            },
            RelationSpec {
                name: "user",
                kind: RelationKind::ToOne,
                target: "users",
                fk_column: "user_id",
            },
        ],
        validation: HashMap::new(),
    };

    let retweets = EntityDescriptor {
        name: "Retweet",
        path_segment: "retweets",
        table_name: "retweets",
        pk_column: "id",
        columns: vec![
            text("id"),
            timestamp("created_at"),
            timestamp("updated_at"),
            text("tweet_id"),
            text("user_id"),
        ],
        relations: vec![
            RelationSpec {
                name: "tweet",
                kind: RelationKind::ToOne,
                target: "tweets",
                fk_column: "tweet_id",
            },
            RelationSpec {
                name: "user",
                kind: RelationKind::ToOne,
                target: "users",
                fk_column: "user_id",
            },
        ],
        validation: HashMap::new(),
    };

    // The follower model is self-referential: a single parent-style FK plus a
    // reverse collection, kept exactly as the source models it.
    let followers = EntityDescriptor {
        name: "Follower",
        path_segment: "followers",
        table_name: "followers",
        pk_column: "id",
        columns: vec![
            text("id"),
            timestamp("created_at"),
            timestamp("updated_at"),
            text("following"),
            text("follower_id"),
        ],
        relations: vec![
            RelationSpec {
                name: "followers",
                kind: RelationKind::ToMany,
                target: "followers",
                fk_column: "follower_id",
            },
            RelationSpec {
                name: "follower",
                kind: RelationKind::ToOne,
                target: "followers",
                fk_column: "follower_id",
            },
        ],
        validation: HashMap::from([("following", max_length(1000))]),
    };

    Model::new(vec![users, tweets, likes, retweets, followers])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RelationKind;

    #[test]
    fn model_resolves_all_path_segments() {
        let model = social_model();
        for path in ["users", "tweets", "likes", "retweets", "followers"] {
            let e = model.entity_by_path(path).unwrap();
            assert_eq!(e.path_segment, path);
            assert_eq!(e.pk_column, "id");
            assert!(e.has_column("created_at"));
            assert!(e.has_column("updated_at"));
        }
        assert!(model.entity_by_path("accounts").is_none());
    }

    #[test]
    fn tweet_relations_cover_both_directions() {
        let model = social_model();
        let tweet = model.entity_by_path("tweets").unwrap();
        let likes = tweet.relation("likes").unwrap();
        assert_eq!(likes.kind, RelationKind::ToMany);
        assert_eq!(likes.fk_column, "tweet_id");
        let user = tweet.relation("user").unwrap();
        assert_eq!(user.kind, RelationKind::ToOne);
        assert_eq!(user.fk_column, "user_id");
        assert!(tweet.is_fk_column("user_id"));
        assert!(!tweet.is_fk_column("content"));
    }

    #[test]
    fn follower_self_reference_shares_the_fk() {
        let model = social_model();
        let follower = model.entity_by_path("followers").unwrap();
        assert_eq!(follower.relation("followers").unwrap().target, "followers");
        assert_eq!(follower.relation("follower").unwrap().fk_column, "follower_id");
    }

    #[test]
    fn relation_targets_exist_in_model() {
        let model = social_model();
        for entity in &model.entities {
            for rel in &entity.relations {
                let target = model.entity_by_path(rel.target).unwrap();
                match rel.kind {
                    RelationKind::ToMany => assert!(target.has_column(rel.fk_column)),
                    RelationKind::ToOne => assert!(entity.has_column(rel.fk_column)),
                }
            }
        }
    }
}
