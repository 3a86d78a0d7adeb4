//! Entity descriptors: column list, primary key, relations, validation rules.
//! One descriptor per entity drives the whole CRUD surface; there is no
//! per-entity service or handler code.

use std::collections::HashMap;

/// Direction of a relation: to_one (we hold the FK) or to_many (they hold a FK
/// back to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// One relation exposed on an entity, addressable as
/// `/api/{entity}/{id}/{name}` and as a field on create/update bodies.
#[derive(Clone, Debug)]
pub struct RelationSpec {
    /// API name of the relation (e.g. "likes", "user", "followers").
    pub name: &'static str,
    pub kind: RelationKind,
    /// Path segment of the target entity (lookup key in the model).
    pub target: &'static str,
    /// FK column carrying the owner's id: lives on the target table for
    /// to_many, on the owner's own table for to_one.
    pub fk_column: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    pub required: bool,
    pub max_length: Option<u32>,
    pub format: Option<&'static str>,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: &'static str,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding
    /// string values. None for plain text columns.
    pub pg_type: Option<&'static str>,
    /// Whether the column has a DB default (NOW() on the timestamps).
    pub has_default: bool,
}

#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    /// Singular display name used in error messages (e.g. "Tweet").
    pub name: &'static str,
    /// URL path segment and model lookup key (e.g. "tweets").
    pub path_segment: &'static str,
    pub table_name: &'static str,
    pub pk_column: &'static str,
    pub columns: Vec<ColumnInfo>,
    pub relations: Vec<RelationSpec>,
    pub validation: HashMap<&'static str, ValidationRule>,
}

impl EntityDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// FK columns that belong to to_one relations; folded into relation
    /// objects by the DTO mapper instead of being exposed as scalar fields.
    pub fn is_fk_column(&self, name: &str) -> bool {
        self.relations
            .iter()
            .any(|r| r.kind == RelationKind::ToOne && r.fk_column == name)
    }
}

#[derive(Clone, Debug)]
pub struct Model {
    pub entities: Vec<EntityDescriptor>,
    by_path: HashMap<&'static str, usize>,
}

impl Model {
    pub fn new(entities: Vec<EntityDescriptor>) -> Self {
        let by_path = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path_segment, i))
            .collect();
        Model { entities, by_path }
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&EntityDescriptor> {
        self.by_path.get(path).map(|&i| &self.entities[i])
    }
}
