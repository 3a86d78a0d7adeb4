//! Static entity model: descriptors for the five social entities, flattened for
//! runtime use by the SQL builder and the generic service.

mod descriptor;
mod social;

pub use descriptor::{
    ColumnInfo, EntityDescriptor, Model, RelationKind, RelationSpec, ValidationRule,
};
pub use social::social_model;
