//! HTTP handlers: entity CRUD and relationship operations.

pub mod entity;
pub mod relation;
pub use entity::*;
pub use relation::*;
