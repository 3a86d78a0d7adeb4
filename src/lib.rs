//! Chirp server: generic CRUD REST backend for a Twitter-style social network.

pub mod case;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod query;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use error::AppError;
pub use query::{ListArgs, SortDirection};
pub use routes::{common_routes, entity_routes};
pub use schema::{social_model, EntityDescriptor, Model, RelationKind, RelationSpec};
pub use service::EntityService;
pub use state::AppState;
pub use store::{ensure_database_exists, ensure_tables};
