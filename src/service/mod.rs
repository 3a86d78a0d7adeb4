//! EntityService: generic CRUD and relationship mutation over the safe SQL
//! builder, parameterized by entity descriptors.

mod crud;
mod relations;
mod validation;

pub use crud::EntityService;
pub use validation::RequestValidator;
