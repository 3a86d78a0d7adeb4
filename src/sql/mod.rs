//! Safe SQL builder: identifiers only from the static schema, values always
//! bound as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
