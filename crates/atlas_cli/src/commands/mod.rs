pub mod eval;
pub mod migrate;
pub mod schema;
