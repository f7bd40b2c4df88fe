//! Command implementations for the builddash CLI

pub mod inspect;
pub mod serve;

pub use inspect::{run_schema, run_tables};
pub use serve::run_serve;
