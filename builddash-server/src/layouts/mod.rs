//! Dashboard layout persistence, independent of the external backends

pub mod models;
pub mod store;

pub use models::{GridCell, Layout, LayoutInput};
pub use store::LayoutStore;
