//! builddash-server: dashboard backend
//!
//! Introspects two named PostgreSQL backends, previews and queries their
//! tables, and stores dashboard layouts in a local SQLite database.

pub mod error;
pub mod http;
pub mod introspect;
pub mod layouts;
pub mod query;
pub mod registry;
pub mod settings;

pub use error::{DashError, Result};
pub use http::{run_server, AppState, ServerConfig};
pub use introspect::Introspector;
pub use layouts::LayoutStore;
pub use query::QueryExecutor;
pub use registry::{Backend, Registry};
pub use settings::Settings;
