//! Table listing, preview, custom query, and schema endpoints

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::DashError;
use crate::http::error::ApiError;
use crate::http::extractors::{ApiJson, ApiPath};
use crate::http::server::AppState;
use crate::introspect::{BackendSchema, Introspector, TableDescriptor};
use crate::query::{QueryExecutor, QueryResult};

#[derive(Deserialize)]
pub struct CustomQueryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Map<String, JsonValue>,
}

/// GET /tables - table names per backend
async fn list_tables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, Vec<String>>>, ApiError> {
    let tables = Introspector::new(&state.registry).list_all_tables().await?;
    Ok(Json(tables))
}

/// GET /tables/{backend}/{table} - first rows of a table
async fn preview_table(
    State(state): State<Arc<AppState>>,
    ApiPath((backend, table)): ApiPath<(String, String)>,
) -> Result<Json<QueryResult>, ApiError> {
    let backend = state.registry.resolve(&backend)?;
    let result = QueryExecutor::new(&state.registry)
        .preview_table(backend, &table)
        .await?;
    Ok(Json(result))
}

/// Final segment that turns a POST on a table path into a custom query
const QUERY_SEGMENT: &str = "query";

/// POST /tables/{backend}/query - run caller-supplied SQL
///
/// Shares its path with the table preview so a table named `query` can
/// still be previewed with GET.
async fn custom_query(
    State(state): State<Arc<AppState>>,
    ApiPath((backend, segment)): ApiPath<(String, String)>,
    ApiJson(req): ApiJson<CustomQueryRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    if segment != QUERY_SEGMENT {
        return Err(DashError::NotFound {
            resource: "endpoint",
            id: format!("POST /tables/{backend}/{segment}"),
        }
        .into());
    }
    let backend = state.registry.resolve(&backend)?;
    let result = QueryExecutor::new(&state.registry)
        .run_query(backend, &req.query, &req.params)
        .await?;
    Ok(Json(result))
}

/// GET /tables/{backend}/{table}/metadata - column details for one table
async fn table_metadata(
    State(state): State<Arc<AppState>>,
    ApiPath((backend, table)): ApiPath<(String, String)>,
) -> Result<Json<TableDescriptor>, ApiError> {
    let backend = state.registry.resolve(&backend)?;
    let descriptor = Introspector::new(&state.registry)
        .table_metadata(backend, &table)
        .await?;
    Ok(Json(descriptor))
}

/// GET /schema - columns and relationships for every backend
async fn schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, BackendSchema>>, ApiError> {
    let schemas = Introspector::new(&state.registry).relational_schema().await?;
    Ok(Json(schemas))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tables", get(list_tables))
        .route(
            "/tables/{backend}/{table}",
            get(preview_table).post(custom_query),
        )
        .route("/tables/{backend}/{table}/metadata", get(table_metadata))
        .route("/schema", get(schema))
}
