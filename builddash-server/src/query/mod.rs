//! Query execution - bounded table previews and caller-supplied SQL
//!
//! Both operations materialize every row before returning and report any
//! backend error as [`DashError::QueryFailed`] with the driver's message.

pub mod decode;
pub mod params;
pub mod pg_text;

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgTypeInfo;
use sqlx::{Either, Executor, PgConnection};

use crate::error::{DashError, Result};
use crate::introspect::{fetch_columns, fetch_table_names};
use crate::registry::{Backend, Registry};

pub use params::NamedQuery;

/// Hard cap on rows returned by [`QueryExecutor::preview_table`]
pub const PREVIEW_ROW_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<ResultColumn>,
    pub data: Vec<Map<String, Value>>,
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub struct QueryExecutor<'a> {
    registry: &'a Registry,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// First [`PREVIEW_ROW_LIMIT`] rows of a table.
    ///
    /// The table must be one the backend lists; the name is then quoted and
    /// qualified with the configured schema before it enters statement text.
    pub async fn preview_table(&self, backend: Backend, table: &str) -> Result<QueryResult> {
        let schema = self.registry.schema(backend);
        let mut conn = self.registry.acquire(backend).await?;
        let backend_err = |e: sqlx::Error| DashError::from_backend(backend.as_str(), e);

        let known = fetch_table_names(&mut conn, schema).await.map_err(backend_err)?;
        if !known.iter().any(|t| t == table) {
            tracing::warn!(backend = %backend, table, "Rejected preview of unlisted table");
            return Err(DashError::UnknownTable {
                backend: backend.as_str().to_owned(),
                table: table.to_owned(),
            });
        }

        let columns = fetch_columns(&mut conn, schema, Some(table))
            .await
            .map_err(backend_err)?
            .into_iter()
            .map(|c| ResultColumn {
                name: c.column_name,
                data_type: c.data_type,
            })
            .collect();

        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_ident(schema),
            quote_ident(table),
            PREVIEW_ROW_LIMIT
        );
        tracing::debug!(backend = %backend, %sql, "Running preview");

        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(backend_err)?;

        Ok(QueryResult {
            columns,
            data: rows.iter().map(decode::row_to_json).collect(),
        })
    }

    /// Run arbitrary SQL with `:name` parameters bound by the driver.
    pub async fn run_query(
        &self,
        backend: Backend,
        sql: &str,
        params: &Map<String, Value>,
    ) -> Result<QueryResult> {
        let named = NamedQuery::parse(sql);
        let values = named.values(params)?;
        let backend_err = |e: sqlx::Error| DashError::from_backend(backend.as_str(), e);

        let mut conn = self.registry.acquire(backend).await?;

        let inferred = if values.iter().any(|v| params::needs_inference(v)) {
            infer_parameter_types(&mut conn, &named, &values).await
        } else {
            Vec::new()
        };
        let statement = named.render(|position| {
            let inferred = inferred.get(position - 1).and_then(Option::as_ref);
            params::placeholder(position, values[position - 1], inferred)
        });
        tracing::debug!(backend = %backend, sql = %statement, params = values.len(), "Running query");

        let mut query = sqlx::query(&statement);
        for value in &values {
            query = params::bind_json(query, value);
        }
        let rows = query.fetch_all(&mut *conn).await.map_err(backend_err)?;

        let columns = match rows.first() {
            Some(row) => decode::result_columns(sqlx::Row::columns(row)),
            None => {
                let described = (&mut *conn).describe(&statement).await.map_err(backend_err)?;
                decode::result_columns(described.columns())
            }
        };

        Ok(QueryResult {
            columns,
            data: rows.iter().map(decode::row_to_json).collect(),
        })
    }
}

/// Ask the server which type each string or null placeholder takes.
///
/// Typed values keep their cast, so the describe only leaves the untyped
/// positions open. On failure nothing is inferred and the values go as text.
async fn infer_parameter_types(
    conn: &mut PgConnection,
    named: &NamedQuery,
    values: &[&Value],
) -> Vec<Option<PgTypeInfo>> {
    let open_sql = named.render(|position| {
        let value = values[position - 1];
        if params::needs_inference(value) {
            format!("${position}")
        } else {
            params::placeholder(position, value, None)
        }
    });

    match (&mut *conn).describe(&open_sql).await {
        Ok(described) => match described.parameters() {
            Some(Either::Left(types)) => types.iter().cloned().map(Some).collect(),
            _ => Vec::new(),
        },
        Err(e) => {
            tracing::debug!(error = %e, "Could not infer parameter types");
            Vec::new()
        }
    }
}
