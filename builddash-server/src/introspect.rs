//! Schema introspection over `information_schema`
//!
//! Primary keys are detected by matching `PRIMARY KEY` constraint rows to
//! columns on table and column name only, not on constraint identity. Two
//! constraints on one table naming the same column both count.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::error::{DashError, Result};
use crate::registry::{Backend, Registry};

const TABLES_SQL: &str = r#"
    SELECT table_name::text AS table_name
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

/// `$2` restricts the result to one table when not null.
const COLUMNS_SQL: &str = r#"
    SELECT
        c.table_name::text AS table_name,
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default,
        c.character_maximum_length::int4 AS max_length,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND kcu.table_name = c.table_name
              AND kcu.column_name = c.column_name
        ) AS is_primary_key
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_schema = c.table_schema
       AND t.table_name = c.table_name
    WHERE c.table_schema = $1
      AND t.table_type = 'BASE TABLE'
      AND ($2::text IS NULL OR c.table_name = $2)
    ORDER BY c.table_name, c.ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        kcu.table_name::text AS from_table,
        kcu.column_name::text AS from_column,
        ccu.table_name::text AS to_table,
        ccu.column_name::text AS to_column
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
       AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
        ON tc.constraint_name = ccu.constraint_name
       AND tc.table_schema = ccu.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND tc.table_schema = $1
    ORDER BY kcu.table_name, kcu.ordinal_position
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<i32>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Directed foreign-key edge, referencing side first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct RelationshipEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
    pub relationships: Vec<RelationshipEdge>,
}

/// Table name -> columns and outgoing relationships
pub type BackendSchema = BTreeMap<String, TableSchema>;

/// One row of [`COLUMNS_SQL`]
#[derive(Debug, Clone, FromRow)]
pub struct CatalogColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
    pub column_default: Option<String>,
    pub max_length: Option<i32>,
    pub is_primary_key: bool,
}

impl From<CatalogColumn> for ColumnDescriptor {
    fn from(c: CatalogColumn) -> Self {
        Self {
            name: c.column_name,
            data_type: c.data_type,
            nullable: c.is_nullable == "YES",
            default: c.column_default,
            max_length: c.max_length,
            is_primary_key: c.is_primary_key,
        }
    }
}

/// Group catalog rows into per-table schemas.
///
/// Column order follows the input, which the catalog query sorts by ordinal
/// position. Edges attach to their referencing table.
pub fn assemble_schema(
    columns: Vec<CatalogColumn>,
    edges: Vec<RelationshipEdge>,
) -> BackendSchema {
    let mut tables = BackendSchema::new();

    for column in columns {
        tables
            .entry(column.table_name.clone())
            .or_default()
            .columns
            .push(column.into());
    }

    for edge in edges {
        tables
            .entry(edge.from_table.clone())
            .or_default()
            .relationships
            .push(edge);
    }

    tables
}

/// Catalog queries against the registry's backends
pub struct Introspector<'a> {
    registry: &'a Registry,
}

impl<'a> Introspector<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Base tables visible in the backend's configured schema.
    pub async fn list_tables(&self, backend: Backend) -> Result<Vec<String>> {
        let mut conn = self.registry.acquire(backend).await?;
        fetch_table_names(&mut conn, self.registry.schema(backend))
            .await
            .map_err(|e| DashError::from_backend(backend.as_str(), e))
    }

    /// Table names for every backend. The first failing backend fails the call.
    pub async fn list_all_tables(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut all = BTreeMap::new();
        for backend in Backend::ALL {
            let tables = self.list_tables(backend).await?;
            all.insert(backend.as_str().to_owned(), tables);
        }
        Ok(all)
    }

    /// Columns and outgoing relationships for every table of every backend.
    pub async fn relational_schema(&self) -> Result<BTreeMap<String, BackendSchema>> {
        let mut schemas = BTreeMap::new();
        for backend in Backend::ALL {
            let schema = self.backend_schema(backend).await?;
            schemas.insert(backend.as_str().to_owned(), schema);
        }
        Ok(schemas)
    }

    async fn backend_schema(&self, backend: Backend) -> Result<BackendSchema> {
        let schema = self.registry.schema(backend);
        let mut conn = self.registry.acquire(backend).await?;

        let columns = fetch_columns(&mut conn, schema, None)
            .await
            .map_err(|e| DashError::from_backend(backend.as_str(), e))?;

        let edges: Vec<RelationshipEdge> = sqlx::query_as(FOREIGN_KEYS_SQL)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DashError::from_backend(backend.as_str(), e))?;

        tracing::debug!(
            backend = %backend,
            columns = columns.len(),
            relationships = edges.len(),
            "Loaded relational schema"
        );

        Ok(assemble_schema(columns, edges))
    }

    /// Column metadata for one table, in ordinal order.
    pub async fn table_metadata(&self, backend: Backend, table: &str) -> Result<TableDescriptor> {
        let mut conn = self.registry.acquire(backend).await?;
        let columns = fetch_columns(&mut conn, self.registry.schema(backend), Some(table))
            .await
            .map_err(|e| DashError::from_backend(backend.as_str(), e))?;

        if columns.is_empty() {
            return Err(DashError::UnknownTable {
                backend: backend.as_str().to_owned(),
                table: table.to_owned(),
            });
        }

        Ok(TableDescriptor {
            table_name: table.to_owned(),
            columns: columns.into_iter().map(ColumnDescriptor::from).collect(),
        })
    }
}

pub(crate) async fn fetch_table_names(
    conn: &mut PgConnection,
    schema: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(TABLES_SQL)
        .bind(schema)
        .fetch_all(conn)
        .await
}

pub(crate) async fn fetch_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: Option<&str>,
) -> Result<Vec<CatalogColumn>, sqlx::Error> {
    sqlx::query_as(COLUMNS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_all(conn)
        .await
}
