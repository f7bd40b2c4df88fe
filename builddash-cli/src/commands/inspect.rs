//! One-shot introspection commands that print JSON to stdout

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Parser;

use builddash_server::{Backend, Introspector, Registry};

use crate::config::load_settings;

#[derive(Parser, Debug)]
pub struct TablesArgs {
    /// Only list tables of this backend (asset_manager, landing_tables)
    #[arg(long)]
    pub backend: Option<String>,
}

/// Print table names per backend
pub async fn run_tables(args: TablesArgs) -> Result<()> {
    let settings = load_settings()?;
    let registry = Registry::connect_lazy(&settings);
    let introspector = Introspector::new(&registry);

    let output: BTreeMap<String, Vec<String>> = match args.backend {
        Some(id) => {
            let backend: Backend = registry.resolve(&id)?;
            let tables = introspector
                .list_tables(backend)
                .await
                .with_context(|| format!("Failed to list tables for {}", backend))?;
            BTreeMap::from([(backend.as_str().to_owned(), tables)])
        }
        None => introspector
            .list_all_tables()
            .await
            .context("Failed to list tables")?,
    };

    registry.close().await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the full relational schema of every backend
pub async fn run_schema() -> Result<()> {
    let settings = load_settings()?;
    let registry = Registry::connect_lazy(&settings);

    let schema = Introspector::new(&registry)
        .relational_schema()
        .await
        .context("Failed to read schema")?;

    registry.close().await;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
