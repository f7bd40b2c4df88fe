//! builddash CLI - dashboard backend server and catalog inspection
//!
//! - `serve`: run the HTTP API (tables, schema, custom queries, layouts)
//! - `tables`: print table names per backend
//! - `schema`: print columns and relationships per backend

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "builddash",
    author,
    version,
    about = "Dashboard backend: schema introspection, query pass-through, and layout storage"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// List tables of every configured backend as JSON
    Tables(commands::inspect::TablesArgs),
    /// Print the relational schema of every backend as JSON
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await?,
        Commands::Tables(args) => commands::run_tables(args).await?,
        Commands::Schema => commands::run_schema().await?,
    }
    Ok(())
}
