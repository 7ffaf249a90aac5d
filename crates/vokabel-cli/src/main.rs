//! Vokabel CLI - keep a vocabulary collection on this device and sync it
//! with a Vokabel server.

mod cli;
mod commands;
mod error;
mod transport;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_db_path;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditRequest};
use crate::commands::list::run_list;
use crate::commands::shell::run_shell;
use crate::commands::sync::{run_conflicts, run_resolve, run_status, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("vokabel=warn,vokabel_core=warn")
            }),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add {
            german,
            english,
            fields,
        }) => run_add(&german, &english, &fields, &db_path).await?,
        Some(Commands::List { limit, json }) => run_list(limit, json, &db_path).await?,
        Some(Commands::Edit {
            id,
            german,
            english,
            fields,
        }) => {
            let request = EditRequest {
                german: german.as_deref(),
                english: english.as_deref(),
                fields: &fields,
            };
            run_edit(&id, &request, &db_path).await?;
        }
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Sync) => run_sync(&db_path).await?,
        Some(Commands::Status { json }) => run_status(json, &db_path).await?,
        Some(Commands::Conflicts { json }) => run_conflicts(json, &db_path).await?,
        Some(Commands::Resolve { id, resolution }) => {
            run_resolve(&id, resolution, &db_path).await?;
        }
        Some(Commands::Shell) => run_shell(&db_path).await?,
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
