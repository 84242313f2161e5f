//! Waypoint CLI - drive the offline-first journal store and sync engine
//!
//! Records are written to the local store immediately; `sync` and `watch`
//! reconcile them with the Supabase backend (or an in-process demo backend).

mod cli;
mod commands;
mod config;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;
use waypoint_core::EntityKind;

use crate::cli::{Cli, Commands, LogCommands, PlaceCommands, TripCommands};
use crate::commands::common::AppContext;
use crate::commands::completions::run_completions;
use crate::commands::photos::run_attach;
use crate::commands::records::{
    run_add_log, run_add_place, run_add_trip, run_delete, run_list, NewPlace,
};
use crate::commands::sync::{run_retry, run_status, run_sync, run_watch};
use crate::config::{resolve_db_path, CliConfig};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let db_path = resolve_db_path(cli.db_path);
    tracing::debug!("Opening local store at {}", db_path.display());
    let ctx = AppContext::open(&db_path, config, cli.offline_demo)?;

    match cli.command {
        Commands::Place { command } => match command {
            PlaceCommands::Add {
                name,
                lat,
                lon,
                address,
                category,
            } => {
                run_add_place(
                    &ctx,
                    NewPlace {
                        name,
                        lat,
                        lon,
                        address,
                        category,
                    },
                )?;
            }
            PlaceCommands::List(args) => run_list(&ctx, EntityKind::Place, &args)?,
            PlaceCommands::Delete { id } => {
                run_delete(&ctx, EntityKind::Place, &id)?;
            }
        },
        Commands::Log { command } => match command {
            LogCommands::Add {
                place,
                title,
                notes,
                rating,
            } => {
                run_add_log(&ctx, &place, title, notes, rating)?;
            }
            LogCommands::List(args) => run_list(&ctx, EntityKind::Log, &args)?,
            LogCommands::Delete { id } => {
                run_delete(&ctx, EntityKind::Log, &id)?;
            }
        },
        Commands::Trip { command } => match command {
            TripCommands::Add {
                name,
                description,
                logs,
            } => {
                run_add_trip(&ctx, name, description, &logs)?;
            }
            TripCommands::List(args) => run_list(&ctx, EntityKind::Trip, &args)?,
            TripCommands::Delete { id } => {
                run_delete(&ctx, EntityKind::Trip, &id)?;
            }
        },
        Commands::Photos { owner, id, paths } => {
            run_attach(&ctx, owner, &id, &paths).await?;
        }
        Commands::Sync => {
            run_sync(&ctx).await?;
        }
        Commands::Status { json } => run_status(&ctx, json)?,
        Commands::Retry => {
            run_retry(&ctx)?;
        }
        Commands::Watch { interval } => run_watch(&ctx, interval).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
