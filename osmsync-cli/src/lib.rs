//! Command-line interface for loading and synchronising map-feature stores.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod diff;
mod error;
mod import;
mod options;
mod runtime;
mod store;
mod update;

pub use error::CliError;

use diff::{DiffArgs, run_diff};
use import::{ImportArgs, run_import};
use update::{UpdateArgs, run_update};

const ARG_STORE: &str = "store";
const ARG_SRID: &str = "srid";
const ARG_GEOMETRY_MODE: &str = "geometry-mode";
const ARG_EXTRACT: &str = "extract";
const ARG_REPLICATION_URL: &str = "replication-url";
const ARG_SEQUENCE_NUMBER: &str = "sequence-number";
const ARG_REPLICATION_TIMESTAMP: &str = "replication-timestamp";
const ARG_INCREMENTS: &str = "increments";
const ARG_ZOOM: &str = "zoom";
const ARG_COUNT: &str = "count";
const ENV_IMPORT_STORE: &str = "OSMSYNC_CMDS_IMPORT_STORE";
const ENV_IMPORT_EXTRACT: &str = "OSMSYNC_CMDS_IMPORT_EXTRACT";
const ENV_IMPORT_REPLICATION_URL: &str = "OSMSYNC_CMDS_IMPORT_REPLICATION_URL";
const ENV_IMPORT_REPLICATION_TIMESTAMP: &str = "OSMSYNC_CMDS_IMPORT_REPLICATION_TIMESTAMP";
const ENV_UPDATE_STORE: &str = "OSMSYNC_CMDS_UPDATE_STORE";
const ENV_DIFF_STORE: &str = "OSMSYNC_CMDS_DIFF_STORE";
const ENV_DIFF_ZOOM: &str = "OSMSYNC_CMDS_DIFF_ZOOM";

/// Run the osmsync CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Import(args) => run_import(args),
        Command::Update(args) => run_update(args),
        Command::Diff(args) => run_diff(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osmsync",
    about = "Load map-feature extracts, follow replication feeds and list changed tiles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bulk-load a full extract into a store.
    Import(ImportArgs),
    /// Apply the next replication increments to a store.
    Update(UpdateArgs),
    /// List the tiles touched by pending increments.
    Diff(DiffArgs),
}

#[cfg(test)]
mod tests;
