//! Update command implementation for the osmsync CLI.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmsync_core::store::SqliteStore;
use osmsync_data::{
    BlobSource, ResolveOptions, TimestampSource, UpdateError, UpdateReport, UpdateService,
    UriBlobSource,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::options::{ModeArg, resolve_options};
use crate::runtime::block_on_interruptible;
use crate::store::open_existing_store;
use crate::{
    ARG_GEOMETRY_MODE, ARG_INCREMENTS, ARG_SRID, ARG_STORE, CliError, ENV_UPDATE_STORE,
};

/// CLI arguments for the `update` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch the increment after the store's latest header from \
                 its replication feed and apply it in one transaction. With \
                 --increments, keep going until that many are applied or the \
                 feed has nothing newer.",
    about = "Apply the next replication increments"
)]
#[ortho_config(prefix = "OSMSYNC")]
pub(crate) struct UpdateArgs {
    /// SQLite store created by `osmsync import`.
    #[arg(long = ARG_STORE, value_name = "path")]
    #[serde(default)]
    pub(crate) store: Option<Utf8PathBuf>,
    /// Spatial reference of stored geometries (3857 or 4326).
    #[arg(long = ARG_SRID, value_name = "srid")]
    #[serde(default)]
    pub(crate) srid: Option<i32>,
    /// Whether unresolved references abort the update.
    #[arg(long = ARG_GEOMETRY_MODE, value_name = "mode", value_enum)]
    #[serde(default)]
    pub(crate) geometry_mode: Option<ModeArg>,
    /// Maximum number of increments to apply (default 1).
    #[arg(long = ARG_INCREMENTS, value_name = "n")]
    #[serde(default)]
    pub(crate) increments: Option<usize>,
}

impl UpdateArgs {
    pub(crate) fn into_config(self) -> Result<UpdateConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        UpdateConfig::try_from(merged)
    }
}

/// Resolved `update` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UpdateConfig {
    pub(crate) store: Utf8PathBuf,
    pub(crate) options: ResolveOptions,
    pub(crate) increments: usize,
}

impl TryFrom<UpdateArgs> for UpdateConfig {
    type Error = CliError;

    fn try_from(args: UpdateArgs) -> Result<Self, Self::Error> {
        let store = args.store.ok_or(CliError::MissingArgument {
            field: ARG_STORE,
            env: ENV_UPDATE_STORE,
        })?;
        let increments = args.increments.unwrap_or(1);
        if increments == 0 {
            return Err(CliError::ZeroCount {
                field: ARG_INCREMENTS,
            });
        }
        Ok(Self {
            store,
            options: resolve_options(args.srid, args.geometry_mode)?,
            increments,
        })
    }
}

pub(crate) fn run_update(args: UpdateArgs) -> Result<(), CliError> {
    let config = args.into_config()?;
    let source = UriBlobSource::with_defaults().map_err(CliError::BuildSource)?;
    let mut stdout = std::io::stdout().lock();
    run_update_with(&config, &source, &mut stdout)
}

pub(crate) fn run_update_with(
    config: &UpdateConfig,
    source: &dyn BlobSource,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let store = open_existing_store(&config.store)?;
    let token = CancellationToken::new();
    let service = UpdateService::new(source, config.options).with_cancellation(token.clone());
    let (reports, failure) = block_on_interruptible(
        &token,
        apply_increments(&service, &store, config.increments),
    )?;
    for report in &reports {
        write_update_report(writer, report).map_err(CliError::WriteOutput)?;
    }
    match failure {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

/// Apply up to `limit` increments, stopping quietly once the feed runs dry.
///
/// Increments applied before a failure stay committed and are returned with
/// the error.
async fn apply_increments<S: BlobSource>(
    service: &UpdateService<S>,
    store: &SqliteStore,
    limit: usize,
) -> (Vec<UpdateReport>, Option<UpdateError>) {
    let mut coordinates = store.coordinate_cache();
    let mut references = store.reference_cache();
    let mut reports = Vec::new();
    while reports.len() < limit {
        match service
            .update(store, &mut coordinates, &mut references)
            .await
        {
            Ok(report) => reports.push(report),
            Err(UpdateError::Increment(error)) if !reports.is_empty() && error.is_not_found() => {
                info!("feed has nothing newer after {} increments", reports.len());
                break;
            }
            Err(error) => return (reports, Some(error)),
        }
    }
    (reports, None)
}

fn write_update_report(writer: &mut dyn Write, report: &UpdateReport) -> std::io::Result<()> {
    writeln!(
        writer,
        "applied increment {}: {} created, {} modified, {} deleted",
        report.header.replication_sequence_number, report.created, report.modified, report.deleted
    )?;
    writeln!(
        writer,
        "replication timestamp {} (from {})",
        report.header.replication_timestamp.to_rfc3339(),
        timestamp_origin(report.timestamp_source)
    )?;
    if report.unresolved > 0 {
        writeln!(
            writer,
            "{} elements stored without geometry",
            report.unresolved
        )?;
    }
    Ok(())
}

const fn timestamp_origin(source: TimestampSource) -> &'static str {
    match source {
        TimestampSource::StateFile => "state file",
        TimestampSource::Changes => "change timestamps",
        TimestampSource::PreviousHeader => "previous header",
    }
}
