//! Diff command implementation for the osmsync CLI.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmsync_core::{MAX_ZOOM, TileError};
use osmsync_data::{BlobSource, DiffReport, DiffService, ResolveOptions, UriBlobSource};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::options::{ModeArg, resolve_options};
use crate::runtime::block_on_interruptible;
use crate::store::open_existing_store;
use crate::{
    ARG_COUNT, ARG_GEOMETRY_MODE, ARG_SRID, ARG_STORE, ARG_ZOOM, CliError, ENV_DIFF_STORE,
    ENV_DIFF_ZOOM,
};

/// CLI arguments for the `diff` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch the increments after the store's latest header and \
                 print every z/x/y tile whose content they change, one per \
                 line. The store and its caches are left untouched.",
    about = "List the tiles touched by pending increments"
)]
#[ortho_config(prefix = "OSMSYNC")]
pub(crate) struct DiffArgs {
    /// SQLite store created by `osmsync import`.
    #[arg(long = ARG_STORE, value_name = "path")]
    #[serde(default)]
    pub(crate) store: Option<Utf8PathBuf>,
    /// Spatial reference of stored geometries (3857 or 4326).
    #[arg(long = ARG_SRID, value_name = "srid")]
    #[serde(default)]
    pub(crate) srid: Option<i32>,
    /// Whether unresolved references abort the diff.
    #[arg(long = ARG_GEOMETRY_MODE, value_name = "mode", value_enum)]
    #[serde(default)]
    pub(crate) geometry_mode: Option<ModeArg>,
    /// Zoom level of the reported tiles.
    #[arg(long = ARG_ZOOM, value_name = "z")]
    #[serde(default)]
    pub(crate) zoom: Option<u8>,
    /// Number of pending increments to examine (default 1).
    #[arg(long = ARG_COUNT, value_name = "n")]
    #[serde(default)]
    pub(crate) count: Option<usize>,
}

impl DiffArgs {
    pub(crate) fn into_config(self) -> Result<DiffConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        DiffConfig::try_from(merged)
    }
}

/// Resolved `diff` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiffConfig {
    pub(crate) store: Utf8PathBuf,
    pub(crate) options: ResolveOptions,
    pub(crate) zoom: u8,
    pub(crate) count: usize,
}

impl TryFrom<DiffArgs> for DiffConfig {
    type Error = CliError;

    fn try_from(args: DiffArgs) -> Result<Self, Self::Error> {
        let store = args.store.ok_or(CliError::MissingArgument {
            field: ARG_STORE,
            env: ENV_DIFF_STORE,
        })?;
        let zoom = args.zoom.ok_or(CliError::MissingArgument {
            field: ARG_ZOOM,
            env: ENV_DIFF_ZOOM,
        })?;
        if zoom > MAX_ZOOM {
            return Err(TileError::ZoomTooDeep { zoom }.into());
        }
        let count = args.count.unwrap_or(1);
        if count == 0 {
            return Err(CliError::ZeroCount { field: ARG_COUNT });
        }
        Ok(Self {
            store,
            options: resolve_options(args.srid, args.geometry_mode)?,
            zoom,
            count,
        })
    }
}

pub(crate) fn run_diff(args: DiffArgs) -> Result<(), CliError> {
    let config = args.into_config()?;
    let source = UriBlobSource::with_defaults().map_err(CliError::BuildSource)?;
    let mut stdout = std::io::stdout().lock();
    run_diff_with(&config, &source, &mut stdout)
}

pub(crate) fn run_diff_with(
    config: &DiffConfig,
    source: &dyn BlobSource,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let store = open_existing_store(&config.store)?;
    let coordinates = store.coordinate_cache();
    let references = store.reference_cache();
    let token = CancellationToken::new();
    let service = DiffService::new(source, config.options).with_cancellation(token.clone());
    let report = block_on_interruptible(
        &token,
        service.diff(
            &store,
            &coordinates,
            &references,
            config.zoom,
            config.count,
        ),
    )??;
    info!(
        "examined increments {:?} of {}",
        report.sequence_numbers, config.store
    );
    write_tiles(writer, &report).map_err(CliError::WriteOutput)
}

fn write_tiles(writer: &mut dyn Write, report: &DiffReport) -> std::io::Result<()> {
    for tile in &report.tiles {
        writeln!(writer, "{tile}")?;
    }
    Ok(())
}
