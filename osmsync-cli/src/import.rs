//! Import command implementation for the osmsync CLI.

use std::io::Write;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmsync_core::Header;
use osmsync_data::{BlobSource, ImportReport, ImportService, ResolveOptions, UriBlobSource};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::options::{ModeArg, extract_uri, resolve_options};
use crate::runtime::block_on_interruptible;
use crate::store::create_store;
use crate::{
    ARG_EXTRACT, ARG_GEOMETRY_MODE, ARG_REPLICATION_TIMESTAMP, ARG_REPLICATION_URL,
    ARG_SEQUENCE_NUMBER, ARG_SRID, ARG_STORE, CliError, ENV_IMPORT_EXTRACT,
    ENV_IMPORT_REPLICATION_TIMESTAMP, ENV_IMPORT_REPLICATION_URL, ENV_IMPORT_STORE,
};

/// CLI arguments for the `import` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Load a full extract (.osm.pbf or .osm, optionally .gz or \
                 .bz2 compressed) into a SQLite store. Pass the replication \
                 feed and the extract's replication timestamp to record the \
                 baseline header that later updates continue from.",
    about = "Bulk-load a full extract"
)]
#[ortho_config(prefix = "OSMSYNC")]
pub(crate) struct ImportArgs {
    /// SQLite store to create or extend.
    #[arg(long = ARG_STORE, value_name = "path")]
    #[serde(default)]
    pub(crate) store: Option<Utf8PathBuf>,
    /// Extract URI (`file`, `http`, `https`) or local path.
    #[arg(long = ARG_EXTRACT, value_name = "uri")]
    #[serde(default)]
    pub(crate) extract: Option<String>,
    /// Spatial reference of stored geometries (3857 or 4326).
    #[arg(long = ARG_SRID, value_name = "srid")]
    #[serde(default)]
    pub(crate) srid: Option<i32>,
    /// Whether unresolved references abort the import.
    #[arg(long = ARG_GEOMETRY_MODE, value_name = "mode", value_enum)]
    #[serde(default)]
    pub(crate) geometry_mode: Option<ModeArg>,
    /// Replication feed the baseline header points at.
    #[arg(long = ARG_REPLICATION_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) replication_url: Option<String>,
    /// Sequence number of the baseline header.
    #[arg(long = ARG_SEQUENCE_NUMBER, value_name = "n")]
    #[serde(default)]
    pub(crate) sequence_number: Option<i64>,
    /// Replication timestamp of the extract (RFC 3339).
    #[arg(long = ARG_REPLICATION_TIMESTAMP, value_name = "timestamp")]
    #[serde(default)]
    pub(crate) replication_timestamp: Option<String>,
}

impl ImportArgs {
    pub(crate) fn into_config(self) -> Result<ImportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ImportConfig::try_from(merged)
    }
}

/// Resolved `import` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImportConfig {
    pub(crate) store: Utf8PathBuf,
    pub(crate) extract: Url,
    pub(crate) options: ResolveOptions,
    /// Header recorded once the extract is loaded.
    pub(crate) baseline: Option<Header>,
}

impl TryFrom<ImportArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: ImportArgs) -> Result<Self, Self::Error> {
        let store = args.store.ok_or(CliError::MissingArgument {
            field: ARG_STORE,
            env: ENV_IMPORT_STORE,
        })?;
        let extract = args.extract.ok_or(CliError::MissingArgument {
            field: ARG_EXTRACT,
            env: ENV_IMPORT_EXTRACT,
        })?;
        let options = resolve_options(args.srid, args.geometry_mode)?;
        let baseline = baseline_header(
            args.replication_url,
            args.sequence_number,
            args.replication_timestamp,
        )?;
        Ok(Self {
            store,
            extract: extract_uri(&extract)?,
            options,
            baseline,
        })
    }
}

fn baseline_header(
    replication_url: Option<String>,
    sequence_number: Option<i64>,
    replication_timestamp: Option<String>,
) -> Result<Option<Header>, CliError> {
    let Some(replication_url) = replication_url else {
        if replication_timestamp.is_some() || sequence_number.is_some() {
            return Err(CliError::MissingArgument {
                field: ARG_REPLICATION_URL,
                env: ENV_IMPORT_REPLICATION_URL,
            });
        }
        return Ok(None);
    };
    let value = replication_timestamp.ok_or(CliError::MissingArgument {
        field: ARG_REPLICATION_TIMESTAMP,
        env: ENV_IMPORT_REPLICATION_TIMESTAMP,
    })?;
    let timestamp = DateTime::parse_from_rfc3339(&value)
        .map_err(|source| CliError::InvalidTimestamp {
            value: value.clone(),
            source,
        })?
        .with_timezone(&Utc);
    Ok(Some(Header::new(
        sequence_number.unwrap_or(0),
        timestamp,
        replication_url,
    )))
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), CliError> {
    let config = args.into_config()?;
    let source = UriBlobSource::with_defaults().map_err(CliError::BuildSource)?;
    let mut stdout = std::io::stdout().lock();
    run_import_with(&config, &source, &mut stdout)
}

pub(crate) fn run_import_with(
    config: &ImportConfig,
    source: &dyn BlobSource,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let store = create_store(&config.store)?;
    let mut coordinates = store.coordinate_cache();
    let mut references = store.reference_cache();
    let token = CancellationToken::new();
    let service = ImportService::new(source, config.options).with_cancellation(token.clone());
    let report = block_on_interruptible(
        &token,
        service.import(&config.extract, &store, &mut coordinates, &mut references),
    )??;

    if let Some(header) = &config.baseline {
        store
            .headers()
            .insert(header)
            .map_err(CliError::RecordBaseline)?;
        info!(
            "recorded baseline header {} for {}",
            header.replication_sequence_number, header.replication_url
        );
    }
    write_import_report(writer, config, &report).map_err(CliError::WriteOutput)
}

fn write_import_report(
    writer: &mut dyn Write,
    config: &ImportConfig,
    report: &ImportReport,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "imported {} nodes, {} ways and {} relations into {}",
        report.nodes, report.ways, report.relations, config.store
    )?;
    if report.unresolved > 0 {
        writeln!(
            writer,
            "{} elements stored without geometry",
            report.unresolved
        )?;
    }
    if let Some(bound) = &report.bound {
        writeln!(
            writer,
            "bounds {},{},{},{}",
            bound.min_lon, bound.min_lat, bound.max_lon, bound.max_lat
        )?;
    }
    match &config.baseline {
        Some(header) => writeln!(
            writer,
            "baseline sequence {} at {}",
            header.replication_sequence_number,
            header.replication_timestamp.to_rfc3339()
        ),
        None => writeln!(
            writer,
            "no baseline header recorded; pass --{ARG_REPLICATION_URL} to enable updates"
        ),
    }
}
