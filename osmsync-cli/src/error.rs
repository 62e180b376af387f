//! Error types emitted by the osmsync CLI.
//!
//! Service failures are wrapped as-is so their source chains reach the
//! final diagnostic.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmsync_core::{ProjectionError, TileError};
use osmsync_core::store::StoreError;
use osmsync_data::{DiffError, FetchError, ImportError, UpdateError};
use thiserror::Error;

/// Errors emitted by the osmsync CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The configured SRID is not supported.
    #[error(transparent)]
    UnsupportedSrid(#[from] ProjectionError),
    /// The requested zoom level is out of range.
    #[error(transparent)]
    InvalidZoom(#[from] TileError),
    /// A count option was zero.
    #[error("--{field} must be at least 1")]
    ZeroCount { field: &'static str },
    /// A baseline timestamp was not RFC 3339.
    #[error("invalid replication timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// The extract location is neither a URI nor a usable path.
    #[error("extract location {value:?} is not a URI or an absolute path")]
    InvalidExtract { value: String },
    /// The working directory could not be determined.
    #[error("failed to resolve the working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),
    /// The store does not exist yet.
    #[error("store {path:?} does not exist; run `osmsync import` first")]
    MissingStore { path: Utf8PathBuf },
    /// The store path could not be inspected or prepared.
    #[error("failed to prepare store path {path:?}: {source}")]
    PrepareStore {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the store failed.
    #[error("failed to open store {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: StoreError,
    },
    /// Recording the baseline header failed.
    #[error("failed to record the baseline header: {0}")]
    RecordBaseline(#[source] StoreError),
    /// The blob source could not be constructed.
    #[error("failed to build the blob source: {0}")]
    BuildSource(#[source] FetchError),
    /// The async runtime could not be started.
    #[error("failed to start the runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Importing the extract failed.
    #[error("import failed: {0}")]
    Import(#[from] ImportError),
    /// Applying an increment failed.
    #[error("update failed: {0}")]
    Update(#[from] UpdateError),
    /// Computing the tile footprint failed.
    #[error("diff failed: {0}")]
    Diff(#[from] DiffError),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
