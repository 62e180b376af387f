//! Settings shared by every subcommand.

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use osmsync_core::{GeometryMode, SpatialReference};
use osmsync_data::ResolveOptions;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::CliError;

/// How unresolved geometry is handled, as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ModeArg {
    /// Store elements without geometry and carry on.
    #[default]
    Lenient,
    /// Abort on the first unresolved reference.
    Strict,
}

impl From<ModeArg> for GeometryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lenient => Self::Lenient,
            ModeArg::Strict => Self::Strict,
        }
    }
}

/// Resolve the SRID and geometry mode, defaulting to EPSG:3857 and lenient.
pub(crate) fn resolve_options(
    srid: Option<i32>,
    mode: Option<ModeArg>,
) -> Result<ResolveOptions, CliError> {
    let spatial_reference = match srid {
        Some(srid) => SpatialReference::from_srid(srid)?,
        None => SpatialReference::default(),
    };
    Ok(ResolveOptions {
        spatial_reference,
        geometry_mode: mode.unwrap_or_default().into(),
    })
}

/// Interpret an extract location as a URI, or as a path relative to the
/// working directory.
pub(crate) fn extract_uri(value: &str) -> Result<Url, CliError> {
    // Single-letter schemes are Windows drive letters.
    if let Ok(uri) = Url::parse(value)
        && uri.scheme().len() > 1
    {
        return Ok(uri);
    }
    let path = Utf8Path::new(value);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(CliError::WorkingDirectory)?;
        let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|_| CliError::InvalidExtract {
            value: value.to_owned(),
        })?;
        cwd.join(path)
    };
    Url::from_file_path(absolute.as_std_path()).map_err(|()| CliError::InvalidExtract {
        value: value.to_owned(),
    })
}
