//! Opening the SQLite store named on the command line.

use std::io;

use camino::Utf8Path;
use osmsync_core::store::SqliteStore;

use crate::CliError;

/// Open `path`, creating the file and its parent directories when missing.
pub(crate) fn create_store(path: &Utf8Path) -> Result<SqliteStore, CliError> {
    osmsync_fs::ensure_parent_dir(path).map_err(|source| CliError::PrepareStore {
        path: path.to_path_buf(),
        source,
    })?;
    open(path)
}

/// Open a store that a previous import created.
pub(crate) fn open_existing_store(path: &Utf8Path) -> Result<SqliteStore, CliError> {
    match osmsync_fs::is_file(path) {
        Ok(true) => open(path),
        Ok(false) => Err(CliError::MissingStore {
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Err(CliError::MissingStore {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::PrepareStore {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn open(path: &Utf8Path) -> Result<SqliteStore, CliError> {
    SqliteStore::open(path.as_std_path()).map_err(|source| CliError::OpenStore {
        path: path.to_path_buf(),
        source,
    })
}
