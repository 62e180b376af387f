//! SQLite-backed entity store and persistent caches.
//!
//! [`SqliteStore`] owns one connection. Tables and caches handed out by the
//! store borrow that connection, so a transaction opened through
//! [`SqliteStore::transaction`] covers every table and cache write made while
//! it is live. Dropping the transaction without committing rolls all of them
//! back.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};
use thiserror::Error;

mod cache;
mod codec;
mod schema;
mod tables;

pub use cache::{SqliteCoordinateCache, SqliteReferenceCache};
pub use codec::CodecError;
pub use schema::{SCHEMA_VERSION, initialise_schema};
pub use tables::{ElementTable, HeaderTable, NodeTable, RelationTable, TableRow, WayTable};

/// Errors raised by the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Database location.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A schema bootstrap step failed.
    #[error("failed to execute migration step '{step}'")]
    Migration {
        /// Step that failed.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// The database carries a different schema version.
    #[error(
        "expected osmsync schema version {expected} but found {found}; apply migrations before retrying"
    )]
    VersionMismatch {
        /// Version this build understands.
        expected: i64,
        /// Version recorded in the database.
        found: i64,
    },
    /// Beginning, committing or rolling back a transaction failed.
    #[error("failed to {operation} store transaction")]
    Transaction {
        /// Transaction operation that failed.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A statement against a table failed.
    #[error("failed to {operation} {table} row {id}")]
    Query {
        /// Table name.
        table: &'static str,
        /// Operation that failed.
        operation: &'static str,
        /// Row key.
        id: i64,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A column value could not be encoded or decoded.
    #[error("failed to convert column {column} of {table} row {id}")]
    Column {
        /// Table name.
        table: &'static str,
        /// Column name.
        column: &'static str,
        /// Row key.
        id: i64,
        /// Encoding failure.
        #[source]
        source: CodecError,
    },
}

/// Entity store backed by a single SQLite database.
pub struct SqliteStore {
    connection: Connection,
    path: Option<PathBuf>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store at `path`, bootstrapping the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(connection, Some(path.to_path_buf()))
    }

    /// Open a private in-memory store.
    ///
    /// # Examples
    /// ```
    /// use osmsync_core::store::SqliteStore;
    /// use osmsync_core::Node;
    ///
    /// # fn main() -> Result<(), osmsync_core::store::StoreError> {
    /// let store = SqliteStore::open_in_memory()?;
    /// store.nodes().insert(&Node::new(1, 1.0, 1.0))?;
    /// assert!(store.nodes().select(1)?.is_some());
    /// assert!(store.nodes().select(2)?.is_none());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(connection, None)
    }

    fn from_connection(mut connection: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        initialise_schema(&mut connection)?;
        Ok(Self { connection, path })
    }

    /// Begin a transaction covering all tables and caches of this store.
    ///
    /// The transaction rolls back when dropped without
    /// [`commit`](Transaction::commit).
    pub fn transaction(&self) -> Result<Transaction<'_>, StoreError> {
        self.connection
            .unchecked_transaction()
            .map_err(|source| StoreError::Transaction {
                operation: "begin",
                source,
            })
    }

    /// Replication headers keyed by sequence number.
    #[must_use]
    pub fn headers(&self) -> HeaderTable<'_> {
        HeaderTable::new(&self.connection)
    }

    /// Node table.
    #[must_use]
    pub fn nodes(&self) -> NodeTable<'_> {
        ElementTable::new(&self.connection)
    }

    /// Way table.
    #[must_use]
    pub fn ways(&self) -> WayTable<'_> {
        ElementTable::new(&self.connection)
    }

    /// Relation table.
    #[must_use]
    pub fn relations(&self) -> RelationTable<'_> {
        ElementTable::new(&self.connection)
    }

    /// Persistent coordinate cache sharing this store's connection.
    #[must_use]
    pub fn coordinate_cache(&self) -> SqliteCoordinateCache<'_> {
        SqliteCoordinateCache::new(&self.connection)
    }

    /// Persistent reference cache sharing this store's connection.
    #[must_use]
    pub fn reference_cache(&self) -> SqliteReferenceCache<'_> {
        SqliteReferenceCache::new(&self.connection)
    }
}

/// Commit `transaction`, mapping the failure into a [`StoreError`].
pub fn commit(transaction: Transaction<'_>) -> Result<(), StoreError> {
    transaction
        .commit()
        .map_err(|source| StoreError::Transaction {
            operation: "commit",
            source,
        })
}
