//! One-shot bulk load of a full extract.

use log::{debug, info};
use osmsync_core::store::{SqliteStore, StoreError, commit};
use osmsync_core::{Bound, CacheError, CoordinateCache, Entity, GeometryError, ReferenceCache};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::decode::{DecodeError, decode_entities};
use crate::resolve::{ResolveOptions, Resolver};
use crate::source::{BlobSource, FetchError};

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportReport {
    /// Nodes inserted.
    pub nodes: u64,
    /// Ways inserted.
    pub ways: u64,
    /// Relations inserted.
    pub relations: u64,
    /// Elements stored without geometry because a reference was missing.
    pub unresolved: u64,
    /// Bounds declared by the extract.
    pub bound: Option<Bound>,
}

/// Errors returned by [`ImportService::import`].
#[derive(Debug, Error)]
pub enum ImportError {
    /// The extract could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The extract was malformed.
    #[error("failed to decode extract {uri}: {source}")]
    Decode {
        /// Extract URI.
        uri: String,
        /// Decoder failure.
        #[source]
        source: DecodeError,
    },
    /// Geometry resolution failed in strict mode.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// A cache backend failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The entity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The cancellation token fired.
    #[error("import of {uri} was cancelled")]
    Cancelled {
        /// Extract URI.
        uri: String,
    },
}

/// Loads an extract into the caches and the entity store.
///
/// The whole import runs inside one store transaction; any error rolls the
/// tables and SQLite caches back. In-memory caches keep whatever was written
/// before the failure.
///
/// # Examples
/// ```
/// use osmsync_core::InMemoryCoordinateCache;
/// use osmsync_core::store::SqliteStore;
/// use osmsync_data::{ImportService, MemoryBlobSource, ResolveOptions};
/// use url::Url;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let uri = Url::parse("memory://extracts/tiny.osm")?;
/// let mut source = MemoryBlobSource::default();
/// source.insert(uri.clone(), br#"<osm><node id="1" lat="1" lon="1"/></osm>"#.to_vec());
///
/// let store = SqliteStore::open_in_memory()?;
/// let mut coordinates = InMemoryCoordinateCache::default();
/// let mut references = store.reference_cache();
/// let service = ImportService::new(source, ResolveOptions::default());
/// let runtime = tokio::runtime::Builder::new_current_thread().build()?;
/// let report = runtime.block_on(service.import(&uri, &store, &mut coordinates, &mut references))?;
/// assert_eq!(report.nodes, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ImportService<S> {
    source: S,
    options: ResolveOptions,
    cancellation: CancellationToken,
}

impl<S: BlobSource> ImportService<S> {
    /// Import through `source` with the given geometry settings.
    pub fn new(source: S, options: ResolveOptions) -> Self {
        Self {
            source,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Abort between records once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Fetch, decode and load the extract at `uri`.
    pub async fn import<C, R>(
        &self,
        uri: &Url,
        store: &SqliteStore,
        coordinates: &mut C,
        references: &mut R,
    ) -> Result<ImportReport, ImportError>
    where
        C: CoordinateCache + ?Sized,
        R: ReferenceCache + ?Sized,
    {
        let decode_error = |source| ImportError::Decode {
            uri: uri.to_string(),
            source,
        };
        let reader = self.source.fetch(uri).await?;
        let entities = decode_entities(uri, reader).map_err(decode_error)?;

        let transaction = store.transaction()?;
        let (nodes, ways, relations) = (store.nodes(), store.ways(), store.relations());
        let mut resolver = Resolver::new(self.options);
        let mut report = ImportReport::default();
        for entity in entities {
            if self.cancellation.is_cancelled() {
                return Err(ImportError::Cancelled {
                    uri: uri.to_string(),
                });
            }
            match entity.map_err(decode_error)? {
                Entity::Header(header) => {
                    debug!(
                        "ignoring extract header at sequence {}",
                        header.replication_sequence_number
                    );
                }
                Entity::Bound(bound) => report.bound = Some(bound),
                Entity::Node(mut node) => {
                    resolver.node(&mut node, &mut *coordinates)?;
                    nodes.insert(&node)?;
                    report.nodes += 1;
                }
                Entity::Way(mut way) => {
                    resolver.way(&mut way, &*coordinates, &mut *references)?;
                    ways.insert(&way)?;
                    report.ways += 1;
                }
                Entity::Relation(mut relation) => {
                    resolver.relation(&mut relation, &*coordinates, &*references)?;
                    relations.insert(&relation)?;
                    report.relations += 1;
                }
            }
        }
        commit(transaction)?;
        report.unresolved = resolver.unresolved();
        info!(
            "imported {uri}: {} nodes, {} ways, {} relations ({} without geometry)",
            report.nodes, report.ways, report.relations, report.unresolved
        );
        Ok(report)
    }
}
