//! Facade crate for osmsync.
//!
//! This crate re-exports the entity model, caches and tile maths, and exposes
//! the SQLite store and the import, update and diff services behind feature
//! flags.

#![forbid(unsafe_code)]

pub use osmsync_core::{
    ApplyPlan, Bound, CacheError, Change, ChangeAction, CoordinateCache, Element, ElementKind,
    Entity, GeometryError, GeometryMode, Header, InMemoryCoordinateCache, InMemoryReferenceCache,
    Info, MAX_ZOOM, Member, Node, ReferenceCache, Relation, SpatialReference, Tile, TileError, Way,
};

#[cfg(feature = "store-sqlite")]
pub use osmsync_core::store::{SqliteStore, StoreError};

#[cfg(feature = "services")]
pub use osmsync_data::{
    BlobSource, DiffError, DiffReport, DiffService, FetchError, FileBlobSource, HttpBlobSource,
    ImportError, ImportReport, ImportService, MemoryBlobSource, ResolveOptions, UpdateError,
    UpdateReport, UpdateService, UriBlobSource,
};
