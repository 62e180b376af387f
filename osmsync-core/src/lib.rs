//! Core domain types for osmsync.
//!
//! The crate models map-feature extracts and replication diffs, resolves
//! geometries through coordinate and reference caches, and maps geometries to
//! Web Mercator tiles. With the `store-sqlite` feature it also provides the
//! SQLite entity store and the persistent cache backends.

pub mod cache;
pub mod change;
pub mod entity;
pub mod geometry;
pub mod projection;
#[cfg(feature = "store-sqlite")]
pub mod store;
pub mod tile;

pub use cache::{
    CacheError, CoordinateCache, InMemoryCoordinateCache, InMemoryReferenceCache,
    OverlayCoordinateCache, OverlayReferenceCache, ReferenceCache,
};
pub use change::{ApplyPlan, Change, ChangeAction, Deletion};
pub use entity::{
    Bound, BoundError, Element, ElementKind, Entity, EntityKind, Header, Info, Member, Node,
    Relation, Tags, Way,
};
pub use geometry::{GeometryError, GeometryMode, project_node, relation_geometry, way_geometry};
pub use projection::{ProjectionError, SpatialReference};
pub use tile::{MAX_ZOOM, Tile, TileError, TileRange, collect_tiles};
