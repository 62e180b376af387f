//! Data access and synchronisation services for osmsync.
//!
//! Responsibilities:
//! - Fetch extracts, change files and state files by URI.
//! - Decode PBF, OSM XML and osmChange payloads into entities.
//! - Load extracts, apply replication increments and compute their tile
//!   footprint.
//!
//! Boundaries:
//! - Entity, cache and store types live in `osmsync-core`.
//! - Only fetching is asynchronous; decoding and store writes are blocking.
//!
//! Invariants:
//! - The header advances by exactly one per successful update, last.
//! - Diffing never writes to the store or the caches.

pub mod decode;
mod diff;
mod import;
mod increment;
pub mod replication;
mod resolve;
mod source;
mod update;

pub use diff::{DiffError, DiffReport, DiffService};
pub use import::{ImportError, ImportReport, ImportService};
pub use increment::IncrementError;
pub use resolve::ResolveOptions;
pub use source::{
    BlobReader, BlobSource, DEFAULT_USER_AGENT, FetchError, FileBlobSource, HttpBlobSource,
    MemoryBlobSource, UriBlobSource,
};
pub use update::{TimestampSource, UpdateError, UpdateReport, UpdateService};
