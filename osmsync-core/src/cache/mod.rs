//! Caches that let geometries be rebuilt without the parent dataset.
//!
//! The coordinate cache maps node ids to projected coordinates; the reference
//! cache maps way ids to their ordered node ids. Both are keyed by `i64` and
//! share a minimal get/put/delete contract so the in-memory, overlay and
//! SQLite backends are interchangeable inside the services.

use std::error::Error as StdError;

use geo::Coord;
use thiserror::Error;

mod memory;
mod overlay;

pub use memory::{InMemoryCoordinateCache, InMemoryReferenceCache};
pub use overlay::{OverlayCoordinateCache, OverlayReferenceCache};

/// Error raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing storage failed.
    #[error("{backend} cache failed to {operation} entry {id}: {source}")]
    Backend {
        /// Name of the backend, for example `sqlite`.
        backend: &'static str,
        /// Operation that failed.
        operation: &'static str,
        /// Key involved in the operation.
        id: i64,
        /// Underlying failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Node id to projected coordinate lookup.
pub trait CoordinateCache {
    /// Coordinate for `id`, if cached.
    fn get(&self, id: i64) -> Result<Option<Coord<f64>>, CacheError>;

    /// Insert or replace the coordinate for `id`.
    fn put(&mut self, id: i64, coordinate: Coord<f64>) -> Result<(), CacheError>;

    /// Remove `id`; absent keys are ignored.
    fn delete(&mut self, id: i64) -> Result<(), CacheError>;

    /// Insert or replace many coordinates.
    fn put_all<I>(&mut self, entries: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (i64, Coord<f64>)>,
        Self: Sized,
    {
        for (id, coordinate) in entries {
            self.put(id, coordinate)?;
        }
        Ok(())
    }
}

/// Way id to ordered node ids lookup.
pub trait ReferenceCache {
    /// Node ids for `id`, if cached.
    fn get(&self, id: i64) -> Result<Option<Vec<i64>>, CacheError>;

    /// Insert or replace the node ids for `id`.
    fn put(&mut self, id: i64, nodes: Vec<i64>) -> Result<(), CacheError>;

    /// Remove `id`; absent keys are ignored.
    fn delete(&mut self, id: i64) -> Result<(), CacheError>;

    /// Insert or replace many entries.
    fn put_all<I>(&mut self, entries: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (i64, Vec<i64>)>,
        Self: Sized,
    {
        for (id, nodes) in entries {
            self.put(id, nodes)?;
        }
        Ok(())
    }
}

impl<C: CoordinateCache + ?Sized> CoordinateCache for &mut C {
    fn get(&self, id: i64) -> Result<Option<Coord<f64>>, CacheError> {
        (**self).get(id)
    }

    fn put(&mut self, id: i64, coordinate: Coord<f64>) -> Result<(), CacheError> {
        (**self).put(id, coordinate)
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        (**self).delete(id)
    }
}

impl<C: ReferenceCache + ?Sized> ReferenceCache for &mut C {
    fn get(&self, id: i64) -> Result<Option<Vec<i64>>, CacheError> {
        (**self).get(id)
    }

    fn put(&mut self, id: i64, nodes: Vec<i64>) -> Result<(), CacheError> {
        (**self).put(id, nodes)
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        (**self).delete(id)
    }
}
