//! Copy-on-write views over a read-only base cache.
//!
//! Writes and deletions land in a private layer; the base is never touched.
//! Diff computation uses these so that entities created inside pending
//! increments resolve without mutating the real caches.

use std::collections::HashMap;

use geo::Coord;

use super::{CacheError, CoordinateCache, ReferenceCache};

/// Overlay over a [`CoordinateCache`].
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osmsync_core::{CoordinateCache, InMemoryCoordinateCache, OverlayCoordinateCache};
///
/// # fn main() -> Result<(), osmsync_core::CacheError> {
/// let mut base = InMemoryCoordinateCache::default();
/// base.put(1, Coord { x: 0.0, y: 0.0 })?;
///
/// let mut overlay = OverlayCoordinateCache::new(&base);
/// overlay.delete(1)?;
/// overlay.put(2, Coord { x: 1.0, y: 1.0 })?;
///
/// assert_eq!(overlay.get(1)?, None);
/// assert!(overlay.get(2)?.is_some());
/// assert!(base.get(1)?.is_some());
/// assert_eq!(base.get(2)?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OverlayCoordinateCache<'a, B: ?Sized> {
    base: &'a B,
    layer: HashMap<i64, Option<Coord<f64>>>,
}

impl<'a, B: CoordinateCache + ?Sized> OverlayCoordinateCache<'a, B> {
    /// Wrap `base` with an empty overlay.
    pub fn new(base: &'a B) -> Self {
        Self {
            base,
            layer: HashMap::new(),
        }
    }
}

impl<B: CoordinateCache + ?Sized> CoordinateCache for OverlayCoordinateCache<'_, B> {
    fn get(&self, id: i64) -> Result<Option<Coord<f64>>, CacheError> {
        match self.layer.get(&id) {
            Some(entry) => Ok(*entry),
            None => self.base.get(id),
        }
    }

    fn put(&mut self, id: i64, coordinate: Coord<f64>) -> Result<(), CacheError> {
        self.layer.insert(id, Some(coordinate));
        Ok(())
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        self.layer.insert(id, None);
        Ok(())
    }
}

/// Overlay over a [`ReferenceCache`].
#[derive(Debug)]
pub struct OverlayReferenceCache<'a, B: ?Sized> {
    base: &'a B,
    layer: HashMap<i64, Option<Vec<i64>>>,
}

impl<'a, B: ReferenceCache + ?Sized> OverlayReferenceCache<'a, B> {
    /// Wrap `base` with an empty overlay.
    pub fn new(base: &'a B) -> Self {
        Self {
            base,
            layer: HashMap::new(),
        }
    }
}

impl<B: ReferenceCache + ?Sized> ReferenceCache for OverlayReferenceCache<'_, B> {
    fn get(&self, id: i64) -> Result<Option<Vec<i64>>, CacheError> {
        match self.layer.get(&id) {
            Some(entry) => Ok(entry.clone()),
            None => self.base.get(id),
        }
    }

    fn put(&mut self, id: i64, nodes: Vec<i64>) -> Result<(), CacheError> {
        self.layer.insert(id, Some(nodes));
        Ok(())
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        self.layer.insert(id, None);
        Ok(())
    }
}
