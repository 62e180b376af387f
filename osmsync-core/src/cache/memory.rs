//! `HashMap`-backed caches for one-shot imports and tests.

use std::collections::HashMap;

use geo::Coord;

use super::{CacheError, CoordinateCache, ReferenceCache};

/// In-memory coordinate cache.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osmsync_core::{CoordinateCache, InMemoryCoordinateCache};
///
/// # fn main() -> Result<(), osmsync_core::CacheError> {
/// let mut cache = InMemoryCoordinateCache::default();
/// cache.put(1, Coord { x: 1.0, y: 2.0 })?;
/// assert_eq!(cache.get(1)?, Some(Coord { x: 1.0, y: 2.0 }));
/// cache.delete(1)?;
/// assert_eq!(cache.get(1)?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoordinateCache {
    entries: HashMap<i64, Coord<f64>>,
}

impl InMemoryCoordinateCache {
    /// Number of cached coordinates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, Coord<f64>)> + '_ {
        self.entries.iter().map(|(id, coord)| (*id, *coord))
    }
}

impl CoordinateCache for InMemoryCoordinateCache {
    fn get(&self, id: i64) -> Result<Option<Coord<f64>>, CacheError> {
        Ok(self.entries.get(&id).copied())
    }

    fn put(&mut self, id: i64, coordinate: Coord<f64>) -> Result<(), CacheError> {
        self.entries.insert(id, coordinate);
        Ok(())
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        self.entries.remove(&id);
        Ok(())
    }
}

/// In-memory reference cache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceCache {
    entries: HashMap<i64, Vec<i64>>,
}

impl InMemoryReferenceCache {
    /// Number of cached ways.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[i64])> + '_ {
        self.entries.iter().map(|(id, nodes)| (*id, nodes.as_slice()))
    }
}

impl ReferenceCache for InMemoryReferenceCache {
    fn get(&self, id: i64) -> Result<Option<Vec<i64>>, CacheError> {
        Ok(self.entries.get(&id).cloned())
    }

    fn put(&mut self, id: i64, nodes: Vec<i64>) -> Result<(), CacheError> {
        self.entries.insert(id, nodes);
        Ok(())
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        self.entries.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn references() -> InMemoryReferenceCache {
        let mut cache = InMemoryReferenceCache::default();
        cache
            .put_all([(1, vec![1, 2, 3]), (2, vec![3, 4])])
            .expect("in-memory put");
        cache
    }

    #[rstest]
    fn put_replaces_existing_entry(mut references: InMemoryReferenceCache) {
        references.put(1, vec![9]).expect("in-memory put");
        assert_eq!(references.get(1).expect("in-memory get"), Some(vec![9]));
        assert_eq!(references.len(), 2);
    }

    #[rstest]
    fn deleting_absent_key_is_a_no_op(mut references: InMemoryReferenceCache) {
        references.delete(42).expect("in-memory delete");
        assert_eq!(references.len(), 2);
    }

    #[rstest]
    fn iter_exposes_every_coordinate() {
        let mut cache = InMemoryCoordinateCache::default();
        cache
            .put_all((0..5).map(|id| (id, Coord { x: 0.0, y: 0.0 })))
            .expect("in-memory put");
        let mut ids: Vec<_> = cache.iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
