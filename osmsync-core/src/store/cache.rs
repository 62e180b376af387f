//! Persistent caches stored next to the entity tables.
//!
//! A cache miss falls back to the entity tables, so a store imported with
//! in-memory caches can still be updated through these caches.

use geo::{Coord, Geometry};
use rusqlite::{Connection, OptionalExtension, params};

use super::codec::{from_blob, from_json, to_json};
use crate::cache::{CacheError, CoordinateCache, ReferenceCache};

fn backend_error<E>(operation: &'static str, id: i64) -> impl FnOnce(E) -> CacheError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |source| CacheError::Backend {
        backend: "sqlite",
        operation,
        id,
        source: Box::new(source),
    }
}

/// Coordinate cache in the `osm_coordinates` table.
///
/// Misses are answered from the point geometry stored in `osm_nodes`.
#[derive(Debug, Clone, Copy)]
pub struct SqliteCoordinateCache<'c> {
    connection: &'c Connection,
}

impl<'c> SqliteCoordinateCache<'c> {
    /// Wrap a connection whose schema has been initialised.
    pub fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }
}

impl SqliteCoordinateCache<'_> {
    fn node_position(&self, id: i64) -> Result<Option<Coord<f64>>, CacheError> {
        let blob: Option<Option<Vec<u8>>> = self
            .connection
            .prepare_cached("SELECT geometry FROM osm_nodes WHERE id = ?1")
            .and_then(|mut statement| statement.query_row([id], |row| row.get(0)).optional())
            .map_err(backend_error("read node", id))?;
        let geometry = from_blob(blob.flatten().as_deref()).map_err(backend_error("decode", id))?;
        Ok(match geometry {
            Some(Geometry::Point(point)) => Some(point.0),
            _ => None,
        })
    }
}

impl CoordinateCache for SqliteCoordinateCache<'_> {
    fn get(&self, id: i64) -> Result<Option<Coord<f64>>, CacheError> {
        let cached = self
            .connection
            .prepare_cached("SELECT x, y FROM osm_coordinates WHERE id = ?1")
            .and_then(|mut statement| {
                statement
                    .query_row([id], |row| Ok(Coord { x: row.get(0)?, y: row.get(1)? }))
                    .optional()
            })
            .map_err(backend_error("read", id))?;
        match cached {
            Some(coordinate) => Ok(Some(coordinate)),
            None => self.node_position(id),
        }
    }

    fn put(&mut self, id: i64, coordinate: Coord<f64>) -> Result<(), CacheError> {
        self.put_all([(id, coordinate)])
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        self.connection
            .prepare_cached("DELETE FROM osm_coordinates WHERE id = ?1")
            .and_then(|mut statement| statement.execute([id]))
            .map(|_| ())
            .map_err(backend_error("delete", id))
    }

    fn put_all<I>(&mut self, entries: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (i64, Coord<f64>)>,
    {
        let mut statement = self
            .connection
            .prepare_cached("INSERT OR REPLACE INTO osm_coordinates (id, x, y) VALUES (?1, ?2, ?3)")
            .map_err(backend_error("prepare write", 0))?;
        for (id, coordinate) in entries {
            statement
                .execute(params![id, coordinate.x, coordinate.y])
                .map_err(backend_error("write", id))?;
        }
        Ok(())
    }
}

/// Reference cache in the `osm_references` table.
///
/// Misses are answered from the node list stored in `osm_ways`.
#[derive(Debug, Clone, Copy)]
pub struct SqliteReferenceCache<'c> {
    connection: &'c Connection,
}

impl<'c> SqliteReferenceCache<'c> {
    /// Wrap a connection whose schema has been initialised.
    pub fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }
}

impl SqliteReferenceCache<'_> {
    fn nodes_from(&self, sql: &str, id: i64) -> Result<Option<Vec<i64>>, CacheError> {
        let text: Option<String> = self
            .connection
            .prepare_cached(sql)
            .and_then(|mut statement| statement.query_row([id], |row| row.get(0)).optional())
            .map_err(backend_error("read", id))?;
        text.map(|text| from_json(&text).map_err(backend_error("decode", id)))
            .transpose()
    }
}

impl ReferenceCache for SqliteReferenceCache<'_> {
    fn get(&self, id: i64) -> Result<Option<Vec<i64>>, CacheError> {
        match self.nodes_from("SELECT nodes FROM osm_references WHERE id = ?1", id)? {
            Some(nodes) => Ok(Some(nodes)),
            None => self.nodes_from("SELECT nodes FROM osm_ways WHERE id = ?1", id),
        }
    }

    fn put(&mut self, id: i64, nodes: Vec<i64>) -> Result<(), CacheError> {
        self.put_all([(id, nodes)])
    }

    fn delete(&mut self, id: i64) -> Result<(), CacheError> {
        self.connection
            .prepare_cached("DELETE FROM osm_references WHERE id = ?1")
            .and_then(|mut statement| statement.execute([id]))
            .map(|_| ())
            .map_err(backend_error("delete", id))
    }

    fn put_all<I>(&mut self, entries: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (i64, Vec<i64>)>,
    {
        let mut statement = self
            .connection
            .prepare_cached("INSERT OR REPLACE INTO osm_references (id, nodes) VALUES (?1, ?2)")
            .map_err(backend_error("prepare write", 0))?;
        for (id, nodes) in entries {
            let text = to_json(&nodes).map_err(backend_error("encode", id))?;
            statement
                .execute(params![id, text])
                .map_err(backend_error("write", id))?;
        }
        Ok(())
    }
}
