//! Header, node, way and relation tables.

use std::marker::PhantomData;

use rusqlite::{CachedStatement, Connection, OptionalExtension, Row, params};

use super::StoreError;
use super::codec::{CodecError, from_blob, from_json, from_millis, to_blob, to_json, to_millis};
use crate::entity::{Element, Header, Info, Member, Node, Relation, Tags, Way};

const ELEMENT_COLUMNS: &str = "id, version, uid, timestamp, changeset, user_name, tags, geometry";

/// Row mapping for an element kind stored in its own table.
pub trait TableRow: Element + Sized {
    /// Table name.
    const TABLE: &'static str;
    /// Kind-specific columns appended after the shared element columns.
    const EXTRA_COLUMNS: &'static str;

    /// Bind the shared columns plus the kind-specific ones and execute.
    fn upsert(&self, statement: &mut CachedStatement<'_>) -> Result<(), StoreError>;

    /// Decode a row selected with the shared and kind-specific columns.
    fn from_row(row: &Row<'_>) -> Result<Self, StoreError>;
}

struct Shared {
    id: i64,
    info: Info,
    tags: Tags,
    geometry: Option<geo::Geometry<f64>>,
}

struct SharedParams {
    timestamp: i64,
    tags: String,
    geometry: Option<Vec<u8>>,
}

fn column_error(
    table: &'static str,
    column: &'static str,
    id: i64,
) -> impl Fn(CodecError) -> StoreError + Copy {
    move |source| StoreError::Column {
        table,
        column,
        id,
        source,
    }
}

fn query_error(
    table: &'static str,
    operation: &'static str,
    id: i64,
) -> impl Fn(rusqlite::Error) -> StoreError + Copy {
    move |source| StoreError::Query {
        table,
        operation,
        id,
        source,
    }
}

fn shared_params<E: TableRow>(element: &E) -> Result<SharedParams, StoreError> {
    let id = element.id();
    Ok(SharedParams {
        timestamp: to_millis(element.info().timestamp),
        tags: to_json(element.tags()).map_err(column_error(E::TABLE, "tags", id))?,
        geometry: to_blob(element.geometry()).map_err(column_error(E::TABLE, "geometry", id))?,
    })
}

fn read_shared(table: &'static str, row: &Row<'_>) -> Result<Shared, StoreError> {
    let id: i64 = row.get(0).map_err(query_error(table, "read", 0))?;
    let read = query_error(table, "read", id);
    let timestamp: i64 = row.get(3).map_err(read)?;
    let tags: String = row.get(6).map_err(read)?;
    let geometry: Option<Vec<u8>> = row.get(7).map_err(read)?;
    Ok(Shared {
        id,
        info: Info {
            version: row.get(1).map_err(read)?,
            uid: row.get(2).map_err(read)?,
            timestamp: from_millis(timestamp).map_err(column_error(table, "timestamp", id))?,
            changeset: row.get(4).map_err(read)?,
            user: row.get(5).map_err(read)?,
        },
        tags: from_json(&tags).map_err(column_error(table, "tags", id))?,
        geometry: from_blob(geometry.as_deref()).map_err(column_error(table, "geometry", id))?,
    })
}

impl TableRow for Node {
    const TABLE: &'static str = "osm_nodes";
    const EXTRA_COLUMNS: &'static str = "lon, lat";

    fn upsert(&self, statement: &mut CachedStatement<'_>) -> Result<(), StoreError> {
        let shared = shared_params(self)?;
        statement
            .execute(params![
                self.id,
                self.info.version,
                self.info.uid,
                shared.timestamp,
                self.info.changeset,
                self.info.user,
                shared.tags,
                shared.geometry,
                self.lon,
                self.lat,
            ])
            .map(|_| ())
            .map_err(query_error(Self::TABLE, "insert", self.id))
    }

    fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let shared = read_shared(Self::TABLE, row)?;
        let read = query_error(Self::TABLE, "read", shared.id);
        let lon: f64 = row.get(8).map_err(read)?;
        let lat: f64 = row.get(9).map_err(read)?;
        Ok(Self {
            id: shared.id,
            info: shared.info,
            tags: shared.tags,
            lon,
            lat,
            geometry: shared.geometry,
        })
    }
}

impl TableRow for Way {
    const TABLE: &'static str = "osm_ways";
    const EXTRA_COLUMNS: &'static str = "nodes";

    fn upsert(&self, statement: &mut CachedStatement<'_>) -> Result<(), StoreError> {
        let shared = shared_params(self)?;
        let nodes = to_json(&self.nodes).map_err(column_error(Self::TABLE, "nodes", self.id))?;
        statement
            .execute(params![
                self.id,
                self.info.version,
                self.info.uid,
                shared.timestamp,
                self.info.changeset,
                self.info.user,
                shared.tags,
                shared.geometry,
                nodes,
            ])
            .map(|_| ())
            .map_err(query_error(Self::TABLE, "insert", self.id))
    }

    fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let shared = read_shared(Self::TABLE, row)?;
        let nodes: String = row
            .get(8)
            .map_err(query_error(Self::TABLE, "read", shared.id))?;
        Ok(Self {
            id: shared.id,
            info: shared.info,
            tags: shared.tags,
            nodes: from_json(&nodes).map_err(column_error(Self::TABLE, "nodes", shared.id))?,
            geometry: shared.geometry,
        })
    }
}

impl TableRow for Relation {
    const TABLE: &'static str = "osm_relations";
    const EXTRA_COLUMNS: &'static str = "members";

    fn upsert(&self, statement: &mut CachedStatement<'_>) -> Result<(), StoreError> {
        let shared = shared_params(self)?;
        let members =
            to_json(&self.members).map_err(column_error(Self::TABLE, "members", self.id))?;
        statement
            .execute(params![
                self.id,
                self.info.version,
                self.info.uid,
                shared.timestamp,
                self.info.changeset,
                self.info.user,
                shared.tags,
                shared.geometry,
                members,
            ])
            .map(|_| ())
            .map_err(query_error(Self::TABLE, "insert", self.id))
    }

    fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let shared = read_shared(Self::TABLE, row)?;
        let members: String = row
            .get(8)
            .map_err(query_error(Self::TABLE, "read", shared.id))?;
        let members: Vec<Member> =
            from_json(&members).map_err(column_error(Self::TABLE, "members", shared.id))?;
        Ok(Self {
            id: shared.id,
            info: shared.info,
            tags: shared.tags,
            members,
            geometry: shared.geometry,
        })
    }
}

/// Table holding one element kind, keyed by element id.
pub struct ElementTable<'c, E> {
    connection: &'c Connection,
    kind: PhantomData<fn() -> E>,
}

/// Table of nodes.
pub type NodeTable<'c> = ElementTable<'c, Node>;
/// Table of ways.
pub type WayTable<'c> = ElementTable<'c, Way>;
/// Table of relations.
pub type RelationTable<'c> = ElementTable<'c, Relation>;

impl<'c, E: TableRow> ElementTable<'c, E> {
    /// Wrap a connection whose schema has been initialised.
    pub fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            kind: PhantomData,
        }
    }

    /// Element with `id`, if stored.
    pub fn select(&self, id: i64) -> Result<Option<E>, StoreError> {
        let sql = format!(
            "SELECT {ELEMENT_COLUMNS}, {} FROM {} WHERE id = ?1",
            E::EXTRA_COLUMNS,
            E::TABLE
        );
        let mut statement = self
            .connection
            .prepare_cached(&sql)
            .map_err(query_error(E::TABLE, "prepare select", id))?;
        let mut rows = statement
            .query([id])
            .map_err(query_error(E::TABLE, "select", id))?;
        match rows.next().map_err(query_error(E::TABLE, "select", id))? {
            Some(row) => E::from_row(row).map(Some),
            None => Ok(None),
        }
    }

    /// Every stored element ordered by id.
    pub fn select_all(&self) -> Result<Vec<E>, StoreError> {
        let sql = format!(
            "SELECT {ELEMENT_COLUMNS}, {} FROM {} ORDER BY id",
            E::EXTRA_COLUMNS,
            E::TABLE
        );
        let mut statement = self
            .connection
            .prepare_cached(&sql)
            .map_err(query_error(E::TABLE, "prepare select", 0))?;
        let mut rows = statement
            .query([])
            .map_err(query_error(E::TABLE, "select", 0))?;
        let mut elements = Vec::new();
        while let Some(row) = rows.next().map_err(query_error(E::TABLE, "select", 0))? {
            elements.push(E::from_row(row)?);
        }
        Ok(elements)
    }

    /// Insert or replace `element`.
    pub fn insert(&self, element: &E) -> Result<(), StoreError> {
        let mut statement = self.upsert_statement(element.id())?;
        element.upsert(&mut statement)
    }

    /// Insert or replace every element with one prepared statement.
    pub fn insert_all<'e, I>(&self, elements: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = &'e E>,
        E: 'e,
    {
        let mut statement = self.upsert_statement(0)?;
        for element in elements {
            element.upsert(&mut statement)?;
        }
        Ok(())
    }

    /// Remove the element with `id`; absent ids are ignored.
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", E::TABLE);
        self.connection
            .prepare_cached(&sql)
            .and_then(|mut statement| statement.execute([id]))
            .map(|_| ())
            .map_err(query_error(E::TABLE, "delete", id))
    }

    /// Number of stored elements.
    pub fn count(&self) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
        let count: i64 = self
            .connection
            .query_row(&sql, [], |row| row.get(0))
            .map_err(query_error(E::TABLE, "count", 0))?;
        Ok(count.unsigned_abs())
    }

    fn upsert_statement(&self, id: i64) -> Result<CachedStatement<'c>, StoreError> {
        let extra = E::EXTRA_COLUMNS.split(',').count();
        let placeholders = (1..=8 + extra)
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({ELEMENT_COLUMNS}, {}) VALUES ({placeholders})",
            E::TABLE,
            E::EXTRA_COLUMNS
        );
        self.connection
            .prepare_cached(&sql)
            .map_err(query_error(E::TABLE, "prepare insert", id))
    }
}

const HEADER_TABLE: &str = "osm_headers";

/// Replication headers keyed by sequence number.
pub struct HeaderTable<'c> {
    connection: &'c Connection,
}

impl<'c> HeaderTable<'c> {
    /// Wrap a connection whose schema has been initialised.
    pub fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }

    /// Header with the given sequence number.
    pub fn select(&self, sequence_number: i64) -> Result<Option<Header>, StoreError> {
        self.query_one(
            "SELECT replication_sequence_number, replication_timestamp, replication_url, source, writing_program
             FROM osm_headers WHERE replication_sequence_number = ?1",
            Some(sequence_number),
        )
    }

    /// Header with the highest sequence number.
    pub fn select_latest(&self) -> Result<Option<Header>, StoreError> {
        self.query_one(
            "SELECT replication_sequence_number, replication_timestamp, replication_url, source, writing_program
             FROM osm_headers ORDER BY replication_sequence_number DESC LIMIT 1",
            None,
        )
    }

    /// Insert or replace the header for its sequence number.
    pub fn insert(&self, header: &Header) -> Result<(), StoreError> {
        let id = header.replication_sequence_number;
        self.connection
            .prepare_cached(
                "INSERT OR REPLACE INTO osm_headers
                 (replication_sequence_number, replication_timestamp, replication_url, source, writing_program)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .and_then(|mut statement| {
                statement.execute(params![
                    id,
                    to_millis(header.replication_timestamp),
                    header.replication_url,
                    header.source,
                    header.writing_program,
                ])
            })
            .map(|_| ())
            .map_err(query_error(HEADER_TABLE, "insert", id))
    }

    fn query_one(&self, sql: &str, key: Option<i64>) -> Result<Option<Header>, StoreError> {
        let id = key.unwrap_or(-1);
        let raw = self
            .connection
            .prepare_cached(sql)
            .and_then(|mut statement| {
                let map = |row: &Row<'_>| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                };
                match key {
                    Some(key) => statement.query_row([key], map).optional(),
                    None => statement.query_row([], map).optional(),
                }
            })
            .map_err(query_error(HEADER_TABLE, "select", id))?;

        raw.map(|(sequence_number, millis, replication_url, source, writing_program)| {
            Ok(Header {
                replication_sequence_number: sequence_number,
                replication_timestamp: from_millis(millis).map_err(column_error(
                    HEADER_TABLE,
                    "replication_timestamp",
                    sequence_number,
                ))?,
                replication_url,
                source,
                writing_program,
            })
        })
        .transpose()
    }
}
