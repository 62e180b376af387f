//! Geometry resolution for nodes, ways and relations.
//!
//! Node geometry comes straight from the projected position. Way and relation
//! geometries are rebuilt from the caches, so an unresolved reference is an
//! error rather than a silently truncated shape.

use geo::{Contains, Coord, Geometry, GeometryCollection, LineString, MultiPolygon, Point, Polygon};
use log::debug;
use thiserror::Error;

use crate::cache::{CacheError, CoordinateCache, ReferenceCache};
use crate::entity::{ElementKind, Node, Relation, Way};
use crate::projection::{ProjectionError, SpatialReference};

/// Relation `type` tag values assembled as multipolygons.
pub const AREA_RELATION_TYPES: [&str; 2] = ["multipolygon", "boundary"];

/// Errors raised while resolving element geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// A referenced node has no cached coordinate.
    #[error("{parent} {parent_id} references node {node_id} missing from the coordinate cache")]
    UnresolvedNode {
        /// Kind of the referencing element.
        parent: ElementKind,
        /// Id of the referencing element.
        parent_id: i64,
        /// Missing node id.
        node_id: i64,
    },
    /// A member way has no cached node list.
    #[error("relation {relation_id} references way {way_id} missing from the reference cache")]
    UnresolvedWay {
        /// Referencing relation.
        relation_id: i64,
        /// Missing way id.
        way_id: i64,
    },
    /// A way without nodes has no geometry.
    #[error("way {way_id} has no nodes")]
    EmptyWay {
        /// Offending way.
        way_id: i64,
    },
    /// An area relation yielded no closed outer ring.
    #[error("relation {relation_id} has no closed outer ring")]
    NoOuterRing {
        /// Offending relation.
        relation_id: i64,
    },
    /// The node position could not be projected.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    /// A cache lookup failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl GeometryError {
    /// Whether the failure stems from data that is missing or malformed,
    /// as opposed to a failing cache backend.
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        !matches!(self, Self::Cache(_))
    }
}

/// How services react to geometry that cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryMode {
    /// Log a warning and store the element without geometry.
    #[default]
    Lenient,
    /// Abort the operation.
    Strict,
}

/// Project a node position into `reference`.
pub fn project_node(node: &Node, reference: SpatialReference) -> Result<Coord<f64>, GeometryError> {
    Ok(reference.project(node.lon, node.lat)?)
}

/// Line or polygon geometry of a way.
///
/// Closed ways with at least four positions become polygons, single-node ways
/// become points, everything else is a line string.
pub fn way_geometry<C>(way: &Way, coordinates: &C) -> Result<Geometry<f64>, GeometryError>
where
    C: CoordinateCache + ?Sized,
{
    let coords = resolve_nodes(ElementKind::Way, way.id, &way.nodes, coordinates)?;
    linear_geometry(way.id, coords)
}

/// Geometry of a relation.
///
/// Relations tagged `type=multipolygon` or `type=boundary` are assembled into
/// a multipolygon from their way members; `inner` members become holes of the
/// outer ring containing them. Other relations yield a collection of their
/// node and way members. Nested relation members are not expanded.
pub fn relation_geometry<C, R>(
    relation: &Relation,
    coordinates: &C,
    references: &R,
) -> Result<Geometry<f64>, GeometryError>
where
    C: CoordinateCache + ?Sized,
    R: ReferenceCache + ?Sized,
{
    let is_area = relation
        .tags
        .get("type")
        .is_some_and(|kind| AREA_RELATION_TYPES.contains(&kind.as_str()));
    if is_area {
        area_geometry(relation, coordinates, references)
    } else {
        collection_geometry(relation, coordinates, references)
    }
}

fn resolve_nodes<C>(
    parent: ElementKind,
    parent_id: i64,
    nodes: &[i64],
    coordinates: &C,
) -> Result<Vec<Coord<f64>>, GeometryError>
where
    C: CoordinateCache + ?Sized,
{
    nodes
        .iter()
        .map(|&node_id| {
            coordinates
                .get(node_id)?
                .ok_or(GeometryError::UnresolvedNode {
                    parent,
                    parent_id,
                    node_id,
                })
        })
        .collect()
}

fn resolve_member_way<C, R>(
    relation_id: i64,
    way_id: i64,
    coordinates: &C,
    references: &R,
) -> Result<Vec<Coord<f64>>, GeometryError>
where
    C: CoordinateCache + ?Sized,
    R: ReferenceCache + ?Sized,
{
    let nodes = references
        .get(way_id)?
        .ok_or(GeometryError::UnresolvedWay {
            relation_id,
            way_id,
        })?;
    resolve_nodes(ElementKind::Relation, relation_id, &nodes, coordinates)
}

fn linear_geometry(way_id: i64, coords: Vec<Coord<f64>>) -> Result<Geometry<f64>, GeometryError> {
    if let [single] = coords.as_slice() {
        return Ok(Point::from(*single).into());
    }
    if coords.is_empty() {
        return Err(GeometryError::EmptyWay { way_id });
    }
    if is_ring(&coords) {
        return Ok(Polygon::new(LineString::from(coords), Vec::new()).into());
    }
    Ok(LineString::from(coords).into())
}

fn is_ring(coords: &[Coord<f64>]) -> bool {
    coords.len() >= 4 && coords.first() == coords.last()
}

fn collection_geometry<C, R>(
    relation: &Relation,
    coordinates: &C,
    references: &R,
) -> Result<Geometry<f64>, GeometryError>
where
    C: CoordinateCache + ?Sized,
    R: ReferenceCache + ?Sized,
{
    let mut members: Vec<Geometry<f64>> = Vec::with_capacity(relation.members.len());
    for member in &relation.members {
        match member.kind {
            ElementKind::Node => {
                let coord = coordinates
                    .get(member.id)?
                    .ok_or(GeometryError::UnresolvedNode {
                        parent: ElementKind::Relation,
                        parent_id: relation.id,
                        node_id: member.id,
                    })?;
                members.push(Point::from(coord).into());
            }
            ElementKind::Way => {
                let coords = resolve_member_way(relation.id, member.id, coordinates, references)?;
                members.push(linear_geometry(member.id, coords)?);
            }
            ElementKind::Relation => {
                debug!(
                    "relation {} skips nested relation member {}",
                    relation.id, member.id
                );
            }
        }
    }
    Ok(Geometry::GeometryCollection(GeometryCollection::from(members)))
}

fn area_geometry<C, R>(
    relation: &Relation,
    coordinates: &C,
    references: &R,
) -> Result<Geometry<f64>, GeometryError>
where
    C: CoordinateCache + ?Sized,
    R: ReferenceCache + ?Sized,
{
    let mut outer = Vec::new();
    let mut inner = Vec::new();
    for member in relation
        .members
        .iter()
        .filter(|member| member.kind == ElementKind::Way)
    {
        let coords = resolve_member_way(relation.id, member.id, coordinates, references)?;
        if member.role == "inner" {
            inner.push(coords);
        } else {
            outer.push(coords);
        }
    }

    let mut polygons: Vec<Polygon<f64>> = assemble_rings(relation.id, outer)
        .into_iter()
        .map(|ring| Polygon::new(ring, Vec::new()))
        .collect();
    if polygons.is_empty() {
        return Err(GeometryError::NoOuterRing {
            relation_id: relation.id,
        });
    }

    for ring in assemble_rings(relation.id, inner) {
        let Some(anchor) = ring.0.first().copied() else {
            continue;
        };
        match polygons
            .iter_mut()
            .find(|polygon| polygon.contains(&Point::from(anchor)))
        {
            Some(polygon) => polygon.interiors_push(ring),
            None => debug!(
                "relation {} drops an inner ring outside every outer ring",
                relation.id
            ),
        }
    }

    Ok(MultiPolygon::new(polygons).into())
}

/// Join open segments sharing endpoints into closed rings.
///
/// Fragments that cannot be closed are dropped.
fn assemble_rings(relation_id: i64, mut segments: Vec<Vec<Coord<f64>>>) -> Vec<LineString<f64>> {
    segments.reverse();
    let mut rings = Vec::new();
    while let Some(mut current) = segments.pop() {
        loop {
            if is_ring(&current) {
                rings.push(LineString::from(current));
                break;
            }
            let Some(end) = current.last().copied() else {
                break;
            };
            let next = segments.iter().rposition(|segment| {
                segment.first() == Some(&end) || segment.last() == Some(&end)
            });
            let Some(index) = next else {
                debug!("relation {relation_id} drops an unclosed ring fragment");
                break;
            };
            let mut segment = segments.remove(index);
            if segment.first() != Some(&end) {
                segment.reverse();
            }
            current.extend(segment.into_iter().skip(1));
        }
    }
    rings
}
