//! Geometry resolution shared by the import, update and diff services.

use geo::{Geometry, Point};
use log::warn;
use osmsync_core::{
    CoordinateCache, GeometryError, GeometryMode, Node, ReferenceCache, Relation,
    SpatialReference, Way, project_node, relation_geometry, way_geometry,
};

/// Geometry settings shared by every service.
///
/// Stored coordinates and tiles are computed in `spatial_reference`; a store
/// must keep one reference for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Reference system of cached coordinates and stored geometries.
    pub spatial_reference: SpatialReference,
    /// Reaction to references that cannot be resolved.
    pub geometry_mode: GeometryMode,
}

/// Resolves element geometry and keeps the caches current.
#[derive(Debug)]
pub(crate) struct Resolver {
    reference: SpatialReference,
    mode: GeometryMode,
    unresolved: u64,
}

impl Resolver {
    pub(crate) const fn new(options: ResolveOptions) -> Self {
        Self {
            reference: options.spatial_reference,
            mode: options.geometry_mode,
            unresolved: 0,
        }
    }

    /// Elements stored without geometry so far.
    pub(crate) const fn unresolved(&self) -> u64 {
        self.unresolved
    }

    fn settle(
        &mut self,
        resolved: Result<Geometry<f64>, GeometryError>,
    ) -> Result<Option<Geometry<f64>>, GeometryError> {
        match resolved {
            Ok(geometry) => Ok(Some(geometry)),
            Err(error) if error.is_unresolved() && self.mode == GeometryMode::Lenient => {
                warn!("storing element without geometry: {error}");
                self.unresolved += 1;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Project `node`, cache its coordinate and attach the point geometry.
    pub(crate) fn node<C>(
        &mut self,
        node: &mut Node,
        coordinates: &mut C,
    ) -> Result<(), GeometryError>
    where
        C: CoordinateCache + ?Sized,
    {
        let projected = project_node(node, self.reference);
        match &projected {
            Ok(coordinate) => coordinates.put(node.id, *coordinate)?,
            Err(_) => coordinates.delete(node.id)?,
        }
        node.geometry = self.settle(projected.map(|coordinate| Point::from(coordinate).into()))?;
        Ok(())
    }

    /// Cache the node list of `way` and attach its geometry.
    pub(crate) fn way<C, R>(
        &mut self,
        way: &mut Way,
        coordinates: &C,
        references: &mut R,
    ) -> Result<(), GeometryError>
    where
        C: CoordinateCache + ?Sized,
        R: ReferenceCache + ?Sized,
    {
        references.put(way.id, way.nodes.clone())?;
        way.geometry = self.settle(way_geometry(way, coordinates))?;
        Ok(())
    }

    /// Attach the geometry of `relation`.
    pub(crate) fn relation<C, R>(
        &mut self,
        relation: &mut Relation,
        coordinates: &C,
        references: &R,
    ) -> Result<(), GeometryError>
    where
        C: CoordinateCache + ?Sized,
        R: ReferenceCache + ?Sized,
    {
        relation.geometry = self.settle(relation_geometry(relation, coordinates, references))?;
        Ok(())
    }
}
