//! Tile footprint of pending replication increments.

use std::collections::{BTreeSet, HashMap};

use geo::Geometry;
use log::{debug, info};
use osmsync_core::store::{SqliteStore, StoreError};
use osmsync_core::{
    ApplyPlan, CacheError, CoordinateCache, Deletion, ElementKind, GeometryError, MAX_ZOOM,
    OverlayCoordinateCache, OverlayReferenceCache, ReferenceCache, Tile, TileError, collect_tiles,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::increment::{IncrementError, load_changes};
use crate::resolve::{ResolveOptions, Resolver};
use crate::source::BlobSource;

/// Tiles touched by the examined increments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffReport {
    /// Deduplicated tiles in `z/x/y` order.
    pub tiles: BTreeSet<Tile>,
    /// Increments that were examined, in order.
    pub sequence_numbers: Vec<i64>,
}

/// Errors returned by [`DiffService::diff`].
#[derive(Debug, Error)]
pub enum DiffError {
    /// The store holds no header.
    #[error("the store has no replication header; record a baseline header after importing")]
    MissingHeader,
    /// A change file could not be loaded.
    #[error(transparent)]
    Increment(#[from] IncrementError),
    /// The requested zoom level is out of range.
    #[error(transparent)]
    Tile(#[from] TileError),
    /// Geometry resolution failed in strict mode.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// A cache backend failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The entity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The cancellation token fired while examining changes.
    #[error("diffing increment {sequence_number} was cancelled")]
    Cancelled {
        /// Increment being examined.
        sequence_number: i64,
    },
}

/// Computes the tiles whose content changes in pending increments.
///
/// Nothing is written: previous geometries come from the store and new
/// geometries are resolved through overlays over the caches, so the header
/// and every table stay untouched.
#[derive(Debug)]
pub struct DiffService<S> {
    source: S,
    options: ResolveOptions,
    cancellation: CancellationToken,
}

type Shadowed = HashMap<(ElementKind, i64), Option<Geometry<f64>>>;

impl<S: BlobSource> DiffService<S> {
    /// Diff through `source` with the given geometry settings.
    pub fn new(source: S, options: ResolveOptions) -> Self {
        Self {
            source,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Abort between records once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Tiles at `zoom` touched by up to `count` increments after the latest
    /// header.
    ///
    /// A missing first increment is an error; a missing later increment ends
    /// the scan.
    pub async fn diff<C, R>(
        &self,
        store: &SqliteStore,
        coordinates: &C,
        references: &R,
        zoom: u8,
        count: usize,
    ) -> Result<DiffReport, DiffError>
    where
        C: CoordinateCache + ?Sized,
        R: ReferenceCache + ?Sized,
    {
        if zoom > MAX_ZOOM {
            return Err(TileError::ZoomTooDeep { zoom }.into());
        }
        let latest = store
            .headers()
            .select_latest()?
            .ok_or(DiffError::MissingHeader)?;

        let reference = self.options.spatial_reference;
        let mut coordinates = OverlayCoordinateCache::new(coordinates);
        let mut references = OverlayReferenceCache::new(references);
        let mut shadowed = Shadowed::new();
        let mut resolver = Resolver::new(self.options);
        let mut report = DiffReport::default();
        let mut sequence_number = latest.replication_sequence_number;
        for examined in 0..count {
            sequence_number += 1;
            let cancelled = || {
                if self.cancellation.is_cancelled() {
                    Err(DiffError::Cancelled { sequence_number })
                } else {
                    Ok(())
                }
            };
            cancelled()?;
            let changes = match load_changes(
                &self.source,
                &latest.replication_url,
                sequence_number,
                &self.cancellation,
            )
            .await
            {
                Ok(changes) => changes,
                Err(error) if examined > 0 && error.is_not_found() => {
                    debug!("increment {sequence_number} is not published yet");
                    break;
                }
                Err(error) => return Err(error.into()),
            };

            for change in &changes {
                cancelled()?;
                let Some(key) = change.entity.element_ref() else {
                    continue;
                };
                if !change.action.touches_previous() {
                    continue;
                }
                if let Some(geometry) = previous_geometry(store, &shadowed, key)? {
                    collect_tiles(&geometry, reference, zoom, &mut report.tiles)?;
                }
            }

            let plan = ApplyPlan::from_changes(changes);
            for Deletion { kind, id } in plan.deletes {
                cancelled()?;
                match kind {
                    ElementKind::Node => coordinates.delete(id)?,
                    ElementKind::Way => references.delete(id)?,
                    ElementKind::Relation => {}
                }
                shadowed.insert((kind, id), None);
            }
            let mut resolved = Vec::new();
            for mut node in plan.nodes {
                cancelled()?;
                resolver.node(&mut node, &mut coordinates)?;
                resolved.push(((ElementKind::Node, node.id), node.geometry));
            }
            for mut way in plan.ways {
                cancelled()?;
                resolver.way(&mut way, &coordinates, &mut references)?;
                resolved.push(((ElementKind::Way, way.id), way.geometry));
            }
            for mut relation in plan.relations {
                cancelled()?;
                resolver.relation(&mut relation, &coordinates, &references)?;
                resolved.push(((ElementKind::Relation, relation.id), relation.geometry));
            }
            for (key, geometry) in resolved {
                if let Some(geometry) = &geometry {
                    collect_tiles(geometry, reference, zoom, &mut report.tiles)?;
                }
                shadowed.insert(key, geometry);
            }
            report.sequence_numbers.push(sequence_number);
        }

        info!(
            "increments {:?} touch {} tiles at zoom {zoom}",
            report.sequence_numbers,
            report.tiles.len()
        );
        Ok(report)
    }
}

/// Geometry of an element before the increment being examined.
fn previous_geometry(
    store: &SqliteStore,
    shadowed: &Shadowed,
    (kind, id): (ElementKind, i64),
) -> Result<Option<Geometry<f64>>, StoreError> {
    if let Some(geometry) = shadowed.get(&(kind, id)) {
        return Ok(geometry.clone());
    }
    Ok(match kind {
        ElementKind::Node => store.nodes().select(id)?.and_then(|node| node.geometry),
        ElementKind::Way => store.ways().select(id)?.and_then(|way| way.geometry),
        ElementKind::Relation => store
            .relations()
            .select(id)?
            .and_then(|relation| relation.geometry),
    })
}
