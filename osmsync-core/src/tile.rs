//! XYZ tiles over the Web Mercator square.

use std::collections::BTreeSet;
use std::fmt;

use geo::{BoundingRect, Coord, Geometry, Rect};
use thiserror::Error;

use crate::projection::{SpatialReference, WEB_MERCATOR_HALF_EXTENT};

/// Deepest zoom level accepted by [`Tile`] calculations.
pub const MAX_ZOOM: u8 = 30;

/// Errors raised by tile calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TileError {
    /// The zoom level exceeds [`MAX_ZOOM`].
    #[error("zoom level {zoom} exceeds the maximum of {MAX_ZOOM}")]
    ZoomTooDeep {
        /// Rejected zoom level.
        zoom: u8,
    },
}

/// A Web Mercator tile; `y` counts rows from the north edge.
///
/// Tiles order by zoom, then column, then row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile {
    /// Zoom level.
    pub z: u8,
    /// Column, west to east.
    pub x: u32,
    /// Row, north to south.
    pub y: u32,
}

impl Tile {
    /// Construct a tile without range checks.
    #[must_use]
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Tile containing a Web Mercator coordinate.
    ///
    /// Coordinates outside the square are clamped onto its edge tiles.
    ///
    /// # Examples
    /// ```
    /// use geo::Coord;
    /// use osmsync_core::Tile;
    ///
    /// let tile = Tile::containing(Coord { x: 1.0, y: 1.0 }, 1).unwrap();
    /// assert_eq!(tile, Tile::new(1, 1, 0));
    /// ```
    pub fn containing(coord: Coord<f64>, zoom: u8) -> Result<Self, TileError> {
        let grid = TileGrid::new(zoom)?;
        Ok(Self {
            z: zoom,
            x: grid.column(coord.x),
            y: grid.row(coord.y),
        })
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Inclusive rectangular block of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    z: u8,
    min_x: u32,
    max_x: u32,
    min_y: u32,
    max_y: u32,
}

impl TileRange {
    /// Tiles covering a Web Mercator rectangle.
    pub fn covering(rect: Rect<f64>, zoom: u8) -> Result<Self, TileError> {
        let grid = TileGrid::new(zoom)?;
        Ok(Self {
            z: zoom,
            min_x: grid.column(rect.min().x),
            max_x: grid.column(rect.max().x),
            // Rows grow southwards, so the northern edge yields the first row.
            min_y: grid.row(rect.max().y),
            max_y: grid.row(rect.min().y),
        })
    }

    /// Iterate tiles column by column.
    pub fn iter(&self) -> impl Iterator<Item = Tile> + '_ {
        (self.min_x..=self.max_x)
            .flat_map(move |x| (self.min_y..=self.max_y).map(move |y| Tile::new(self.z, x, y)))
    }
}

/// Add every tile intersecting the bounding box of `geometry` to `tiles`.
///
/// `geometry` is expressed in `reference`; empty geometries add nothing.
pub fn collect_tiles(
    geometry: &Geometry<f64>,
    reference: SpatialReference,
    zoom: u8,
    tiles: &mut BTreeSet<Tile>,
) -> Result<(), TileError> {
    let Some(bounds) = geometry.bounding_rect() else {
        return Ok(());
    };
    let rect = Rect::new(
        reference.to_web_mercator(bounds.min()),
        reference.to_web_mercator(bounds.max()),
    );
    tiles.extend(TileRange::covering(rect, zoom)?.iter());
    Ok(())
}

struct TileGrid {
    count: u32,
    size: f64,
}

impl TileGrid {
    fn new(zoom: u8) -> Result<Self, TileError> {
        if zoom > MAX_ZOOM {
            return Err(TileError::ZoomTooDeep { zoom });
        }
        let count = 1_u32 << zoom;
        Ok(Self {
            count,
            size: 2.0 * WEB_MERCATOR_HALF_EXTENT / f64::from(count),
        })
    }

    fn column(&self, x: f64) -> u32 {
        self.index((x + WEB_MERCATOR_HALF_EXTENT) / self.size)
    }

    fn row(&self, y: f64) -> u32 {
        self.index((WEB_MERCATOR_HALF_EXTENT - y) / self.size)
    }

    // Floored and clamped to the grid, so the cast cannot truncate.
    fn index(&self, offset: f64) -> u32 {
        let last = f64::from(self.count - 1);
        if offset.is_nan() {
            return 0;
        }
        offset.floor().clamp(0.0, last) as u32
    }
}
