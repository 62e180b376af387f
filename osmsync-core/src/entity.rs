//! Entity model for map-feature extracts and replication diffs.
//!
//! An extract is a stream of [`Entity`] values. Header and Bound records
//! describe the dataset; nodes, ways and relations carry the features. The
//! variant set is closed, so consumers match exhaustively instead of relying
//! on visitors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use geo::{Coord, Geometry, Rect};
use thiserror::Error;

/// Free-form key/value tags attached to nodes, ways and relations.
///
/// A `BTreeMap` keeps serialized tags stable across runs.
pub type Tags = BTreeMap<String, String>;

/// Edit metadata carried by every element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Info {
    /// Element version, starting at 1.
    pub version: i32,
    /// Time of the edit that produced this version.
    pub timestamp: DateTime<Utc>,
    /// Changeset the edit belongs to.
    pub changeset: i64,
    /// Numeric id of the editing user.
    pub uid: i32,
    /// Display name of the editing user.
    pub user: String,
}

/// Replication metadata describing how far a dataset has been synchronised.
///
/// The store keeps one row per sequence number; the row with the highest
/// sequence number is the current header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    /// Number of increments applied since the baseline extract.
    pub replication_sequence_number: i64,
    /// Timestamp of the newest change reflected in the dataset.
    pub replication_timestamp: DateTime<Utc>,
    /// Base URL of the replication change feed.
    pub replication_url: String,
    /// Free-form description of the data source.
    pub source: String,
    /// Program that wrote the extract.
    pub writing_program: String,
}

impl Header {
    /// Construct a header for the given replication position.
    ///
    /// # Examples
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use osmsync_core::Header;
    ///
    /// let timestamp = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    /// let header = Header::new(0, timestamp, "file:///replication");
    /// assert_eq!(header.replication_sequence_number, 0);
    /// assert!(header.source.is_empty());
    /// ```
    pub fn new(
        replication_sequence_number: i64,
        replication_timestamp: DateTime<Utc>,
        replication_url: impl Into<String>,
    ) -> Self {
        Self {
            replication_sequence_number,
            replication_timestamp,
            replication_url: replication_url.into(),
            source: String::new(),
            writing_program: String::new(),
        }
    }

    /// Header describing the increment that follows this one.
    ///
    /// The url, source and writing program are carried over unchanged.
    #[must_use]
    pub fn advance(&self, replication_timestamp: DateTime<Utc>) -> Self {
        Self {
            replication_sequence_number: self.replication_sequence_number + 1,
            replication_timestamp,
            ..self.clone()
        }
    }
}

/// Errors returned by [`Bound::new`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum BoundError {
    /// A corner was not a finite WGS84 coordinate.
    #[error("bound corner ({lon}, {lat}) is not a valid WGS84 coordinate")]
    InvalidCorner {
        /// Offending longitude.
        lon: f64,
        /// Offending latitude.
        lat: f64,
    },
    /// The minimum corner lies north or east of the maximum corner.
    #[error("bound minimum corner lies beyond the maximum corner")]
    Inverted,
}

/// Bounding box declared by an extract, in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bound {
    /// Western edge.
    pub min_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl Bound {
    /// Validate and construct a [`Bound`].
    ///
    /// # Examples
    /// ```
    /// use osmsync_core::{Bound, BoundError};
    ///
    /// assert!(Bound::new(9.47, 47.04, 9.64, 47.27).is_ok());
    /// assert_eq!(Bound::new(10.0, 0.0, 9.0, 1.0), Err(BoundError::Inverted));
    /// ```
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, BoundError> {
        for (lon, lat) in [(min_lon, min_lat), (max_lon, max_lat)] {
            if !is_wgs84(lon, lat) {
                return Err(BoundError::InvalidCorner { lon, lat });
            }
        }
        if min_lon > max_lon || min_lat > max_lat {
            return Err(BoundError::Inverted);
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// The bound as a rectangle with `x = longitude`, `y = latitude`.
    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }
}

pub(crate) fn is_wgs84(lon: f64, lat: f64) -> bool {
    lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat)
}

/// Kind of a feature element, used for relation members and deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ElementKind {
    /// A point feature.
    Node,
    /// An ordered list of nodes.
    Way,
    /// A typed collection of members.
    Relation,
}

impl ElementKind {
    /// Lower-case name used by the XML formats.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    /// Node id.
    pub id: i64,
    /// Edit metadata.
    pub info: Info,
    /// Feature tags.
    pub tags: Tags,
    /// Raw WGS84 longitude.
    pub lon: f64,
    /// Raw WGS84 latitude.
    pub lat: f64,
    /// Projected point, once resolved.
    pub geometry: Option<Geometry<f64>>,
}

impl Node {
    /// Construct an untagged node at the given WGS84 position.
    pub fn new(id: i64, lon: f64, lat: f64) -> Self {
        Self {
            id,
            lon,
            lat,
            ..Self::default()
        }
    }
}

/// An ordered sequence of node references.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Way {
    /// Way id.
    pub id: i64,
    /// Edit metadata.
    pub info: Info,
    /// Feature tags.
    pub tags: Tags,
    /// Referenced node ids in drawing order.
    pub nodes: Vec<i64>,
    /// Line or polygon built from the resolved node coordinates.
    pub geometry: Option<Geometry<f64>>,
}

impl Way {
    /// Construct an untagged way over the given node ids.
    pub fn new(id: i64, nodes: Vec<i64>) -> Self {
        Self {
            id,
            nodes,
            ..Self::default()
        }
    }
}

/// A typed, ordered reference from a relation to another element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Member {
    /// Referenced element id.
    pub id: i64,
    /// Referenced element kind.
    pub kind: ElementKind,
    /// Role of the member inside the relation (may be empty).
    pub role: String,
}

impl Member {
    /// Construct a member reference.
    pub fn new(id: i64, kind: ElementKind, role: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            role: role.into(),
        }
    }
}

/// A typed collection of members.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relation {
    /// Relation id.
    pub id: i64,
    /// Edit metadata.
    pub info: Info,
    /// Feature tags.
    pub tags: Tags,
    /// Ordered members.
    pub members: Vec<Member>,
    /// Geometry assembled from the resolved members.
    pub geometry: Option<Geometry<f64>>,
}

impl Relation {
    /// Construct an untagged relation with the given members.
    pub fn new(id: i64, members: Vec<Member>) -> Self {
        Self {
            id,
            members,
            ..Self::default()
        }
    }
}

/// Capabilities shared by nodes, ways and relations.
pub trait Element {
    /// Kind of this element.
    const KIND: ElementKind;

    /// Element id, unique within its kind.
    fn id(&self) -> i64;
    /// Edit metadata.
    fn info(&self) -> &Info;
    /// Feature tags.
    fn tags(&self) -> &Tags;
    /// Resolved geometry, if any.
    fn geometry(&self) -> Option<&Geometry<f64>>;
}

macro_rules! impl_element {
    ($ty:ty, $kind:expr) => {
        impl Element for $ty {
            const KIND: ElementKind = $kind;

            fn id(&self) -> i64 {
                self.id
            }

            fn info(&self) -> &Info {
                &self.info
            }

            fn tags(&self) -> &Tags {
                &self.tags
            }

            fn geometry(&self) -> Option<&Geometry<f64>> {
                self.geometry.as_ref()
            }
        }

        impl $ty {
            /// Replace the tags, consuming `self`.
            #[must_use]
            pub fn with_tags<K, V, I>(mut self, tags: I) -> Self
            where
                I: IntoIterator<Item = (K, V)>,
                K: Into<String>,
                V: Into<String>,
            {
                self.tags = tags
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect();
                self
            }

            /// Replace the edit metadata, consuming `self`.
            #[must_use]
            pub fn with_info(mut self, info: Info) -> Self {
                self.info = info;
                self
            }
        }
    };
}

impl_element!(Node, ElementKind::Node);
impl_element!(Way, ElementKind::Way);
impl_element!(Relation, ElementKind::Relation);

/// Discriminant of an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// See [`Header`].
    Header,
    /// See [`Bound`].
    Bound,
    /// See [`Node`].
    Node,
    /// See [`Way`].
    Way,
    /// See [`Relation`].
    Relation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Bound => "bound",
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        })
    }
}

/// One record of an extract or diff.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Dataset header.
    Header(Header),
    /// Declared dataset bounds.
    Bound(Bound),
    /// Point feature.
    Node(Node),
    /// Linear or areal feature.
    Way(Way),
    /// Collection feature.
    Relation(Relation),
}

impl Entity {
    /// Discriminant of this entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Header(_) => EntityKind::Header,
            Self::Bound(_) => EntityKind::Bound,
            Self::Node(_) => EntityKind::Node,
            Self::Way(_) => EntityKind::Way,
            Self::Relation(_) => EntityKind::Relation,
        }
    }

    /// Kind and id for feature elements; `None` for headers and bounds.
    #[must_use]
    pub fn element_ref(&self) -> Option<(ElementKind, i64)> {
        match self {
            Self::Header(_) | Self::Bound(_) => None,
            Self::Node(node) => Some((ElementKind::Node, node.id)),
            Self::Way(way) => Some((ElementKind::Way, way.id)),
            Self::Relation(relation) => Some((ElementKind::Relation, relation.id)),
        }
    }

    /// Edit timestamp for feature elements.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Header(_) | Self::Bound(_) => None,
            Self::Node(node) => Some(node.info.timestamp),
            Self::Way(way) => Some(way.info.timestamp),
            Self::Relation(relation) => Some(relation.info.timestamp),
        }
    }
}

impl From<Node> for Entity {
    fn from(value: Node) -> Self {
        Self::Node(value)
    }
}

impl From<Way> for Entity {
    fn from(value: Way) -> Self {
        Self::Way(value)
    }
}

impl From<Relation> for Entity {
    fn from(value: Relation) -> Self {
        Self::Relation(value)
    }
}
