//! Column encodings shared by the SQLite tables and caches.
//!
//! Geometries are `bincode` blobs; tags, node lists and members are JSON
//! text; timestamps are Unix milliseconds.

use chrono::{DateTime, Utc};
use geo::Geometry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure to encode or decode a column value.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON text could not be produced or parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// A geometry blob could not be produced or parsed.
    #[error(transparent)]
    Geometry(#[from] bincode::Error),
    /// A stored timestamp is outside the representable range.
    #[error("timestamp {millis} ms is out of range")]
    Timestamp {
        /// Stored value.
        millis: i64,
    },
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn to_blob(geometry: Option<&Geometry<f64>>) -> Result<Option<Vec<u8>>, CodecError> {
    geometry
        .map(|geometry| bincode::serialize(geometry).map_err(CodecError::from))
        .transpose()
}

pub(crate) fn from_blob(blob: Option<&[u8]>) -> Result<Option<Geometry<f64>>, CodecError> {
    blob.map(|bytes| bincode::deserialize(bytes).map_err(CodecError::from))
        .transpose()
}

pub(crate) fn to_millis(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>, CodecError> {
    DateTime::from_timestamp_millis(millis).ok_or(CodecError::Timestamp { millis })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point};
    use rstest::rstest;

    #[rstest]
    #[case(Point::new(1.0, 2.0).into())]
    #[case(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]).into())]
    fn geometry_blobs_decode_to_the_same_shape(#[case] geometry: Geometry<f64>) {
        let blob = to_blob(Some(&geometry)).expect("encode").expect("blob");
        let decoded = from_blob(Some(blob.as_slice())).expect("decode");
        assert_eq!(decoded, Some(geometry));
    }

    #[rstest]
    fn missing_geometry_stays_missing() {
        assert_eq!(to_blob(None).expect("encode"), None);
        assert_eq!(from_blob(None).expect("decode"), None);
    }

    #[rstest]
    fn out_of_range_timestamp_is_rejected() {
        assert!(matches!(
            from_millis(i64::MAX),
            Err(CodecError::Timestamp { millis: i64::MAX })
        ));
    }
}
