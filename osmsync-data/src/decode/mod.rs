//! Streaming decoders for extracts, replication diffs and state files.
//!
//! Decoders are lazy, forward-only iterators. The encoding of a payload is
//! inferred from its URI: `.pbf` extracts, `.osm` XML extracts and `.osc`
//! change files, optionally compressed as `.gz` or `.bz2`.

use std::io::{self, BufReader, Read};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use osmsync_core::{BoundError, Change, Entity};
use thiserror::Error;
use url::Url;

use crate::source::BlobReader;

mod pbf;
mod state;
mod xml;

pub use pbf::PbfEntityReader;
pub use state::{ReplicationState, parse_state};
pub use xml::{OsmChangeReader, OsmXmlReader};

/// Lazy stream of decoded entities.
pub type EntityStream = Box<dyn Iterator<Item = Result<Entity, DecodeError>>>;

/// Lazy stream of decoded change records.
pub type ChangeStream = Box<dyn Iterator<Item = Result<Change, DecodeError>>>;

/// Errors raised while decoding a payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Reading the underlying payload failed.
    #[error("failed to read payload: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The PBF container or one of its blocks was malformed.
    #[error("failed to decode PBF data: {source}")]
    Pbf {
        /// Error reported by `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// The XML document was malformed.
    #[error("malformed XML document: {source}")]
    Xml {
        /// Error reported by `quick-xml`.
        #[source]
        source: quick_xml::Error,
    },
    /// An element was structurally valid XML but not a valid record.
    #[error("invalid <{element}> element: {message}")]
    InvalidElement {
        /// Element name.
        element: String,
        /// What was wrong with it.
        message: String,
    },
    /// A declared bounding box was invalid.
    #[error("invalid bounding box: {source}")]
    Bound {
        /// Validation failure.
        #[source]
        source: BoundError,
    },
    /// A replication state file was malformed.
    #[error("invalid replication state: {message}")]
    State {
        /// What was wrong with it.
        message: String,
    },
    /// The URI does not name a supported encoding.
    #[error("cannot infer a supported {expected} encoding from {uri}")]
    UnsupportedEncoding {
        /// Payload URI.
        uri: String,
        /// Kind of payload the caller asked for.
        expected: &'static str,
    },
}

impl From<quick_xml::Error> for DecodeError {
    fn from(source: quick_xml::Error) -> Self {
        Self::Xml { source }
    }
}

/// Compression wrapping a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain bytes.
    None,
    /// `.gz`
    Gzip,
    /// `.bz2`
    Bzip2,
}

/// Container format of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.pbf` extract.
    Pbf,
    /// `.osm` XML extract.
    OsmXml,
    /// `.osc` change file.
    OsmChange,
}

/// Compression and container format inferred from a URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    /// Container format.
    pub format: Format,
    /// Compression wrapper.
    pub compression: Compression,
}

impl Encoding {
    /// Infer the encoding from the final path segment of `uri`.
    ///
    /// # Examples
    /// ```
    /// use osmsync_data::decode::{Compression, Encoding, Format};
    /// use url::Url;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let uri = Url::parse("https://example.org/minute/000/000/001.osc.gz")?;
    /// let encoding = Encoding::from_uri(&uri).expect("known suffix");
    /// assert_eq!(encoding.format, Format::OsmChange);
    /// assert_eq!(encoding.compression, Compression::Gzip);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn from_uri(uri: &Url) -> Option<Self> {
        let name = uri.path_segments()?.next_back()?.to_ascii_lowercase();
        let (rest, compression) = if let Some(rest) = name.strip_suffix(".gz") {
            (rest, Compression::Gzip)
        } else if let Some(rest) = name.strip_suffix(".bz2") {
            (rest, Compression::Bzip2)
        } else {
            (name.as_str(), Compression::None)
        };
        let format = if rest.ends_with(".pbf") {
            Format::Pbf
        } else if rest.ends_with(".osm") {
            Format::OsmXml
        } else if rest.ends_with(".osc") {
            Format::OsmChange
        } else {
            return None;
        };
        Some(Self {
            format,
            compression,
        })
    }
}

/// Wrap `reader` in the decompressor for `compression`.
pub fn decompress(reader: BlobReader, compression: Compression) -> BlobReader {
    match compression {
        Compression::None => reader,
        Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(reader))),
        Compression::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(reader))),
    }
}

/// Decode an extract fetched from `uri`.
pub fn decode_entities(uri: &Url, reader: BlobReader) -> Result<EntityStream, DecodeError> {
    let unsupported = || DecodeError::UnsupportedEncoding {
        uri: uri.to_string(),
        expected: "extract",
    };
    let encoding = Encoding::from_uri(uri).ok_or_else(unsupported)?;
    let reader = decompress(reader, encoding.compression);
    match encoding.format {
        Format::Pbf => Ok(Box::new(PbfEntityReader::new(reader))),
        Format::OsmXml => Ok(Box::new(OsmXmlReader::new(BufReader::new(reader)))),
        Format::OsmChange => Err(unsupported()),
    }
}

/// Decode a change file fetched from `uri`.
pub fn decode_changes(uri: &Url, reader: BlobReader) -> Result<ChangeStream, DecodeError> {
    match Encoding::from_uri(uri) {
        Some(Encoding {
            format: Format::OsmChange,
            compression,
        }) => {
            let reader = decompress(reader, compression);
            Ok(Box::new(OsmChangeReader::new(BufReader::new(reader))))
        }
        _ => Err(DecodeError::UnsupportedEncoding {
            uri: uri.to_string(),
            expected: "change",
        }),
    }
}
