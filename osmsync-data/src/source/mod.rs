//! Blob sources that fetch extracts, diffs and state files by URI.
//!
//! Fetching is the only asynchronous step of the pipeline. Every source
//! returns a blocking reader over the complete payload, so decoding stays
//! synchronous.

use std::io::{self, Read};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

mod file;
mod http;
mod memory;

pub use file::FileBlobSource;
pub use http::{DEFAULT_USER_AGENT, HttpBlobSource};
pub use memory::MemoryBlobSource;

/// Reader over a fetched payload.
pub type BlobReader = Box<dyn Read + Send>;

/// Errors raised while fetching a payload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// Nothing exists at the URI.
    #[error("{uri} was not found")]
    NotFound {
        /// Requested URI.
        uri: String,
    },
    /// The server returned an HTTP error status other than 404.
    #[error("request to {uri} failed with status {status}: {message}")]
    Http {
        /// Requested URI.
        uri: String,
        /// HTTP status code.
        status: u16,
        /// Short error description.
        message: String,
    },
    /// The transport or the local filesystem failed.
    #[error("failed to read {uri}: {source}")]
    Io {
        /// Requested URI.
        uri: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// No source handles the URI scheme.
    #[error("unsupported URI scheme '{scheme}' for {uri}")]
    UnsupportedScheme {
        /// Requested URI.
        uri: String,
        /// Rejected scheme.
        scheme: String,
    },
}

impl FetchError {
    /// Whether the payload does not exist, as opposed to a failed transfer.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn io(uri: &Url, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                uri: uri.to_string(),
            }
        } else {
            Self::Io {
                uri: uri.to_string(),
                source,
            }
        }
    }
}

/// Retrieves payloads by URI.
#[async_trait(?Send)]
pub trait BlobSource {
    /// Fetch the payload at `uri`.
    async fn fetch(&self, uri: &Url) -> Result<BlobReader, FetchError>;
}

#[async_trait(?Send)]
impl<S: BlobSource + ?Sized> BlobSource for &S {
    async fn fetch(&self, uri: &Url) -> Result<BlobReader, FetchError> {
        (**self).fetch(uri).await
    }
}

/// Dispatches to the file or HTTP source by URI scheme.
#[derive(Debug)]
pub struct UriBlobSource {
    file: FileBlobSource,
    http: HttpBlobSource,
}

impl UriBlobSource {
    /// Combine a file and an HTTP source.
    #[must_use]
    pub fn new(file: FileBlobSource, http: HttpBlobSource) -> Self {
        Self { file, http }
    }

    /// Construct with default file and HTTP sources.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Ok(Self::new(FileBlobSource, HttpBlobSource::new()?))
    }
}

#[async_trait(?Send)]
impl BlobSource for UriBlobSource {
    async fn fetch(&self, uri: &Url) -> Result<BlobReader, FetchError> {
        match uri.scheme() {
            "file" => self.file.fetch(uri).await,
            "http" | "https" => self.http.fetch(uri).await,
            scheme => Err(FetchError::UnsupportedScheme {
                uri: uri.to_string(),
                scheme: scheme.to_owned(),
            }),
        }
    }
}
