use std::collections::HashMap;
use std::io::Cursor;

use async_trait::async_trait;
use url::Url;

use super::{BlobReader, BlobSource, FetchError};

/// In-process payloads keyed by URI.
///
/// # Examples
/// ```
/// use osmsync_data::{BlobSource, MemoryBlobSource};
/// use url::Url;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let uri = Url::parse("memory://replication/000/000/001.state.txt")?;
/// let mut source = MemoryBlobSource::default();
/// source.insert(uri.clone(), b"sequenceNumber=1\n".to_vec());
/// assert!(source.contains(&uri));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobSource {
    blobs: HashMap<Url, Vec<u8>>,
}

impl MemoryBlobSource {
    /// Store `bytes` under `uri`, replacing any previous payload.
    pub fn insert(&mut self, uri: Url, bytes: Vec<u8>) {
        self.blobs.insert(uri, bytes);
    }

    /// Remove the payload stored under `uri`.
    pub fn remove(&mut self, uri: &Url) -> Option<Vec<u8>> {
        self.blobs.remove(uri)
    }

    /// Whether a payload is stored under `uri`.
    #[must_use]
    pub fn contains(&self, uri: &Url) -> bool {
        self.blobs.contains_key(uri)
    }
}

#[async_trait(?Send)]
impl BlobSource for MemoryBlobSource {
    async fn fetch(&self, uri: &Url) -> Result<BlobReader, FetchError> {
        self.blobs
            .get(uri)
            .map(|bytes| Box::new(Cursor::new(bytes.clone())) as BlobReader)
            .ok_or_else(|| FetchError::NotFound {
                uri: uri.to_string(),
            })
    }
}
