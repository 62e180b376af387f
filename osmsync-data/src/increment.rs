//! Fetching and decoding of a single replication increment.

use log::debug;
use osmsync_core::Change;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::decode::{DecodeError, decode_changes};
use crate::replication::{ReplicationError, change_url};
use crate::source::{BlobSource, FetchError};

/// Errors raised while loading a replication increment.
#[derive(Debug, Error)]
pub enum IncrementError {
    /// The increment URI could not be derived.
    #[error(transparent)]
    Replication(#[from] ReplicationError),
    /// The change file could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The change file was malformed.
    #[error("failed to decode increment {sequence_number}: {source}")]
    Decode {
        /// Increment being decoded.
        sequence_number: i64,
        /// Decoder failure.
        #[source]
        source: DecodeError,
    },
    /// The cancellation token fired while decoding.
    #[error("decoding increment {sequence_number} was cancelled")]
    Cancelled {
        /// Increment being decoded.
        sequence_number: i64,
    },
}

impl IncrementError {
    /// Whether the change file does not exist yet.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Fetch(error) if error.is_not_found())
    }
}

/// Fetch and decode every change record of increment `sequence_number`.
pub(crate) async fn load_changes<S>(
    source: &S,
    replication_url: &str,
    sequence_number: i64,
    cancellation: &CancellationToken,
) -> Result<Vec<Change>, IncrementError>
where
    S: BlobSource + ?Sized,
{
    let uri = change_url(replication_url, sequence_number)?;
    let reader = source.fetch(&uri).await?;
    let decode_error = |source| IncrementError::Decode {
        sequence_number,
        source,
    };
    let mut changes = Vec::new();
    for change in decode_changes(&uri, reader).map_err(decode_error)? {
        if cancellation.is_cancelled() {
            return Err(IncrementError::Cancelled { sequence_number });
        }
        changes.push(change.map_err(decode_error)?);
    }
    debug!("decoded {} changes from {uri}", changes.len());
    Ok(changes)
}
