//! Application of the next pending replication increment.

use std::io::BufReader;

use chrono::{DateTime, Utc};
use log::{info, warn};
use osmsync_core::store::{SqliteStore, StoreError, commit};
use osmsync_core::{
    ApplyPlan, CacheError, Change, ChangeAction, CoordinateCache, Deletion, ElementKind,
    GeometryError, Header, ReferenceCache,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::decode::{DecodeError, parse_state};
use crate::increment::{IncrementError, load_changes};
use crate::replication::{ReplicationError, state_url};
use crate::resolve::{ResolveOptions, Resolver};
use crate::source::{BlobSource, FetchError};

/// Where the timestamp of the new header came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// The state file published beside the change file.
    StateFile,
    /// The newest element timestamp inside the change file.
    Changes,
    /// The previous header, for change files without timestamps.
    PreviousHeader,
}

/// Outcome of one applied increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Header recorded after the increment.
    pub header: Header,
    /// Origin of the header timestamp.
    pub timestamp_source: TimestampSource,
    /// Create records applied.
    pub created: u64,
    /// Modify records applied.
    pub modified: u64,
    /// Delete records applied.
    pub deleted: u64,
    /// Elements stored without geometry because a reference was missing.
    pub unresolved: u64,
}

/// Errors returned by [`UpdateService::update`].
///
/// Whatever the variant, the header has not advanced and the store tables
/// and SQLite caches are at their prior state.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The store holds no header; import an extract and record a baseline
    /// header first.
    #[error("the store has no replication header; record a baseline header after importing")]
    MissingHeader,
    /// The change file could not be loaded.
    #[error(transparent)]
    Increment(#[from] IncrementError),
    /// The state file could not be fetched.
    #[error("failed to fetch the state of increment {sequence_number}: {source}")]
    StateFetch {
        /// Increment whose state was requested.
        sequence_number: i64,
        /// Fetch failure.
        #[source]
        source: FetchError,
    },
    /// The state file was malformed.
    #[error("failed to decode the state of increment {sequence_number}: {source}")]
    StateDecode {
        /// Increment whose state was requested.
        sequence_number: i64,
        /// Decoder failure.
        #[source]
        source: DecodeError,
    },
    /// The state file describes a different increment.
    #[error("state file describes increment {found}, expected {expected}")]
    StateMismatch {
        /// Increment being applied.
        expected: i64,
        /// Sequence number found in the state file.
        found: i64,
    },
    /// Geometry resolution failed in strict mode.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// A cache backend failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The entity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The cancellation token fired while applying changes.
    #[error("applying increment {sequence_number} was cancelled")]
    Cancelled {
        /// Increment being applied.
        sequence_number: i64,
    },
}

impl From<ReplicationError> for UpdateError {
    fn from(error: ReplicationError) -> Self {
        Self::Increment(error.into())
    }
}

/// Applies exactly one replication increment per call.
///
/// The increment is the one following the latest stored header. Deletes run
/// first, then node, way and relation upserts; the new header is inserted
/// last. Everything runs inside one store transaction, so a failed call can be
/// retried as is.
#[derive(Debug)]
pub struct UpdateService<S> {
    source: S,
    options: ResolveOptions,
    cancellation: CancellationToken,
}

impl<S: BlobSource> UpdateService<S> {
    /// Update through `source` with the given geometry settings.
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

    /// Fetch and apply the next increment.
    pub async fn update<C, R>(
        &self,
        store: &SqliteStore,
        coordinates: &mut C,
        references: &mut R,
    ) -> Result<UpdateReport, UpdateError>
    where
        C: CoordinateCache + ?Sized,
        R: ReferenceCache + ?Sized,
    {
        let latest = store
            .headers()
            .select_latest()?
            .ok_or(UpdateError::MissingHeader)?;
        let sequence_number = latest.replication_sequence_number + 1;
        let changes = load_changes(
            &self.source,
            &latest.replication_url,
            sequence_number,
            &self.cancellation,
        )
        .await?;
        let (timestamp, timestamp_source) = self
            .resolve_timestamp(&latest, sequence_number, &changes)
            .await?;

        let mut report = UpdateReport {
            header: latest.advance(timestamp),
            timestamp_source,
            created: 0,
            modified: 0,
            deleted: 0,
            unresolved: 0,
        };
        for change in &changes {
            match change.action {
                ChangeAction::Create => report.created += 1,
                ChangeAction::Modify => report.modified += 1,
                ChangeAction::Delete => report.deleted += 1,
            }
        }

        let transaction = store.transaction()?;
        let plan = ApplyPlan::from_changes(changes);
        report.unresolved = self.apply(plan, sequence_number, store, coordinates, references)?;
        store.headers().insert(&report.header)?;
        commit(transaction)?;

        info!(
            "applied increment {sequence_number}: {} created, {} modified, {} deleted",
            report.created, report.modified, report.deleted
        );
        Ok(report)
    }

    async fn resolve_timestamp(
        &self,
        latest: &Header,
        sequence_number: i64,
        changes: &[Change],
    ) -> Result<(DateTime<Utc>, TimestampSource), UpdateError> {
        let uri = state_url(&latest.replication_url, sequence_number)?;
        match self.source.fetch(&uri).await {
            Ok(reader) => {
                let state = parse_state(BufReader::new(reader)).map_err(|source| {
                    UpdateError::StateDecode {
                        sequence_number,
                        source,
                    }
                })?;
                if state.sequence_number != sequence_number {
                    return Err(UpdateError::StateMismatch {
                        expected: sequence_number,
                        found: state.sequence_number,
                    });
                }
                Ok((state.timestamp, TimestampSource::StateFile))
            }
            Err(error) if error.is_not_found() => {
                warn!("no state file at {uri}; deriving the timestamp from the changes");
                let newest = changes
                    .iter()
                    .filter_map(|change| change.entity.timestamp())
                    .filter(|timestamp| timestamp.timestamp_millis() != 0)
                    .max();
                Ok(match newest {
                    Some(timestamp) => (timestamp, TimestampSource::Changes),
                    None => (latest.replication_timestamp, TimestampSource::PreviousHeader),
                })
            }
            Err(source) => Err(UpdateError::StateFetch {
                sequence_number,
                source,
            }),
        }
    }

    fn apply<C, R>(
        &self,
        plan: ApplyPlan,
        sequence_number: i64,
        store: &SqliteStore,
        coordinates: &mut C,
        references: &mut R,
    ) -> Result<u64, UpdateError>
    where
        C: CoordinateCache + ?Sized,
        R: ReferenceCache + ?Sized,
    {
        let cancelled = || {
            if self.cancellation.is_cancelled() {
                Err(UpdateError::Cancelled { sequence_number })
            } else {
                Ok(())
            }
        };
        let (nodes, ways, relations) = (store.nodes(), store.ways(), store.relations());
        let mut resolver = Resolver::new(self.options);

        for Deletion { kind, id } in plan.deletes {
            cancelled()?;
            match kind {
                ElementKind::Node => {
                    nodes.delete(id)?;
                    coordinates.delete(id)?;
                }
                ElementKind::Way => {
                    ways.delete(id)?;
                    references.delete(id)?;
                }
                ElementKind::Relation => relations.delete(id)?,
            }
        }
        for mut node in plan.nodes {
            cancelled()?;
            resolver.node(&mut node, &mut *coordinates)?;
            nodes.insert(&node)?;
        }
        for mut way in plan.ways {
            cancelled()?;
            resolver.way(&mut way, &*coordinates, &mut *references)?;
            ways.insert(&way)?;
        }
        for mut relation in plan.relations {
            cancelled()?;
            resolver.relation(&mut relation, &*coordinates, &*references)?;
            relations.insert(&relation)?;
        }
        Ok(resolver.unresolved())
    }
}
