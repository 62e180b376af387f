//! Addressing of replication diffs and state files.
//!
//! A replication feed publishes increment `n` as `AAA/BBB/CCC.osc.gz` beside
//! `AAA/BBB/CCC.state.txt`, where `AAABBBCCC` is `n` zero-padded to nine
//! digits.

use thiserror::Error;
use url::Url;

/// Largest sequence number the nine-digit layout can address.
pub const MAX_SEQUENCE_NUMBER: i64 = 999_999_999;

/// Errors raised while deriving replication URIs.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The sequence number does not fit the directory layout.
    #[error("sequence number {sequence_number} is outside 0..={MAX_SEQUENCE_NUMBER}")]
    SequenceOutOfRange {
        /// Rejected sequence number.
        sequence_number: i64,
    },
    /// The stored replication URL does not parse.
    #[error("invalid replication URL '{url}': {source}")]
    InvalidUrl {
        /// Rejected URL.
        url: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
}

/// Relative path stem of increment `sequence_number`.
///
/// # Examples
/// ```
/// use osmsync_data::replication::sequence_path;
///
/// assert_eq!(sequence_path(4_711).unwrap(), "000/004/711");
/// ```
pub fn sequence_path(sequence_number: i64) -> Result<String, ReplicationError> {
    if !(0..=MAX_SEQUENCE_NUMBER).contains(&sequence_number) {
        return Err(ReplicationError::SequenceOutOfRange { sequence_number });
    }
    let digits = format!("{sequence_number:09}");
    Ok(format!("{}/{}/{}", &digits[0..3], &digits[3..6], &digits[6..9]))
}

fn feed_url(base: &str, sequence_number: i64, suffix: &str) -> Result<Url, ReplicationError> {
    let invalid = |source| ReplicationError::InvalidUrl {
        url: base.to_owned(),
        source,
    };
    let mut base_url = Url::parse(base).map_err(invalid)?;
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }
    let relative = format!("{}{suffix}", sequence_path(sequence_number)?);
    base_url.join(&relative).map_err(invalid)
}

/// URI of the gzip-compressed osmChange file for `sequence_number`.
pub fn change_url(base: &str, sequence_number: i64) -> Result<Url, ReplicationError> {
    feed_url(base, sequence_number, ".osc.gz")
}

/// URI of the state file published beside the change file.
pub fn state_url(base: &str, sequence_number: i64) -> Result<Url, ReplicationError> {
    feed_url(base, sequence_number, ".state.txt")
}
