//! Replication `state.txt` files.
//!
//! The files use Java properties syntax: `key=value` lines, `#` comments and
//! backslash escapes (timestamps arrive as `2021-03-04T05\:06\:07Z`).

use std::io::BufRead;

use chrono::{DateTime, Utc};

use super::DecodeError;

/// Sequence number and timestamp published beside a replication diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationState {
    /// Sequence number the state file describes.
    pub sequence_number: i64,
    /// Time up to which the diff contains changes.
    pub timestamp: DateTime<Utc>,
}

fn state_error(message: impl Into<String>) -> DecodeError {
    DecodeError::State {
        message: message.into(),
    }
}

fn unescape(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                unescaped.push(escaped);
            }
        } else {
            unescaped.push(ch);
        }
    }
    unescaped
}

/// Parse a replication state file.
///
/// # Examples
/// ```
/// use osmsync_data::decode::parse_state;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let state = parse_state("#comment\nsequenceNumber=42\ntimestamp=2021-03-04T05\\:06\\:07Z\n".as_bytes())?;
/// assert_eq!(state.sequence_number, 42);
/// # Ok(())
/// # }
/// ```
pub fn parse_state<R: BufRead>(reader: R) -> Result<ReplicationState, DecodeError> {
    let mut sequence_number = None;
    let mut timestamp = None;
    for line in reader.lines() {
        let line = line.map_err(|source| DecodeError::Io { source })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(state_error(format!("expected key=value, found {line:?}")));
        };
        let value = unescape(value.trim());
        match key.trim() {
            "sequenceNumber" => {
                let parsed = value
                    .parse::<i64>()
                    .map_err(|_| state_error(format!("invalid sequence number {value:?}")))?;
                sequence_number = Some(parsed);
            }
            "timestamp" => {
                let parsed = DateTime::parse_from_rfc3339(&value)
                    .map_err(|_| state_error(format!("invalid timestamp {value:?}")))?;
                timestamp = Some(parsed.with_timezone(&Utc));
            }
            _ => {}
        }
    }
    Ok(ReplicationState {
        sequence_number: sequence_number.ok_or_else(|| state_error("missing sequenceNumber"))?,
        timestamp: timestamp.ok_or_else(|| state_error("missing timestamp"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    fn parses_escaped_timestamps() {
        let text = "#Thu Mar 04 05:06:07 UTC 2021\ntxnMaxQueried=123\nsequenceNumber=4711\ntimestamp=2021-03-04T05\\:06\\:07Z\n";
        let state = parse_state(text.as_bytes()).expect("parse state");
        assert_eq!(
            state,
            ReplicationState {
                sequence_number: 4711,
                timestamp: Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).single().expect("valid date"),
            }
        );
    }

    #[rstest]
    #[case("timestamp=2021-03-04T05\\:06\\:07Z\n")]
    #[case("sequenceNumber=1\n")]
    #[case("sequenceNumber=one\ntimestamp=2021-03-04T05\\:06\\:07Z\n")]
    #[case("sequenceNumber\n")]
    fn rejects_incomplete_states(#[case] text: &str) {
        assert!(matches!(
            parse_state(text.as_bytes()),
            Err(DecodeError::State { .. })
        ));
    }
}
