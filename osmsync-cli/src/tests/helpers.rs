//! Test helpers for driving the subcommands against an in-memory feed.

use std::io::Write as _;

use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};
use flate2::{Compression, write::GzEncoder};
use osmsync_core::Header;
use osmsync_data::{MemoryBlobSource, ResolveOptions};
use tempfile::TempDir;
use url::Url;

use crate::import::ImportConfig;

pub(super) const REPLICATION_URL: &str = "memory://replication/minute";
pub(super) const EXTRACT_URI: &str = "memory://extracts/town.osm";

/// Two nodes and a footway between them.
pub(super) const EXTRACT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="fixture">
  <bounds minlat="51.0" minlon="-0.2" maxlat="51.1" maxlon="-0.1"/>
  <node id="1" lat="51.05" lon="-0.15"/>
  <node id="2" lat="51.06" lon="-0.14"/>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="footway"/>
  </way>
</osm>"#;

/// Moves node 2 and adds node 3.
pub(super) const FIRST_INCREMENT: &str = r#"<osmChange version="0.6">
  <modify>
    <node id="2" version="2" timestamp="2024-05-01T00:00:40Z" lat="51.07" lon="-0.13"/>
  </modify>
  <create>
    <node id="3" version="1" timestamp="2024-05-01T00:00:50Z" lat="51.08" lon="-0.12"/>
  </create>
</osmChange>"#;

pub(super) const FIRST_STATE: &str =
    "#Wed May 01 00:01:00 UTC 2024\nsequenceNumber=1\ntimestamp=2024-05-01T00\\:01\\:00Z\n";

pub(super) fn uri(text: &str) -> Url {
    Url::parse(text).unwrap_or_else(|err| panic!("invalid fixture uri {text}: {err}"))
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .expect("compress change file");
    encoder.finish().expect("finish gzip stream")
}

/// Feed serving the extract, the first increment and its state file.
pub(super) fn feed() -> MemoryBlobSource {
    let mut source = MemoryBlobSource::default();
    source.insert(uri(EXTRACT_URI), EXTRACT.as_bytes().to_vec());
    source.insert(
        uri(&format!("{REPLICATION_URL}/000/000/001.osc.gz")),
        gzip(FIRST_INCREMENT),
    );
    source.insert(
        uri(&format!("{REPLICATION_URL}/000/000/001.state.txt")),
        FIRST_STATE.as_bytes().to_vec(),
    );
    source
}

/// Temporary directory holding the store used by a test.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    /// Store path one directory below the root, so imports create the parent.
    pub(super) fn store(&self) -> Utf8PathBuf {
        self.root.join("data").join("town.db")
    }

    pub(super) fn import_config(&self, options: ResolveOptions) -> ImportConfig {
        let timestamp = Utc
            .with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
            .single()
            .expect("valid baseline timestamp");
        ImportConfig {
            store: self.store(),
            extract: uri(EXTRACT_URI),
            options,
            baseline: Some(Header::new(0, timestamp, REPLICATION_URL)),
        }
    }
}

/// Command output captured as UTF-8.
pub(super) fn text(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).expect("utf-8 output")
}
