//! Shared fixtures for the osmsync-data integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use base64::{Engine as _, engine::general_purpose};
use chrono::{TimeZone, Utc};
use flate2::{Compression, write::GzEncoder};
use osmsync_core::Header;
use osmsync_data::MemoryBlobSource;
use std::{
    fs,
    future::Future,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::{Builder, TempPath};
use tokio::runtime;
use url::Url;

/// Replication feed served by [`replication_source`].
pub const REPLICATION_URL: &str = "memory://replication/minute";

/// URI under which [`replication_source`] serves the fixture extract.
pub const EXTRACT_URI: &str = "memory://extracts/simple.osm.pbf";

/// First increment: deletes nodes 0 and 1, creates node 4 and reroutes way 1
/// over nodes 2, 3 and 4.
pub const FIRST_INCREMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osmChange version="0.6" generator="fixture">
  <delete>
    <node id="1" version="2" timestamp="2021-01-01T00:00:00Z"/>
    <node id="0" version="2" timestamp="2021-01-01T00:00:00Z"/>
  </delete>
  <create>
    <node id="4" version="1" timestamp="2021-01-01T00:00:30Z" lat="1.5" lon="3.5"/>
  </create>
  <modify>
    <way id="1" version="2" timestamp="2021-01-01T00:00:30Z">
      <nd ref="2"/>
      <nd ref="3"/>
      <nd ref="4"/>
      <tag k="highway" v="residential"/>
    </way>
  </modify>
</osmChange>
"#;

/// Second increment: no changes.
pub const EMPTY_INCREMENT: &str = r#"<osmChange version="0.6" generator="fixture"/>"#;

/// State published beside the first increment.
pub const FIRST_STATE: &str = "#Fri Jan 01 00:01:00 UTC 2021\nsequenceNumber=1\ntimestamp=2021-01-01T00\\:01\\:00Z\n";

/// Directory containing the encoded fixture blobs.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Decoded bytes of a Base64-encoded `.osm.pbf` fixture.
pub fn fixture_bytes(dir: &Path, stem: &str) -> Vec<u8> {
    let encoded_path = dir.join(format!("{stem}.osm.pbf.b64"));
    let encoded = fs::read_to_string(&encoded_path).unwrap_or_else(|err| {
        panic!("failed to read base64 fixture {encoded_path:?}: {err}");
    });
    let cleaned: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .unwrap_or_else(|err| {
            panic!("failed to decode base64 fixture {encoded_path:?}: {err}");
        })
}

/// Decode a Base64-encoded fixture into a temporary `.osm.pbf` file.
pub fn decode_fixture(dir: &Path, stem: &str) -> TempPath {
    let decoded = fixture_bytes(dir, stem);
    let mut tempfile = Builder::new()
        .prefix(stem)
        .suffix(".osm.pbf")
        .tempfile()
        .unwrap_or_else(|err| {
            panic!("failed to create temporary fixture for {stem}: {err}");
        });
    tempfile.write_all(&decoded).unwrap_or_else(|err| {
        panic!("failed to write decoded fixture for {stem}: {err}");
    });
    tempfile.into_temp_path()
}

/// Gzip `text` the way replication feeds publish change files.
pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .expect("compress change file");
    encoder.finish().expect("finish gzip stream")
}

fn uri(text: &str) -> Url {
    Url::parse(text).unwrap_or_else(|err| panic!("invalid fixture uri {text}: {err}"))
}

/// Memory source serving the extract, two increments and the first state.
pub fn replication_source() -> MemoryBlobSource {
    let mut source = MemoryBlobSource::default();
    source.insert(uri(EXTRACT_URI), fixture_bytes(&fixtures_dir(), "simple"));
    source.insert(
        uri(&format!("{REPLICATION_URL}/000/000/001.osc.gz")),
        gzip(FIRST_INCREMENT),
    );
    source.insert(
        uri(&format!("{REPLICATION_URL}/000/000/001.state.txt")),
        FIRST_STATE.as_bytes().to_vec(),
    );
    source.insert(
        uri(&format!("{REPLICATION_URL}/000/000/002.osc.gz")),
        gzip(EMPTY_INCREMENT),
    );
    source
}

/// Extract URI as a parsed [`Url`].
pub fn extract_uri() -> Url {
    uri(EXTRACT_URI)
}

/// Baseline header pointing at [`REPLICATION_URL`].
pub fn baseline_header() -> Header {
    let timestamp = Utc
        .with_ymd_and_hms(2021, 1, 1, 0, 0, 0)
        .single()
        .expect("valid baseline timestamp");
    Header::new(0, timestamp, REPLICATION_URL)
}

/// Drive `future` on a current-thread runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build Tokio runtime")
        .block_on(future)
}
