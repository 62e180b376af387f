//! Focused unit tests covering configuration conversion for each subcommand.

use super::*;
use crate::diff::{DiffArgs, DiffConfig};
use crate::import::{ImportArgs, ImportConfig};
use crate::options::{ModeArg, extract_uri, resolve_options};
use crate::update::{UpdateArgs, UpdateConfig};
use camino::Utf8PathBuf;
use osmsync_core::{GeometryMode, SpatialReference};
use rstest::rstest;

fn import_args() -> ImportArgs {
    ImportArgs {
        store: Some(Utf8PathBuf::from("town.db")),
        extract: Some("https://download.example.org/town.osm.pbf".to_owned()),
        ..ImportArgs::default()
    }
}

#[rstest]
#[case::store(None, Some("town.osm"), ARG_STORE, ENV_IMPORT_STORE)]
#[case::extract(Some("town.db"), None, ARG_EXTRACT, ENV_IMPORT_EXTRACT)]
fn converting_import_without_required_fields_errors(
    #[case] store: Option<&str>,
    #[case] extract: Option<&str>,
    #[case] field: &'static str,
    #[case] env_var: &'static str,
) {
    let args = ImportArgs {
        store: store.map(Utf8PathBuf::from),
        extract: extract.map(str::to_owned),
        ..ImportArgs::default()
    };
    let err = ImportConfig::try_from(args).expect_err("missing field should error");
    match err {
        CliError::MissingArgument {
            field: missing,
            env,
        } => {
            assert_eq!(missing, field);
            assert_eq!(env, env_var);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn import_defaults_to_web_mercator_without_baseline() {
    let config = ImportConfig::try_from(import_args()).expect("config should build");
    assert_eq!(config.options.spatial_reference, SpatialReference::WebMercator);
    assert_eq!(config.options.geometry_mode, GeometryMode::Lenient);
    assert_eq!(config.extract.scheme(), "https");
    assert!(config.baseline.is_none());
}

#[rstest]
fn import_builds_the_baseline_header() {
    let args = ImportArgs {
        replication_url: Some("https://planet.example.org/replication/minute".to_owned()),
        sequence_number: Some(4_200),
        replication_timestamp: Some("2024-05-01T02:00:00+02:00".to_owned()),
        ..import_args()
    };
    let config = ImportConfig::try_from(args).expect("config should build");
    let header = config.baseline.expect("baseline header");
    assert_eq!(header.replication_sequence_number, 4_200);
    assert_eq!(
        header.replication_timestamp.to_rfc3339(),
        "2024-05-01T00:00:00+00:00"
    );
    assert_eq!(
        header.replication_url,
        "https://planet.example.org/replication/minute"
    );
}

#[rstest]
#[case::timestamp_without_url(None, Some("2024-05-01T00:00:00Z"), ARG_REPLICATION_URL)]
#[case::url_without_timestamp(
    Some("https://planet.example.org/replication/minute"),
    None,
    ARG_REPLICATION_TIMESTAMP
)]
fn incomplete_baselines_are_rejected(
    #[case] url: Option<&str>,
    #[case] timestamp: Option<&str>,
    #[case] field: &'static str,
) {
    let args = ImportArgs {
        replication_url: url.map(str::to_owned),
        replication_timestamp: timestamp.map(str::to_owned),
        ..import_args()
    };
    match ImportConfig::try_from(args).expect_err("incomplete baseline") {
        CliError::MissingArgument { field: missing, .. } => assert_eq!(missing, field),
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn malformed_baseline_timestamps_are_rejected() {
    let args = ImportArgs {
        replication_url: Some("https://planet.example.org/replication/minute".to_owned()),
        replication_timestamp: Some("yesterday".to_owned()),
        ..import_args()
    };
    let err = ImportConfig::try_from(args).expect_err("invalid timestamp");
    assert!(matches!(err, CliError::InvalidTimestamp { ref value, .. } if value == "yesterday"));
}

#[rstest]
#[case(None, SpatialReference::WebMercator)]
#[case(Some(3857), SpatialReference::WebMercator)]
#[case(Some(4326), SpatialReference::Wgs84)]
fn supported_srids_resolve(#[case] srid: Option<i32>, #[case] expected: SpatialReference) {
    let options = resolve_options(srid, Some(ModeArg::Strict)).expect("supported srid");
    assert_eq!(options.spatial_reference, expected);
    assert_eq!(options.geometry_mode, GeometryMode::Strict);
}

#[rstest]
fn unsupported_srids_are_rejected() {
    let err = resolve_options(Some(27_700), None).expect_err("unsupported srid");
    assert!(matches!(err, CliError::UnsupportedSrid(_)));
}

#[rstest]
#[case::file_uri("file:///srv/extracts/town.osm.pbf", "file:///srv/extracts/town.osm.pbf")]
#[case::absolute_path("/srv/extracts/town.osm.pbf", "file:///srv/extracts/town.osm.pbf")]
#[case::http("http://mirror.example.org/town.osm", "http://mirror.example.org/town.osm")]
fn extract_locations_become_uris(#[case] value: &str, #[case] expected: &str) {
    let uri = extract_uri(value).expect("valid extract location");
    assert_eq!(uri.as_str(), expected);
}

#[rstest]
fn relative_extract_paths_resolve_against_the_working_directory() {
    let uri = extract_uri("town.osm.pbf").expect("relative path");
    assert_eq!(uri.scheme(), "file");
    assert!(uri.path().ends_with("/town.osm.pbf"));
}

#[rstest]
fn update_defaults_to_a_single_increment() {
    let args = UpdateArgs {
        store: Some(Utf8PathBuf::from("town.db")),
        ..UpdateArgs::default()
    };
    let config = UpdateConfig::try_from(args).expect("config should build");
    assert_eq!(config.increments, 1);
}

#[rstest]
fn update_requires_a_store() {
    match UpdateConfig::try_from(UpdateArgs::default()).expect_err("store missing") {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_STORE);
            assert_eq!(env, ENV_UPDATE_STORE);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn update_rejects_zero_increments() {
    let args = UpdateArgs {
        store: Some(Utf8PathBuf::from("town.db")),
        increments: Some(0),
        ..UpdateArgs::default()
    };
    let err = UpdateConfig::try_from(args).expect_err("zero increments");
    assert!(matches!(err, CliError::ZeroCount { field } if field == ARG_INCREMENTS));
}

#[rstest]
fn diff_requires_a_zoom_level() {
    let args = DiffArgs {
        store: Some(Utf8PathBuf::from("town.db")),
        ..DiffArgs::default()
    };
    match DiffConfig::try_from(args).expect_err("zoom missing") {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_ZOOM);
            assert_eq!(env, ENV_DIFF_ZOOM);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
#[case::too_deep(Some(31), None)]
#[case::zero_count(Some(14), Some(0))]
fn diff_rejects_out_of_range_values(#[case] zoom: Option<u8>, #[case] count: Option<usize>) {
    let args = DiffArgs {
        store: Some(Utf8PathBuf::from("town.db")),
        zoom,
        count,
        ..DiffArgs::default()
    };
    let err = DiffConfig::try_from(args).expect_err("out of range");
    assert!(matches!(
        err,
        CliError::InvalidZoom(_) | CliError::ZeroCount { .. }
    ));
}

#[rstest]
fn diff_arguments_parse_from_the_command_line() {
    let cli = Cli::try_parse_from([
        "osmsync",
        "diff",
        "--store",
        "town.db",
        "--zoom",
        "14",
        "--count",
        "3",
        "--srid",
        "4326",
        "--geometry-mode",
        "strict",
    ])
    .expect("valid arguments");
    let Command::Diff(args) = cli.command else {
        panic!("expected the diff subcommand");
    };
    let config = DiffConfig::try_from(args).expect("config should build");
    assert_eq!((config.zoom, config.count), (14, 3));
    assert_eq!(config.options.spatial_reference, SpatialReference::Wgs84);
    assert_eq!(config.options.geometry_mode, GeometryMode::Strict);
}
