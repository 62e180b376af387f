//! Behaviour-driven step definitions driving the subcommands end to end.

use super::helpers::{Workspace, feed, text};
use super::*;
use crate::diff::{DiffConfig, run_diff_with};
use crate::import::run_import_with;
use crate::update::{UpdateConfig, run_update_with};
use osmsync_core::store::SqliteStore;
use osmsync_data::{MemoryBlobSource, ResolveOptions};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

/// Aggregates scenario state so each step only needs a single world argument.
#[derive(Debug)]
struct SyncWorld {
    workspace: Workspace,
    source: RefCell<MemoryBlobSource>,
    output: RefCell<Vec<u8>>,
    result: RefCell<Option<Result<(), CliError>>>,
}

impl SyncWorld {
    fn new() -> Self {
        Self {
            workspace: Workspace::new(),
            source: RefCell::new(MemoryBlobSource::default()),
            output: RefCell::new(Vec::new()),
            result: RefCell::new(None),
        }
    }

    fn import(&self) -> Result<(), CliError> {
        let config = self.workspace.import_config(ResolveOptions::default());
        let source = self.source.borrow();
        run_import_with(&config, &*source, &mut *self.output.borrow_mut())
    }

    fn record(&self, result: Result<(), CliError>) {
        self.result.replace(Some(result));
    }

    fn output(&self) -> String {
        text(self.output.borrow().clone())
    }

    fn sequence_number(&self) -> i64 {
        let store =
            SqliteStore::open(self.workspace.store().as_std_path()).expect("reopen store");
        store
            .headers()
            .select_latest()
            .expect("select header")
            .expect("header present")
            .replication_sequence_number
    }
}

#[fixture]
fn world() -> SyncWorld {
    SyncWorld::new()
}

#[given("a replication feed with one published increment")]
fn published_feed(#[from(world)] world: &SyncWorld) {
    world.source.replace(feed());
}

#[given("the extract has been imported")]
fn extract_imported(#[from(world)] world: &SyncWorld) {
    world.import().expect("import succeeds");
    world.output.borrow_mut().clear();
}

#[when("I import the extract with a baseline header")]
fn import_extract(#[from(world)] world: &SyncWorld) {
    let result = world.import();
    world.record(result);
}

#[when("I update the store with up to 3 increments")]
fn update_store(#[from(world)] world: &SyncWorld) {
    let config = UpdateConfig {
        store: world.workspace.store(),
        options: ResolveOptions::default(),
        increments: 3,
    };
    let source = world.source.borrow();
    let result = run_update_with(&config, &*source, &mut *world.output.borrow_mut());
    world.record(result);
}

#[when("I diff the store at zoom 0")]
fn diff_store(#[from(world)] world: &SyncWorld) {
    let config = DiffConfig {
        store: world.workspace.store(),
        options: ResolveOptions::default(),
        zoom: 0,
        count: 1,
    };
    let source = world.source.borrow();
    let result = run_diff_with(&config, &*source, &mut *world.output.borrow_mut());
    world.record(result);
}

#[then("the import summary lists two nodes and one way")]
fn import_summary(#[from(world)] world: &SyncWorld) {
    assert!(matches!(world.result.borrow().as_ref(), Some(Ok(()))));
    let output = world.output();
    assert!(
        output.starts_with("imported 2 nodes, 1 ways and 0 relations"),
        "unexpected summary: {output}"
    );
    assert!(output.contains("bounds -0.2,51,-0.1,51.1"));
}

#[then("the store header is at sequence 0")]
fn header_at_baseline(#[from(world)] world: &SyncWorld) {
    assert_eq!(world.sequence_number(), 0);
}

#[then("the store header is at sequence 1")]
fn header_advanced(#[from(world)] world: &SyncWorld) {
    assert_eq!(world.sequence_number(), 1);
}

#[then("increment 1 is reported with its state file timestamp")]
fn update_summary(#[from(world)] world: &SyncWorld) {
    assert!(matches!(world.result.borrow().as_ref(), Some(Ok(()))));
    let output = world.output();
    assert!(output.contains("applied increment 1: 1 created, 1 modified, 0 deleted"));
    assert!(output.contains("2024-05-01T00:01:00+00:00 (from state file)"));
}

#[then("the output lists tile 0/0/0")]
fn diff_output(#[from(world)] world: &SyncWorld) {
    assert!(matches!(world.result.borrow().as_ref(), Some(Ok(()))));
    assert_eq!(world.output(), "0/0/0\n");
}

#[then("the command fails because the store is missing")]
fn missing_store(#[from(world)] world: &SyncWorld) {
    let result = world.result.borrow();
    match result.as_ref() {
        Some(Err(CliError::MissingStore { path })) => {
            assert_eq!(*path, world.workspace.store());
        }
        other => panic!("expected MissingStore, found {other:?}"),
    }
}

#[scenario(path = "tests/features/sync_command.feature", index = 0)]
fn importing_records_the_baseline(world: SyncWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/sync_command.feature", index = 1)]
fn updating_applies_published_increments(world: SyncWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/sync_command.feature", index = 2)]
fn diffing_leaves_the_store_untouched(world: SyncWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/sync_command.feature", index = 3)]
fn updating_before_importing_fails(world: SyncWorld) {
    let _ = world;
}
