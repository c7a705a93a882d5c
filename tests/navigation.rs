//! Navigator commands: symbol cache, jump decisions, history and the save hook.

mod common;

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use common::FakeRunner;
use gtags_nav::{
    GtagsError, Location, Navigation, Navigator, RunOptions, SaveOutcome, SearchKind,
    SessionRegistry, Settings, TagStore,
};

fn project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("GTAGS"), b"").expect("marker");
    fs::write(dir.path().join("main.c"), b"int main(void) { return 0; }\n").expect("source");
    dir
}

fn fake_store(root: &Path, runner: FakeRunner) -> TagStore<FakeRunner> {
    TagStore::with_runner(root, Vec::new(), runner)
}

fn caching_navigator() -> Navigator {
    Navigator::new(
        Settings {
            cache_search_results: true,
            ..Settings::default()
        },
        SessionRegistry::new(),
    )
}

// =====================================================
// Symbol listing cache
// =====================================================

#[test]
fn test_show_symbols_uses_cache() {
    let dir = project();
    let nav = caching_navigator();
    let store = fake_store(
        dir.path(),
        FakeRunner::with_version("6.6.10").respond("global -c", "ListNodeT\nLSQ_HandleT\n"),
    );

    let first = nav.show_symbols(&store).unwrap();
    let second = nav.show_symbols(&store).unwrap();

    assert_eq!(first, vec!["ListNodeT", "LSQ_HandleT"]);
    assert_eq!(first, second);
    assert_eq!(store.runner().count("global"), 1);
}

#[test]
fn test_show_symbols_without_cache() {
    let dir = project();
    let nav = Navigator::new(Settings::default(), SessionRegistry::new());
    let store = fake_store(dir.path(), FakeRunner::new().respond("global -c", "a\n"));

    nav.show_symbols(&store).unwrap();
    nav.show_symbols(&store).unwrap();
    assert_eq!(store.runner().count("global"), 2);
}

#[test]
fn test_update_invalidates_cache() {
    let dir = project();
    let nav = caching_navigator();
    let store = fake_store(
        dir.path(),
        FakeRunner::with_version("6.6.10").respond("global -c", "a\nb\n"),
    );

    nav.show_symbols(&store).unwrap();
    let outcome = nav.update_in(&store, &dir.path().join("main.c")).unwrap();
    assert!(matches!(outcome, SaveOutcome::Updated { .. }));
    nav.show_symbols(&store).unwrap();

    let listings = store
        .runner()
        .commands()
        .into_iter()
        .filter(|c| c == "global -c")
        .count();
    assert_eq!(listings, 2);
}

#[test]
fn test_rebuild_invalidates_cache() {
    let dir = project();
    let nav = caching_navigator();
    let store = fake_store(dir.path(), FakeRunner::new().respond("global -c", "a\n"));

    nav.show_symbols(&store).unwrap();
    assert!(nav.rebuild(&store, RunOptions::default()).unwrap().success);
    nav.show_symbols(&store).unwrap();
    assert_eq!(store.runner().count("global"), 2);
}

// =====================================================
// Search and jump history
// =====================================================

#[test]
fn test_search_jump_and_back() {
    let dir = project();
    let nav = Navigator::new(Settings::default(), SessionRegistry::new());
    let header = dir.path().join("linear_sequence.h");
    let runner = FakeRunner::with_version("6.6.10").respond(
        "global --result grep -a ",
        &format!("{}:11:typedef void* LSQ_HandleT;\n", header.display()),
    );
    let store = fake_store(dir.path(), runner);

    let origin_file = dir.path().join("main.c");
    let origin = Location::new(origin_file.to_string_lossy(), 1, 5);
    let navigation = nav
        .search(&store, "LSQ_HandleT", SearchKind::Definition, Some(&origin))
        .unwrap();

    assert_eq!(
        navigation,
        Navigation::Jump {
            target: Location::new(header.to_string_lossy(), 11, 1)
        }
    );

    let back = nav.jump_back(&origin_file).unwrap();
    assert_eq!(back, origin);
    assert!(matches!(
        nav.jump_back(&origin_file),
        Err(GtagsError::EmptyHistory)
    ));
}

#[test]
fn test_search_not_found() {
    let dir = project();
    let nav = Navigator::new(Settings::default(), SessionRegistry::new());
    let store = fake_store(dir.path(), FakeRunner::with_version("6.6.10"));

    let navigation = nav
        .search(&store, "missing", SearchKind::Definition, None)
        .unwrap();
    assert_eq!(
        navigation,
        Navigation::NotFound {
            message: "The symbol \"missing\" was not found".to_string()
        }
    );
}

#[test]
fn test_search_multiple_matches() {
    let dir = project();
    let nav = Navigator::new(Settings::default(), SessionRegistry::new());
    let runner = FakeRunner::with_version("6.6.10").respond(
        "global --result grep -ar ",
        "/src/a.c:3:use(x);\n/src/b.c:7:use(y);\n",
    );
    let store = fake_store(dir.path(), runner);
    let origin = Location::new("/src/c.c", 1, 1);

    let navigation = nav
        .search(&store, "use", SearchKind::Reference, Some(&origin))
        .unwrap();
    let Navigation::Choose { choices } = navigation else {
        panic!("expected choices");
    };
    assert_eq!(choices.len(), 2);
    assert_eq!(choices[1].location, "/src/b.c:7");

    // Nothing is recorded until the user picks.
    assert_eq!(nav.registry().jump_depth(&store.root().to_string_lossy()), 0);
    nav.select(store.root(), Some(&origin), &choices[1]);
    assert_eq!(nav.registry().jump_depth(&store.root().to_string_lossy()), 1);
}

// =====================================================
// Save hook
// =====================================================

#[test]
fn test_update_unsupported_version() {
    let dir = project();
    let nav = Navigator::new(Settings::default(), SessionRegistry::new());
    let store = fake_store(dir.path(), FakeRunner::with_version("5.7.1"));

    let outcome = nav.update_in(&store, &dir.path().join("main.c")).unwrap();
    match outcome {
        SaveOutcome::Unsupported {
            installed,
            required,
        } => {
            assert_eq!(installed.unwrap().as_str(), "5.7.1");
            assert_eq!(required, "5.7.6");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(store.runner().count("gtags"), 0);
}

#[test]
fn test_update_failure_is_reported() {
    let dir = project();
    let nav = Navigator::new(Settings::default(), SessionRegistry::new());
    let store = fake_store(
        dir.path(),
        FakeRunner::with_version("6.6.10").fail("gtags --single-update", "broken\n", 1),
    );

    let outcome = nav.update_in(&store, &dir.path().join("main.c")).unwrap();
    assert!(matches!(outcome, SaveOutcome::Failed { ref stderr, .. } if stderr == "broken\n"));
}

#[test]
fn test_on_save_outside_any_root() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("loose.c");
    fs::write(&file, b"int x;\n").unwrap();

    // Only meaningful when no ancestor of the temp dir is a tag root.
    if gtags_nav::find_root(&file).is_none() {
        let nav = Navigator::new(Settings::default(), SessionRegistry::new());
        assert_eq!(nav.on_save(&file).unwrap(), SaveOutcome::NoRoot);
    }
}
