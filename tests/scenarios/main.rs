/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end scenarios across the engine, repository, and restore
//! paths, driven through the fake resource API.

use tabshell::testing::FakeTabApi;
use tabshell::{
    CabinetRepository, Config, ContainerId, Error, HierarchyEngine, MemoryBlobStore,
    RedbBlobStore, TabApi, TabDescriptor, TabId, TabUpdate, execute_delete, plan_delete,
    restore_cabinet, validate_delete_safety,
};

fn desc(id: u64, opener: Option<u64>, order: u32, url: &str) -> TabDescriptor {
    TabDescriptor {
        id: Some(TabId(id)),
        title: format!("Tab {id}"),
        url: url.to_string(),
        favicon: None,
        opener_id: opener.map(TabId),
        active: false,
        pinned: false,
        loading: false,
        container: ContainerId(1),
        display_order: order,
    }
}

/// Capture a working tree, keep mutating it, then bring the snapshot
/// back in a fresh window and rebuild the engine from the recreated
/// tabs.
#[test]
fn capture_mutate_restore_roundtrip() {
    let mut engine = HierarchyEngine::new(&Config::default());
    engine.build_from_tabs(&[
        desc(1, None, 0, "https://docs.rs"),
        desc(2, Some(1), 1, "https://docs.rs/serde"),
        desc(3, Some(2), 2, "https://docs.rs/serde_json"),
        desc(4, None, 3, "https://github.com"),
    ]);

    let mut repo = CabinetRepository::new(MemoryBlobStore::new(), Config::default());
    let saved = repo.save("Daily", engine.state()).unwrap();
    assert_eq!(saved.metadata.tab_count, 4);

    // Live mutations after the capture must not leak into the store.
    engine.remove_tab(TabId(1));
    engine.update_tab(
        TabId(4),
        &TabUpdate {
            title: Some("changed".to_string()),
            ..TabUpdate::default()
        },
    );
    let stored = repo.get(&saved.id).unwrap();
    assert_eq!(stored.metadata.tab_count, 4);
    assert_eq!(
        stored.tabs[0].children[0].children[0].url,
        "https://docs.rs/serde_json"
    );
    assert_eq!(stored.tabs[1].title, "Tab 4");

    // Replay into an empty external window.
    let mut api = FakeTabApi::new();
    let outcome = restore_cabinet(&repo, &mut api, &saved.id, false).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.summary.successful_tabs, 4);
    assert!(outcome.errors.is_empty());

    // The engine rebuilds from the freshly created tabs: same shape,
    // new ids.
    let mut restored_engine = HierarchyEngine::new(&Config::default());
    restored_engine.build_from_tabs(&api.list().unwrap());
    assert_eq!(restored_engine.state().len(), 4);
    assert_eq!(restored_engine.state().roots().len(), 2);
    assert!(restored_engine.validate().is_valid);

    let root = restored_engine.state().roots()[0];
    let root_node = restored_engine.state().get(root).unwrap();
    assert_eq!(root_node.url, "https://docs.rs");
    assert_eq!(root_node.children.len(), 1);
    let child = restored_engine.state().get(root_node.children[0]).unwrap();
    assert_eq!(child.url, "https://docs.rs/serde");
    assert_eq!(child.level, 1);
    // Fresh ids, not the captured ones.
    assert!(!restored_engine.state().contains(TabId(1)));
}

/// Restricted URLs are counted as failures with everything else
/// restored around them.
#[test]
fn restricted_urls_fail_without_aborting() {
    let mut engine = HierarchyEngine::new(&Config::default());
    engine.build_from_tabs(&[
        desc(1, None, 0, "https://a.com"),
        desc(2, Some(1), 1, "chrome://settings"),
        desc(3, Some(1), 2, "https://b.com"),
    ]);

    let mut repo = CabinetRepository::new(MemoryBlobStore::new(), Config::default());
    let saved = repo.save("Mixed", engine.state()).unwrap();

    let mut api = FakeTabApi::new();
    let outcome = restore_cabinet(&repo, &mut api, &saved.id, false).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.failed_urls, vec!["chrome://settings"]);
    assert_eq!(outcome.restricted_count, 1);
    assert_eq!(outcome.summary.total_tabs, 3);
    assert_eq!(outcome.summary.successful_tabs, 2);
    assert_eq!(outcome.summary.failed_tabs, 1);
}

/// The delete executor removes descendants before their parents at
/// the external API.
#[test]
fn cascading_delete_runs_deepest_first() {
    let tabs = [
        desc(1, None, 0, "https://root.com"),
        desc(4, Some(1), 1, "https://a.com"),
        desc(5, Some(1), 2, "https://b.com"),
        desc(6, Some(4), 3, "https://c.com"),
    ];
    let config = Config {
        delete_warn_count: 3,
        ..Config::default()
    };
    let mut engine = HierarchyEngine::new(&config);
    engine.build_from_tabs(&tabs);
    let mut api = FakeTabApi::new();
    api.seed(&tabs);

    let plan = plan_delete(engine.state(), TabId(1));
    assert_eq!(plan, vec![TabId(6), TabId(4), TabId(5), TabId(1)]);

    let safety = validate_delete_safety(&engine, TabId(1), config.delete_warn_count);
    assert!(safety.can_delete);
    assert!(safety.warnings.iter().any(|w| w.contains("4 tabs")));

    let outcome = execute_delete(&mut engine, &mut api, TabId(1));
    assert!(outcome.success);
    assert_eq!(api.removed, vec![TabId(6), TabId(4), TabId(5), TabId(1)]);
    assert!(engine.state().is_empty());
    assert!(engine.validate().is_valid);
}

/// Saving "Work" twice under a different case is rejected.
#[test]
fn duplicate_cabinet_names_differ_only_by_case() {
    let mut engine = HierarchyEngine::new(&Config::default());
    engine.build_from_tabs(&[desc(1, None, 0, "https://a.com")]);

    let mut repo = CabinetRepository::new(MemoryBlobStore::new(), Config::default());
    repo.save("Work", engine.state()).unwrap();

    match repo.save("work", engine.state()) {
        Err(Error::Validation(message)) => assert!(message.contains("already exists")),
        other => panic!("expected duplicate-name rejection, got {other:?}"),
    }
    assert_eq!(repo.list().unwrap().len(), 1);
}

/// A failed save against a full store leaves the collection intact.
#[test]
fn quota_exhaustion_preserves_previous_state() {
    let mut engine = HierarchyEngine::new(&Config::default());
    engine.build_from_tabs(&[desc(1, None, 0, "https://a.com")]);

    let mut repo = CabinetRepository::new(MemoryBlobStore::with_quota(600), Config::default());
    let first = repo.save("One", engine.state()).unwrap();

    // Grow the tree until the next save no longer fits.
    engine.build_from_tabs(
        &(1..=40u64)
            .map(|i| desc(i, None, i as u32, &format!("https://example.com/page/{i}")))
            .collect::<Vec<_>>(),
    );
    match repo.save("Two", engine.state()) {
        Err(Error::QuotaExceeded { used, quota }) => assert!(used > quota),
        other => panic!("expected quota exhaustion, got {other:?}"),
    }

    let names: Vec<String> = repo.list().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["One"]);
    assert_eq!(repo.get(&first.id).unwrap().metadata.tab_count, 1);
}

/// Cabinets written through the redb backend survive a process
/// restart.
#[test]
fn redb_backed_cabinets_survive_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("cabinets.redb");

    let mut engine = HierarchyEngine::new(&Config::default());
    engine.build_from_tabs(&[
        desc(1, None, 0, "https://a.com"),
        desc(2, Some(1), 1, "https://a.com/child"),
    ]);

    let saved_id = {
        let store = RedbBlobStore::open(&path, 1024 * 1024).unwrap();
        let mut repo = CabinetRepository::new(store, Config::default());
        repo.save("Persistent", engine.state()).unwrap().id
    };

    let store = RedbBlobStore::open(&path, 1024 * 1024).unwrap();
    let repo = CabinetRepository::new(store, Config::default());
    let loaded = repo.get(&saved_id).unwrap();
    assert_eq!(loaded.name, "Persistent");
    assert_eq!(loaded.metadata.tab_count, 2);
    assert_eq!(loaded.tabs[0].children[0].url, "https://a.com/child");

    // And it restores from disk like any other Cabinet.
    let mut api = FakeTabApi::new();
    let outcome = restore_cabinet(&repo, &mut api, &saved_id, false).unwrap();
    assert_eq!(outcome.summary.successful_tabs, 2);
}
