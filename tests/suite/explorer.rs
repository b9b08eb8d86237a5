//! Trees driven end to end through a session pool and the scripted engine.

use serde_json::json;

use fcs_explorer::{Notifier, ResultTree, Tally, TestTree, TreeEvent};
use fcs_session::SessionPool;
use fcs_types::{SessionMode, TreeCategory};

use crate::common::{FakeEngine, StubLauncher, engine_script, test_settings};

#[tokio::test]
async fn open_expand_close_foo() {
    let dir = tempfile::tempdir().unwrap();
    let binary = engine_script(dir.path());
    let script = dir.path().join("foo.fcs");
    std::fs::write(&script, "").unwrap();

    let engine = FakeEngine::new().list(
        "",
        json!({ "kind": "root-file", "items": [{ "name": "zeta" }, { "name": "alpha" }] }),
    );
    let pool = SessionPool::new(StubLauncher::new(&binary, engine.clone()), test_settings(&binary));
    let (notifier, mut rx) = Notifier::channel();
    let mut tree = ResultTree::new(pool, notifier);

    let root = tree.open(&script);
    let node = tree.node(&root).unwrap();
    assert_eq!(node.name(), "foo.fcs");
    assert_eq!(node.category(), TreeCategory::RootFile);
    assert_eq!(rx.try_recv().unwrap(), TreeEvent::RootsChanged);

    let children = tree.children(&root).await;
    let names: Vec<_> = children
        .iter()
        .map(|k| tree.node(k).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
    for child in &children {
        assert_eq!(tree.node(child).unwrap().category(), TreeCategory::Unresolved);
    }

    let lists: Vec<_> = engine
        .requests()
        .into_iter()
        .filter(|(method, _)| method == "list")
        .collect();
    assert_eq!(lists, vec![("list".to_string(), json!(["", false]))]);

    let pid = tree.backend().pid(root.root).unwrap();
    tree.close(root.root).await;
    assert!(tree.roots().is_empty());
    assert!(tree.backend().is_empty());
    #[cfg(target_os = "linux")]
    assert!(!crate::common::process_alive(pid));
    let _ = pid;
}

#[tokio::test]
async fn expanding_siblings_reuses_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let binary = engine_script(dir.path());
    let script = dir.path().join("foo.fcs");
    std::fs::write(&script, "").unwrap();

    let engine = FakeEngine::new()
        .list(
            "",
            json!({ "kind": "root-file", "items": [{ "name": "parts" }, { "name": "mass" }] }),
        )
        .list(
            "parts",
            json!({ "kind": "sequence", "items": [{ "name": "[0]" }, { "name": "[1]" }] }),
        )
        .list("mass", json!({ "kind": "value", "value": "12.5", "type": "Real" }));
    let launcher = StubLauncher::new(&binary, engine.clone());
    let (notifier, _rx) = Notifier::channel();
    let mut tree = ResultTree::new(SessionPool::new(launcher, test_settings(&binary)), notifier);

    let root = tree.open(&script);
    let children = tree.children(&root).await;
    let (mass, parts) = (&children[0], &children[1]);

    // First fetch resolves the category and redraws; the next one expands.
    assert!(tree.children(parts).await.is_empty());
    let items = tree.children(parts).await;
    let paths: Vec<_> = items.iter().map(|k| k.path.as_str()).collect();
    assert_eq!(paths, vec!["parts[0]", "parts[1]"]);

    assert!(tree.children(mass).await.is_empty());
    let item = tree.item(mass).unwrap();
    assert_eq!(item.description.as_deref(), Some("12.5 : Real"));

    assert_eq!(tree.backend().launcher().spawned(), vec![SessionMode::Interactive]);
    tree.close_all().await;
}

#[tokio::test]
async fn test_definitions_run_in_fresh_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let binary = engine_script(dir.path());
    std::fs::write(dir.path().join("gears.fcs"), "").unwrap();
    std::fs::write(
        dir.path().join("gears.tests.json"),
        r#"[{ "name": "Gears", "filePath": "gears.fcs", "tests": ["Gear.t1", "Gear.t2"] }]"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("broken.tests.json"), "[{").unwrap();

    let engine = FakeEngine::new()
        .test(
            "Gear.t1",
            json!({ "name": "Gear.t1", "isOk": false, "message": "( Result= 3 , Expected= 4 )" }),
        )
        .test(
            "Gear.t2",
            json!({ "name": "Gear.t2", "isOk": true, "items": [
                { "name": "a", "isOk": true },
                { "name": "b", "isOk": true }
            ] }),
        );
    let launcher = StubLauncher::new(&binary, engine);
    let (notifier, mut rx) = Notifier::channel();
    let mut tree = TestTree::new(SessionPool::new(launcher, test_settings(&binary)), notifier);

    assert_eq!(tree.load(dir.path(), "*.tests.json").unwrap(), 1);
    let warning = std::iter::from_fn(|| rx.try_recv().ok()).find_map(|e| match e {
        TreeEvent::Message(text) => Some(text),
        _ => None,
    });
    assert!(warning.unwrap().contains("broken.tests.json"));

    let file = tree.roots()[0];
    let definition = tree.child_ids(file)[0];
    tree.run(definition);
    assert!(tree.backend().launcher().spawned().is_empty());

    let entries = tree.children(definition).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(tree.tally(file), Tally { ok: 2, fail: 1 });
    assert_eq!(
        tree.summary(file),
        "Total evaluated tests 3, Succeeded 2, Failed 1"
    );

    let failed = tree.node(entries[0]).unwrap();
    let mismatch = failed.mismatch().unwrap();
    assert_eq!((mismatch.result.as_str(), mismatch.expectation.as_str()), ("3", "4"));

    assert_eq!(
        tree.backend().launcher().spawned(),
        vec![SessionMode::Test, SessionMode::Test]
    );
    assert!(tree.backend().is_empty());
}
