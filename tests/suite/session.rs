//! Session lifecycle against a real child process and a scripted engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use fcs_session::{EngineBackend, SessionPool, SessionStatus};
use fcs_types::{RootId, SessionMode};

use crate::common::{FakeEngine, StubLauncher, engine_script, eventually, test_settings};

struct Fixture {
    _dir: TempDir,
    script: PathBuf,
    pool: SessionPool<StubLauncher>,
}

fn fixture(engine: FakeEngine) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let binary = engine_script(dir.path());
    let script = dir.path().join("foo.fcs");
    std::fs::write(&script, "box = Box(1, 2, 3)\n").unwrap();
    let pool = SessionPool::new(StubLauncher::new(&binary, engine), test_settings(&binary));
    Fixture {
        _dir: dir,
        script,
        pool,
    }
}

fn launcher_of(pool: &SessionPool<StubLauncher>) -> &StubLauncher {
    pool.launcher()
}

const ROOT: RootId = RootId::new(1);

#[tokio::test]
async fn handshake_sends_script_path() {
    let mut fx = fixture(FakeEngine::new());
    let session = fx.pool.session(ROOT, &fx.script).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Started);
    assert_eq!(session.mode(), SessionMode::Interactive);

    let engine = launcher_of(&fx.pool).engine();
    let requests = engine.requests();
    assert_eq!(requests[0].0, "start");
    assert_eq!(
        requests[0].1,
        json!([fx.script.to_string_lossy(), ""])
    );
    fx.pool.close_all().await;
}

#[tokio::test]
async fn one_session_per_root() {
    let engine = FakeEngine::new()
        .list("", json!({ "kind": "root-file", "items": [{ "name": "a" }] }))
        .list("a", json!({ "kind": "value", "value": "1" }));
    let mut fx = fixture(engine);

    fx.pool.list(ROOT, &fx.script, "", false).await.unwrap().unwrap();
    let pid = fx.pool.pid(ROOT).unwrap();
    fx.pool.list(ROOT, &fx.script, "a", false).await.unwrap().unwrap();

    assert_eq!(fx.pool.pid(ROOT), Some(pid));
    assert_eq!(launcher_of(&fx.pool).spawned(), vec![SessionMode::Interactive]);

    // A different root gets its own engine.
    let other = RootId::new(2);
    fx.pool.list(other, &fx.script, "", false).await.unwrap();
    assert_eq!(fx.pool.len(), 2);
    assert_ne!(fx.pool.pid(other), Some(pid));
    fx.pool.close_all().await;
}

#[tokio::test]
async fn close_is_idempotent_and_kills_the_engine() {
    let mut fx = fixture(FakeEngine::new());
    let session = fx.pool.session(ROOT, &fx.script).await.unwrap();
    let pid = session.pid().unwrap();

    session.close().await;
    assert_eq!(session.status(), SessionStatus::Disconnected);
    session.close().await;
    assert_eq!(session.pid(), None);

    fx.pool.close(ROOT).await;
    fx.pool.close(ROOT).await;
    assert!(fx.pool.is_empty());

    #[cfg(target_os = "linux")]
    assert!(!crate::common::process_alive(pid));
    let _ = pid;
}

#[tokio::test]
async fn rejected_handshake_opens_nothing() {
    let mut fx = fixture(FakeEngine::new().reject_start());
    assert!(fx.pool.session(ROOT, &fx.script).await.is_none());
    assert!(fx.pool.is_empty());

    let err = fx.pool.list(ROOT, &fx.script, "", false).await.unwrap_err();
    assert_eq!(err.script, fx.script);
}

#[tokio::test]
async fn engine_that_never_connects_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let binary = engine_script(dir.path());
    let settings = test_settings(&binary)
        .with_connect_timeout(Duration::from_millis(300))
        .unwrap();
    let mut pool = SessionPool::new(
        StubLauncher::new(&binary, FakeEngine::new().silent()),
        settings,
    );

    assert!(pool.session(ROOT, Path::new("/w/foo.fcs")).await.is_none());
    assert!(pool.is_empty());
    assert_eq!(pool.launcher().spawned().len(), 1);
}

#[tokio::test]
async fn engine_requests_are_refused() {
    let mut fx = fixture(FakeEngine::new().probe_engine_request());
    fx.pool.session(ROOT, &fx.script).await.unwrap();

    let engine = launcher_of(&fx.pool).engine().clone();
    let answered = eventually(Duration::from_secs(2), || {
        engine
            .received()
            .iter()
            .any(|r| r.method.is_none() && r.frame["id"] == "probe")
    })
    .await;
    assert!(answered);

    let reply = engine
        .received()
        .into_iter()
        .find(|r| r.method.is_none())
        .unwrap();
    assert_eq!(reply.frame["error"]["code"], -32601);

    // The session keeps working after the refusal.
    assert!(fx.pool.session(ROOT, &fx.script).await.is_some());
    fx.pool.close_all().await;
}

#[tokio::test]
async fn failed_request_is_none_not_an_error() {
    let mut fx = fixture(FakeEngine::new());
    let response = fx.pool.list(ROOT, &fx.script, "missing", false).await.unwrap();
    assert_eq!(response, None);
    // A remote error does not end the session.
    assert!(fx.pool.contains(ROOT));
    fx.pool.close_all().await;
}

#[tokio::test]
async fn unexpected_disconnect_is_reaped() {
    let mut fx = fixture(FakeEngine::new().hang_up_after(1));
    let pid = fx.pool.session(ROOT, &fx.script).await.unwrap().pid();
    assert!(pid.is_some());

    let mut reaped = Vec::new();
    for _ in 0..100 {
        reaped = fx.pool.reap().await;
        if !reaped.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(reaped, vec![ROOT]);
    assert!(!fx.pool.contains(ROOT));

    #[cfg(target_os = "linux")]
    if let Some(pid) = pid {
        assert!(!crate::common::process_alive(pid));
    }
}

#[tokio::test]
async fn disconnected_session_owns_no_process() {
    let mut fx = fixture(FakeEngine::new().hang_up_after(1));
    let session = fx.pool.session(ROOT, &fx.script).await.unwrap();
    let pid = session.pid().unwrap();

    // Nothing polls the pool here; the session tears down on its own.
    assert!(eventually(Duration::from_secs(5), || !session.is_started()).await);
    assert_eq!(session.status(), SessionStatus::Disconnected);
    assert_eq!(session.pid(), None);

    #[cfg(target_os = "linux")]
    assert!(!crate::common::process_alive(pid));
    let _ = pid;
}

#[tokio::test]
async fn test_sessions_are_not_pooled() {
    let engine = FakeEngine::new().test(
        "Gear.t1",
        json!({ "name": "Gear.t1", "isOk": true }),
    );
    let mut fx = fixture(engine);

    let record = fx
        .pool
        .execute_tests(ROOT, &fx.script, "Gear.t1")
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_ok);
    fx.pool
        .execute_tests(ROOT, &fx.script, "Gear.t1")
        .await
        .unwrap();

    assert!(fx.pool.is_empty());
    assert_eq!(
        launcher_of(&fx.pool).spawned(),
        vec![SessionMode::Test, SessionMode::Test]
    );
    let requests = launcher_of(&fx.pool).engine().requests();
    assert!(requests.contains(&("executeTests".to_string(), json!(["Gear.t1", ""]))));
}
