//! Shared test utilities and fixtures
//!
//! A stand-in engine for integration tests. [`StubLauncher`] spawns a real
//! child process through [`EngineLauncher`] (a shell script that just
//! sleeps), then connects an in-process [`FakeEngine`] to the session's
//! channel. The fake speaks the framed JSON-RPC protocol and answers from a
//! scripted reply table.

#![allow(dead_code)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use tokio::net::UnixStream;
use tokio::process::Child;

use fcs_session::codec::{FrameReader, FrameWriter};
use fcs_session::{ChannelAddress, EngineLauncher, Launcher};
use fcs_types::{EngineSettings, SessionMode};

/// Write an executable stand-in for the engine binary into `dir`.
pub fn engine_script(dir: &Path) -> PathBuf {
    let path = dir.join("fake-engine.sh");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 60\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Settings with timeouts short enough for tests.
pub fn test_settings(binary: &Path) -> EngineSettings {
    EngineSettings::new(binary)
        .unwrap()
        .with_connect_timeout(Duration::from_secs(5))
        .unwrap()
        .with_request_timeout(Duration::from_secs(5))
        .unwrap()
        .with_shutdown_timeout(Duration::from_secs(2))
        .unwrap()
}

/// One frame the fake engine received.
#[derive(Debug, Clone)]
pub struct Received {
    /// `None` for responses to the fake's own requests.
    pub method: Option<String>,
    pub frame: Value,
}

#[derive(Default)]
struct Replies {
    accept_start: bool,
    connect: bool,
    list: HashMap<String, Vec<Value>>,
    tests: HashMap<String, Value>,
    hang_up_after: Option<usize>,
    probe_engine_request: bool,
    received: Vec<Received>,
}

/// Scripted engine endpoint. Clones share state.
#[derive(Clone)]
pub struct FakeEngine {
    inner: Arc<Mutex<Replies>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Replies {
                accept_start: true,
                connect: true,
                ..Replies::default()
            })),
        }
    }

    /// Answer `start` with `false`.
    pub fn reject_start(self) -> Self {
        self.inner.lock().unwrap().accept_start = false;
        self
    }

    /// Never connect to the channel.
    pub fn silent(self) -> Self {
        self.inner.lock().unwrap().connect = false;
        self
    }

    /// Answer `list(path, _)` with `result`. Repeated calls queue further
    /// replies; the last one repeats.
    pub fn list(self, path: &str, result: Value) -> Self {
        self.inner
            .lock()
            .unwrap()
            .list
            .entry(path.to_string())
            .or_default()
            .push(result);
        self
    }

    pub fn test(self, path: &str, result: Value) -> Self {
        self.inner
            .lock()
            .unwrap()
            .tests
            .insert(path.to_string(), result);
        self
    }

    /// Close the channel after answering `n` requests.
    pub fn hang_up_after(self, n: usize) -> Self {
        self.inner.lock().unwrap().hang_up_after = Some(n);
        self
    }

    /// Send the client a request of its own right after connecting.
    pub fn probe_engine_request(self) -> Self {
        self.inner.lock().unwrap().probe_engine_request = true;
        self
    }

    pub fn received(&self) -> Vec<Received> {
        self.inner.lock().unwrap().received.clone()
    }

    /// `(method, params)` of every request received, in order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.received()
            .into_iter()
            .filter_map(|r| r.method.map(|m| (m, r.frame["params"].clone())))
            .collect()
    }

    fn reply(&self, method: &str, params: &Value) -> Value {
        let mut inner = self.inner.lock().unwrap();
        let arg = params[0].as_str().unwrap_or_default().to_string();
        let result = match method {
            "start" => Some(json!(inner.accept_start)),
            "list" => inner.list.get_mut(&arg).map(|queue| {
                if queue.len() > 1 {
                    queue.remove(0)
                } else {
                    queue[0].clone()
                }
            }),
            "executeTests" => inner.tests.get(&arg).cloned(),
            _ => None,
        };
        match result {
            Some(result) => json!({ "result": result }),
            None => json!({ "error": { "code": -32000, "message": format!("no reply for {method}({arg})") } }),
        }
    }

    async fn serve(self, address: ChannelAddress) -> Result<()> {
        let stream = UnixStream::connect(address.as_str()).await?;
        let (read, write) = stream.into_split();
        let mut reader = FrameReader::new(read);
        let mut writer = FrameWriter::new(write);

        if self.inner.lock().unwrap().probe_engine_request {
            writer
                .write_frame(&json!({ "jsonrpc": "2.0", "id": "probe", "method": "window/ask", "params": [] }))
                .await?;
            writer
                .write_frame(&json!({ "jsonrpc": "2.0", "method": "log", "params": ["engine ready"] }))
                .await?;
        }

        let mut answered = 0;
        while let Some(frame) = reader.read_frame().await? {
            let method = frame["method"].as_str().map(str::to_string);
            self.inner.lock().unwrap().received.push(Received {
                method: method.clone(),
                frame: frame.clone(),
            });
            let Some(method) = method else {
                continue;
            };

            let mut response = self.reply(&method, &frame["params"]);
            response["jsonrpc"] = json!("2.0");
            response["id"] = frame["id"].clone();
            writer.write_frame(&response).await?;

            answered += 1;
            if self.inner.lock().unwrap().hang_up_after == Some(answered) {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Launches the stand-in engine and connects a [`FakeEngine`] to it.
pub struct StubLauncher {
    engine: FakeEngine,
    launcher: EngineLauncher,
    spawned: Arc<Mutex<Vec<SessionMode>>>,
}

impl StubLauncher {
    pub fn new(binary: &Path, engine: FakeEngine) -> Self {
        Self {
            engine,
            launcher: EngineLauncher::new(binary),
            spawned: Arc::default(),
        }
    }

    pub fn engine(&self) -> &FakeEngine {
        &self.engine
    }

    /// Modes of every process spawned so far.
    pub fn spawned(&self) -> Vec<SessionMode> {
        self.spawned.lock().unwrap().clone()
    }
}

impl Launcher for StubLauncher {
    fn spawn(&self, mode: SessionMode, address: &ChannelAddress) -> Result<Child> {
        let child = self.launcher.spawn(mode, address)?;
        self.spawned.lock().unwrap().push(mode);
        if self.engine.inner.lock().unwrap().connect {
            let engine = self.engine.clone();
            let address = address.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.serve(address).await {
                    tracing::debug!("fake engine stopped: {e:#}");
                }
            });
        }
        Ok(child)
    }
}

/// Whether a process with `pid` still exists (reaped processes do not).
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
