//! One engine process bound to one script.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tokio::sync::mpsc;

use fcs_types::{EngineSettings, RootId, SessionMode};

use crate::channel::{ChannelAddress, ChannelListener};
use crate::connection::{ConnectionTimeouts, EngineConnection};
use crate::gateway::RpcGateway;
use crate::launcher::Launcher;
use crate::process::ChildGuard;
use crate::types::{SessionEvent, SessionStatus};

/// Owns exactly one engine process and its connection.
///
/// Callers only ever observe a session that is fully torn down or fully
/// started; `Connecting` exists only while [`ProcessSession::open`] runs.
pub struct ProcessSession {
    root: RootId,
    script: PathBuf,
    mode: SessionMode,
    status: SessionStatus,
    engine: Option<EngineConnection>,
    events: mpsc::Sender<SessionEvent>,
}

impl ProcessSession {
    #[must_use]
    pub fn new(
        root: RootId,
        script: impl Into<PathBuf>,
        mode: SessionMode,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            root,
            script: script.into(),
            mode,
            status: SessionStatus::Disconnected,
            engine: None,
            events,
        }
    }

    #[must_use]
    pub fn root(&self) -> RootId {
        self.root
    }

    #[must_use]
    pub fn script(&self) -> &Path {
        &self.script
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Current state, with an unexpected disconnect reported as `Disconnected`.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match (&self.status, &self.engine) {
            (SessionStatus::Started, Some(engine)) if engine.is_connected() => {
                SessionStatus::Started
            }
            (SessionStatus::Started, _) => SessionStatus::Disconnected,
            (status, _) => *status,
        }
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.status() == SessionStatus::Started
    }

    /// Engine process id while one is owned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.engine.as_ref().and_then(EngineConnection::pid)
    }

    /// Spawn the engine, wait for it to connect, and run the `start` handshake.
    ///
    /// Returns `false` with no process left behind if any step fails.
    pub async fn open<L: Launcher>(&mut self, launcher: &L, settings: &EngineSettings) -> bool {
        if self.is_started() {
            return true;
        }
        // Clears a session whose engine went away on its own.
        self.close().await;

        self.status = SessionStatus::Connecting;
        tracing::info!(
            root = %self.root,
            script = %self.script.display(),
            mode = self.mode.label(),
            "opening engine session"
        );

        let mut engine = match self.connect(launcher, settings).await {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(root = %self.root, "engine session failed to connect: {e:#}");
                self.status = SessionStatus::Disconnected;
                return false;
            }
        };

        let accepted = RpcGateway::new(&mut engine).start(&self.script).await;
        if !accepted {
            tracing::warn!(
                root = %self.root,
                script = %self.script.display(),
                "engine rejected script"
            );
            engine.shutdown().await;
            self.status = SessionStatus::Disconnected;
            return false;
        }

        self.engine = Some(engine);
        self.status = SessionStatus::Started;
        true
    }

    async fn connect<L: Launcher>(
        &self,
        launcher: &L,
        settings: &EngineSettings,
    ) -> Result<EngineConnection> {
        let address = ChannelAddress::generate();
        let listener = ChannelListener::bind(&address)
            .with_context(|| format!("binding channel {address}"))?;

        let mut child = ChildGuard::new(launcher.spawn(self.mode, &address)?);
        tracing::debug!(root = %self.root, pid = ?child.id(), %address, "engine spawned");
        child.forward_output(self.root);

        let connect_timeout = settings.connect_timeout();
        let accepted = tokio::select! {
            stream = listener.accept() => stream.context("accepting engine connection"),
            status = child.wait_exit() => Err(match status {
                Some(status) => anyhow!("engine exited before connecting ({status})"),
                None => anyhow!("engine exited before connecting"),
            }),
            () = tokio::time::sleep(connect_timeout) => {
                Err(anyhow!("engine did not connect within {connect_timeout:?}"))
            }
        };

        match accepted {
            Ok(stream) => Ok(EngineConnection::start(
                self.root,
                stream,
                child,
                self.events.clone(),
                ConnectionTimeouts {
                    request: settings.request_timeout(),
                    shutdown: settings.shutdown_timeout(),
                },
            )),
            Err(e) => {
                child.terminate(settings.shutdown_timeout()).await;
                Err(e)
            }
        }
    }

    /// Terminate the engine process tree and drop the connection.
    ///
    /// Safe to call on a session that is already closed.
    pub async fn close(&mut self) {
        if let Some(engine) = self.engine.take() {
            tracing::info!(root = %self.root, "closing engine session");
            engine.shutdown().await;
        }
        self.status = SessionStatus::Disconnected;
    }

    /// Typed request access; `None` unless the session is started.
    pub fn gateway(&mut self) -> Option<RpcGateway<'_>> {
        if !self.is_started() {
            return None;
        }
        self.engine.as_mut().map(RpcGateway::new)
    }
}
