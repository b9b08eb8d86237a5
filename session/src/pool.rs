//! Root-to-session ownership.

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::mpsc;

use fcs_types::{EngineSettings, RootId, SessionMode, TestResultRecord, TreeResponse};

use crate::backend::{EngineBackend, SessionUnavailable};
use crate::launcher::Launcher;
use crate::session::ProcessSession;
use crate::types::{CloseReason, SessionEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const REAP_BUDGET: usize = 32;

/// Sole owner of the interactive sessions, at most one per root.
///
/// Sessions open lazily on the first request for a root and stay open until
/// the root is closed or their engine goes away. Test runs get a fresh session
/// per call that is never pooled.
pub struct SessionPool<L: Launcher> {
    launcher: L,
    settings: EngineSettings,
    sessions: HashMap<RootId, ProcessSession>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: mpsc::Receiver<SessionEvent>,
    /// Roots whose engine went away, until [`SessionPool::take_closed`].
    closed: Vec<RootId>,
}

impl<L: Launcher> SessionPool<L> {
    #[must_use]
    pub fn new(launcher: L, settings: EngineSettings) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            launcher,
            settings,
            sessions: HashMap::new(),
            event_tx,
            event_rx,
            closed: Vec::new(),
        }
    }

    #[must_use]
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub fn contains(&self, root: RootId) -> bool {
        self.sessions.contains_key(&root)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Engine pid of the session owned by `root`, if any.
    #[must_use]
    pub fn pid(&self, root: RootId) -> Option<u32> {
        self.sessions.get(&root).and_then(ProcessSession::pid)
    }

    /// The started session for `root`, opening one if needed.
    ///
    /// A session whose engine went away is closed and replaced.
    pub async fn session(&mut self, root: RootId, script: &Path) -> Option<&mut ProcessSession> {
        if self.sessions.get(&root).is_some_and(|s| !s.is_started()) {
            self.close(root).await;
        }

        if !self.sessions.contains_key(&root) {
            let mut session = ProcessSession::new(
                root,
                script,
                SessionMode::Interactive,
                self.event_tx.clone(),
            );
            if !session.open(&self.launcher, &self.settings).await {
                return None;
            }
            self.sessions.insert(root, session);
        }

        self.sessions.get_mut(&root)
    }

    /// Close and forget the session owned by `root`. No-op if there is none.
    pub async fn close(&mut self, root: RootId) {
        if let Some(mut session) = self.sessions.remove(&root) {
            session.close().await;
        }
    }

    pub async fn close_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close().await;
        }
    }

    /// Process up to `budget` pending session events. Returns how many were handled.
    pub async fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event).await;
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        count
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Closed { root, reason } => {
                match &reason {
                    CloseReason::Exited => tracing::info!(root = %root, "engine exited"),
                    CloseReason::Failed(msg) => {
                        tracing::warn!(root = %root, error = %msg, "engine connection failed");
                    }
                }
                // Ids are only unique per tree, so confirm the pooled session
                // is the one that died before dropping it.
                if self.sessions.get(&root).is_some_and(|s| !s.is_started()) {
                    self.close(root).await;
                    self.closed.push(root);
                }
            }
        }
    }

    /// Drain the roots whose sessions were dropped after their engine went away.
    pub fn take_closed(&mut self) -> Vec<RootId> {
        std::mem::take(&mut self.closed)
    }

    #[cfg(test)]
    pub(crate) fn event_tx(&self) -> &mpsc::Sender<SessionEvent> {
        &self.event_tx
    }
}

impl<L: Launcher> EngineBackend for SessionPool<L> {
    async fn list(
        &mut self,
        root: RootId,
        script: &Path,
        path: &str,
        force_evaluation: bool,
    ) -> Result<Option<TreeResponse>, SessionUnavailable> {
        let Some(session) = self.session(root, script).await else {
            return Err(SessionUnavailable::new(script));
        };
        let response = match session.gateway() {
            Some(mut gateway) => gateway.list(path, force_evaluation).await,
            None => None,
        };
        if response.is_none() && !session.is_started() {
            self.close(root).await;
        }
        Ok(response)
    }

    async fn execute_tests(
        &mut self,
        root: RootId,
        script: &Path,
        path: &str,
    ) -> Result<Option<TestResultRecord>, SessionUnavailable> {
        let mut session = ProcessSession::new(
            root,
            script,
            SessionMode::Test,
            self.event_tx.clone(),
        );
        if !session.open(&self.launcher, &self.settings).await {
            return Err(SessionUnavailable::new(script));
        }
        let record = match session.gateway() {
            Some(mut gateway) => gateway.execute_tests(path).await,
            None => None,
        };
        session.close().await;
        Ok(record)
    }

    async fn release(&mut self, root: RootId) {
        self.close(root).await;
    }

    async fn reap(&mut self) -> Vec<RootId> {
        self.poll_events(REAP_BUDGET).await;
        self.take_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::bail;
    use tokio::process::Child;

    use super::*;
    use crate::channel::ChannelAddress;

    struct FailingLauncher;

    impl Launcher for FailingLauncher {
        fn spawn(&self, _mode: SessionMode, _address: &ChannelAddress) -> anyhow::Result<Child> {
            bail!("no engine here")
        }
    }

    fn test_pool() -> SessionPool<FailingLauncher> {
        SessionPool::new(FailingLauncher, EngineSettings::new("engine").unwrap())
    }

    #[tokio::test]
    async fn failed_open_leaves_no_session() {
        let mut pool = test_pool();
        let root = RootId::new(1);
        assert!(pool.session(root, Path::new("/w/foo.fcs")).await.is_none());
        assert!(!pool.contains(root));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn list_reports_unavailable_session() {
        let mut pool = test_pool();
        let script = PathBuf::from("/w/foo.fcs");
        let err = pool
            .list(RootId::new(1), &script, "", false)
            .await
            .unwrap_err();
        assert_eq!(err, SessionUnavailable::new(&script));
    }

    #[tokio::test]
    async fn execute_tests_reports_unavailable_session() {
        let mut pool = test_pool();
        let result = pool
            .execute_tests(RootId::new(1), Path::new("/w/t.fcs"), "Suite")
            .await;
        assert!(result.is_err());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn close_unknown_root_is_noop() {
        let mut pool = test_pool();
        pool.close(RootId::new(9)).await;
        pool.close_all().await;
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn poll_events_respects_budget() {
        let mut pool = test_pool();
        for i in 0..5 {
            pool.event_tx()
                .send(SessionEvent::Closed {
                    root: RootId::new(i),
                    reason: CloseReason::Exited,
                })
                .await
                .unwrap();
        }

        assert_eq!(pool.poll_events(3).await, 3);
        assert_eq!(pool.poll_events(10).await, 2);
        assert_eq!(pool.poll_events(10).await, 0);
        // None of those roots had a pooled session.
        assert!(pool.take_closed().is_empty());
    }
}
