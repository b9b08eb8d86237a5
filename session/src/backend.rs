//! The seam between the trees and whatever answers their requests.

use std::path::{Path, PathBuf};

use fcs_types::{RootId, TestResultRecord, TreeResponse};

/// No engine session could be started for a script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not start an engine session for {}", script.display())]
pub struct SessionUnavailable {
    pub script: PathBuf,
}

impl SessionUnavailable {
    #[must_use]
    pub fn new(script: &Path) -> Self {
        Self {
            script: script.to_path_buf(),
        }
    }
}

/// Answers tree requests.
///
/// `Err` means no session could be opened; `Ok(None)` means a session was
/// available but the request itself failed.
#[allow(async_fn_in_trait)]
pub trait EngineBackend {
    /// `list(path, force)` on the interactive session owned by `root`.
    async fn list(
        &mut self,
        root: RootId,
        script: &Path,
        path: &str,
        force_evaluation: bool,
    ) -> Result<Option<TreeResponse>, SessionUnavailable>;

    /// `executeTests(path)` on a session used for this call only.
    async fn execute_tests(
        &mut self,
        root: RootId,
        script: &Path,
        path: &str,
    ) -> Result<Option<TestResultRecord>, SessionUnavailable>;

    /// Tear down whatever session `root` owns.
    async fn release(&mut self, root: RootId);

    /// Roots whose session ended on its own since the last call.
    async fn reap(&mut self) -> Vec<RootId> {
        Vec::new()
    }
}
