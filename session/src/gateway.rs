//! Typed requests over a started engine connection.

use std::path::Path;

use serde::de::DeserializeOwned;

use fcs_types::{TestResultRecord, TreeResponse};

use crate::connection::EngineConnection;
use crate::protocol::{self, RpcError};

/// Typed façade over one session's connection.
///
/// Holding the connection mutably means a second request cannot be issued
/// until the first has resolved. Failures are logged with the method name and
/// reported as `None`: callers treat that as "nothing changed", never as an
/// empty result.
pub struct RpcGateway<'a> {
    engine: &'a mut EngineConnection,
}

impl<'a> RpcGateway<'a> {
    pub(crate) fn new(engine: &'a mut EngineConnection) -> Self {
        Self { engine }
    }

    /// Handshake: load `script` into the engine. Returns whether it was accepted.
    pub async fn start(&mut self, script: &Path) -> bool {
        self.call::<bool>(protocol::METHOD_START, protocol::start_params(script))
            .await
            .unwrap_or(false)
    }

    /// Children and/or value of the expression at `path` (`""` is the script root).
    pub async fn list(&mut self, path: &str, force_evaluation: bool) -> Option<TreeResponse> {
        self.call(
            protocol::METHOD_LIST,
            protocol::list_params(path, force_evaluation),
        )
        .await
    }

    /// Run the test or test group at `path`.
    pub async fn execute_tests(&mut self, path: &str) -> Option<TestResultRecord> {
        self.call(
            protocol::METHOD_EXECUTE_TESTS,
            protocol::execute_tests_params(path),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(
        &mut self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Option<T> {
        match self.try_call(method, params).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(method, "engine request failed: {e}");
                None
            }
        }
    }

    async fn try_call<T: DeserializeOwned>(
        &mut self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let body = self.engine.request(method, params).await?;
        protocol::decode_result(body)
    }
}
