//! JSON-RPC message shapes exchanged with the engine.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) const METHOD_START: &str = "start";
pub(crate) const METHOD_LIST: &str = "list";
pub(crate) const METHOD_EXECUTE_TESTS: &str = "executeTests";

/// JSON-RPC "method not found", sent back for requests the engine initiates.
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

/// Failure of one request as seen by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("channel closed before the response arrived")]
    Closed,
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
    #[error("engine error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("response without result")]
    MissingResult,
    #[error("undecodable result: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// `start(scriptPath, reserved)`.
pub(crate) fn start_params(script: &Path) -> serde_json::Value {
    serde_json::json!([script.to_string_lossy(), ""])
}

/// `list(path, forceEvaluation)`.
pub(crate) fn list_params(path: &str, force_evaluation: bool) -> serde_json::Value {
    serde_json::json!([path, force_evaluation])
}

/// `executeTests(path, reserved)`.
pub(crate) fn execute_tests_params(path: &str) -> serde_json::Value {
    serde_json::json!([path, ""])
}

pub(crate) fn method_not_found(id: serde_json::Value, method: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("Method not found: {method}")
        }
    })
}

/// A frame received from the engine, classified.
#[derive(Debug)]
pub(crate) enum Incoming {
    Response {
        id: u64,
        body: serde_json::Value,
    },
    EngineRequest {
        id: serde_json::Value,
        method: String,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

pub(crate) fn classify(frame: &serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(serde_json::Value::as_str)
        .map(String::from);
    let is_reply = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, is_reply) {
        (Some(id), None, true) => Some(Incoming::Response {
            id: id.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id), Some(method), _) => Some(Incoming::EngineRequest {
            id: id.clone(),
            method,
        }),
        (None, Some(method), _) => Some(Incoming::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// Extract and decode the `result` member of a response, surfacing `error` members.
pub(crate) fn decode_result<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, RpcError> {
    if let Some(error) = body.get("error") {
        return Err(RpcError::Remote {
            code: error
                .get("code")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or_default(),
            message: error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    let serde_json::Value::Object(mut members) = body else {
        return Err(RpcError::MissingResult);
    };
    let result = members.remove("result").ok_or(RpcError::MissingResult)?;
    Ok(serde_json::from_value(result)?)
}
