//! Error handling for the tool protocol.
//!
//! Maps coordinator errors to MCP-compliant JSON-RPC error codes.

use serde_json::{json, Value};
use thiserror::Error;
use weft_core::CoordError;

/// Protocol-facing errors with JSON-RPC error codes
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl McpError {
    /// JSON-RPC error code for this error
    pub fn to_error_code(&self) -> i32 {
        match self {
            McpError::NotFound(_) => -32001,
            McpError::Validation(_) => -32002,
            McpError::InvalidState(_) => -32003,
            McpError::Git(_) => -32004,
            McpError::Database(_) => -32005,
            McpError::Serialization(_) => -32006,
            McpError::Protocol(_) => -32007,
        }
    }

    /// Full JSON-RPC 2.0 error response
    pub fn to_json_rpc_error(&self, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.to_error_code(),
                "message": self.to_string()
            },
            "id": id
        })
    }
}

impl From<CoordError> for McpError {
    fn from(err: CoordError) -> Self {
        match err {
            CoordError::NotFound(msg) => McpError::NotFound(msg),
            CoordError::Validation(msg) => McpError::Validation(msg),
            CoordError::InvalidState { operation, status } => {
                McpError::InvalidState(format!("cannot {operation} while task is {status}"))
            }
            CoordError::Git(msg) => McpError::Git(msg),
            CoordError::Database(msg) => McpError::Database(msg),
            CoordError::Serialization(msg) => McpError::Serialization(msg),
            CoordError::Configuration(msg) => {
                McpError::Protocol(format!("configuration error: {msg}"))
            }
            CoordError::Internal(msg) => McpError::Protocol(format!("internal error: {msg}")),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::TaskStatus;

    #[test]
    fn test_error_codes() {
        assert_eq!(McpError::NotFound("t".into()).to_error_code(), -32001);
        assert_eq!(McpError::Validation("v".into()).to_error_code(), -32002);
        assert_eq!(McpError::InvalidState("s".into()).to_error_code(), -32003);
        assert_eq!(McpError::Git("g".into()).to_error_code(), -32004);
        assert_eq!(McpError::Database("d".into()).to_error_code(), -32005);
    }

    #[test]
    fn test_json_rpc_error_shape() {
        let error = McpError::NotFound("task 't' missing".into());
        let response = error.to_json_rpc_error(Some(json!(7)));
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["error"]["code"], -32001);
        assert_eq!(response["id"], 7);
    }

    #[test]
    fn test_coord_error_mapping() {
        let err: McpError = CoordError::invalid_state("merge_task", TaskStatus::InProgress).into();
        assert!(matches!(err, McpError::InvalidState(_)));
        assert_eq!(err.to_error_code(), -32003);

        let err: McpError = CoordError::Git("stderr text".into()).into();
        assert!(err.to_string().contains("stderr text"));
    }
}
