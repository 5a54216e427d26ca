//! JSON-RPC 2.0 framing over stdio, one message per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method is not a registered tool.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Request line was not valid JSON-RPC.
pub const INVALID_REQUEST: i64 = -32600;
/// Request line was not valid JSON at all.
pub const PARSE_ERROR: i64 = -32700;

/// Incoming request.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Protocol-level error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Outgoing response: exactly one of `result`/`error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
            }),
        }
    }
}

/// Parse one request line. Distinguishes unparseable JSON from a JSON value
/// that is not a valid request, for the right error code.
pub fn parse_request(line: &str) -> Result<Request, RpcError> {
    let value: Value = serde_json::from_str(line).map_err(|e| RpcError {
        code: PARSE_ERROR,
        message: format!("parse error: {}", e),
    })?;
    serde_json::from_value(value).map_err(|e| RpcError {
        code: INVALID_REQUEST,
        message: format!("invalid request: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_request() {
        let request = parse_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"list_users","params":{"access_token":"t"}}"#,
        )
        .unwrap();
        assert_eq!(request.method, "list_users");
        assert_eq!(request.id, serde_json::json!(1));
        assert_eq!(request.params["access_token"], "t");
    }

    #[test]
    fn test_parse_error_codes() {
        assert_eq!(parse_request("{not json").unwrap_err().code, PARSE_ERROR);
        assert_eq!(
            parse_request(r#"{"jsonrpc":"2.0"}"#).unwrap_err().code,
            INVALID_REQUEST
        );
    }

    #[test]
    fn test_response_shapes() {
        let ok = Response::result(serde_json::json!(1), serde_json::json!({"total": 0}));
        let raw = serde_json::to_string(&ok).unwrap();
        assert!(raw.contains("\"result\""));
        assert!(!raw.contains("\"error\""));

        let err = Response::error(serde_json::json!(2), METHOD_NOT_FOUND, "no such tool");
        let raw = serde_json::to_string(&err).unwrap();
        assert!(raw.contains("-32601"));
        assert!(!raw.contains("\"result\""));
    }
}
