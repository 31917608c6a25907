//! JSON-RPC message types and the `Content-Length` stream framing used
//! by the Language Server Protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::TransportError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// Frame a message for the wire: `Content-Length` header, blank line,
/// JSON body.
pub fn encode<T: Serialize>(message: &T) -> Result<String, TransportError> {
    let json = serde_json::to_string(message)
        .map_err(|e| TransportError::Protocol(format!("serialization failed: {}", e)))?;
    Ok(format!("Content-Length: {}\r\n\r\n{}", json.len(), json))
}

/// Read one framed message from the server's output stream.
pub async fn read_message<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<JsonRpcMessage, TransportError> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await.map_err(TransportError::Io)?;
        if read == 0 {
            return Err(TransportError::Closed);
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length: ") {
            content_length = Some(value.trim().parse().map_err(|e| {
                TransportError::Protocol(format!("invalid Content-Length: {}", e))
            })?);
        }
    }

    let content_length = content_length
        .ok_or_else(|| TransportError::Protocol("missing Content-Length header".to_string()))?;

    let mut content = vec![0u8; content_length];
    reader
        .read_exact(&mut content)
        .await
        .map_err(TransportError::Io)?;

    let json = String::from_utf8(content)
        .map_err(|e| TransportError::Protocol(format!("invalid UTF-8 payload: {}", e)))?;

    serde_json::from_str(&json)
        .map_err(|e| TransportError::Protocol(format!("malformed message: {}", e)))
}
