//! Tool bridge protocol types
//!
//! Bridges communicate via one JSON line each way over stdin/stdout.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ToolError;

/// A message sent to a tool bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// The operation to perform
    pub operation: String,

    /// Operation-specific parameters
    pub params: serde_json::Value,
}

impl ToolRequest {
    pub fn new(operation: impl Into<String>, params: impl Into<serde_json::Value>) -> Self {
        Self {
            operation: operation.into(),
            params: params.into(),
        }
    }
}

/// A response from a tool bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Whether the operation succeeded
    pub success: bool,

    /// Result data (if success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message (if failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    pub fn success(data: impl Into<serde_json::Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Decodes the data payload, turning a failed response into an error
    pub fn into_data<T: DeserializeOwned>(self, tool: &str) -> Result<T, ToolError> {
        if !self.success {
            return Err(ToolError::Failed {
                tool: tool.to_string(),
                message: self.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        let data = self.data.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(data).map_err(|e| ToolError::Protocol {
            tool: tool.to_string(),
            message: e.to_string(),
        })
    }
}
