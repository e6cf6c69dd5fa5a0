//! Tool value objects: structured errors and call results
//!
//! [`ToolError`] follows the JSON-RPC error object shape (`code`, `message`,
//! optional `data`) so gateway errors and backend errors are carried the same
//! way from a backend all the way back to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// JSON-RPC "invalid params" code
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC "method not found" code
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC "internal error" code
pub const INTERNAL_ERROR: i64 = -32603;

/// Structured error returned by a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn not_found(tool: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Unknown tool: {}", tool.into()))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Result of a tool call (`tools/call` result shape).
///
/// A backend may report a failure either by returning a JSON-RPC error or by
/// returning a result with `is_error` set; the latter lands here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Content blocks (`{"type": "text", "text": ...}` and friends)
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result with a single text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({"type": "text", "text": text.into()})],
            structured_content: None,
            is_error: false,
        }
    }

    /// Error result with a single text block
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }

    pub fn is_success(&self) -> bool {
        !self.is_error
    }

    /// Concatenated text of all text blocks
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Error object embedded in an error result, if the backend supplied one
    /// as structured content.
    pub fn embedded_error(&self) -> Option<ToolError> {
        if !self.is_error {
            return None;
        }
        let structured = self.structured_content.as_ref()?;
        let candidate = structured.get("error").unwrap_or(structured);
        serde_json::from_value(candidate.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display() {
        let error = ToolError::not_found("git_push");
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert_eq!(error.to_string(), "[-32601] Unknown tool: git_push");
    }

    #[test]
    fn test_tool_error_serialization_skips_empty_data() {
        let error = ToolError::internal("boom");
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value, json!({"code": -32603, "message": "boom"}));
    }

    #[test]
    fn test_tool_result_text() {
        let result = ToolResult::text("hello");
        assert!(result.is_success());
        assert_eq!(result.text_content(), "hello");
        assert!(result.embedded_error().is_none());
    }

    #[test]
    fn test_tool_result_embedded_error() {
        let result = ToolResult::error_text("denied").with_structured(json!({
            "error": {"code": -32951, "message": "policy_denied_continue"}
        }));

        assert!(!result.is_success());
        let error = result.embedded_error().unwrap();
        assert_eq!(error.code, -32951);
        assert_eq!(error.message, "policy_denied_continue");
    }

    #[test]
    fn test_tool_result_deserialize_wire_shape() {
        let result: ToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}],
            "isError": true
        }))
        .unwrap();

        assert!(result.is_error);
        assert_eq!(result.text_content(), "a\nb");
    }
}
