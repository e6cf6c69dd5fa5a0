//! Reserved error taxonomy
//!
//! Only the policy gateway may produce these codes and messages. Each one is
//! stamped with [`STAMP_KEY`] in its `data` object so it can still be
//! recognised after an intermediate layer re-wraps it.
//!
//! | Kind | Code | Message |
//! |------|------|---------|
//! | [`ReservedError::DenyAbort`] | -32950 | `policy_denied` |
//! | [`ReservedError::DenyContinue`] | -32951 | `policy_denied_continue` |
//! | [`ReservedError::ReservedMisuse`] | -32952 | `policy_backend_reserved_misuse` |
//! | [`ReservedError::EvaluatorError`] | -32953 | `policy_evaluator_error` |

use serde_json::{Map, Value};

use crate::tool::ToolError;

/// Key placed in `error.data` marking a gateway-originated error
pub const STAMP_KEY: &str = "toolgate_policy_gateway";

/// Errors reserved for the policy gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedError {
    DenyAbort,
    DenyContinue,
    ReservedMisuse,
    EvaluatorError,
}

impl ReservedError {
    pub const ALL: [ReservedError; 4] = [
        ReservedError::DenyAbort,
        ReservedError::DenyContinue,
        ReservedError::ReservedMisuse,
        ReservedError::EvaluatorError,
    ];

    pub fn code(&self) -> i64 {
        match self {
            ReservedError::DenyAbort => -32950,
            ReservedError::DenyContinue => -32951,
            ReservedError::ReservedMisuse => -32952,
            ReservedError::EvaluatorError => -32953,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReservedError::DenyAbort => "policy_denied",
            ReservedError::DenyContinue => "policy_denied_continue",
            ReservedError::ReservedMisuse => "policy_backend_reserved_misuse",
            ReservedError::EvaluatorError => "policy_evaluator_error",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn from_message(message: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.message() == message)
    }

    /// Finds a reserved message inside free text.
    ///
    /// Longer messages are tried first: `policy_denied` is a prefix of
    /// `policy_denied_continue`.
    pub fn find_in_text(text: &str) -> Option<Self> {
        let mut kinds = Self::ALL;
        kinds.sort_by_key(|kind| std::cmp::Reverse(kind.message().len()));
        kinds.into_iter().find(|kind| text.contains(kind.message()))
    }

    /// Builds the stamped error object for this kind.
    pub fn to_tool_error(&self, mut data: Map<String, Value>) -> ToolError {
        data.insert(STAMP_KEY.to_string(), Value::Bool(true));
        ToolError::new(self.code(), self.message()).with_data(Value::Object(data))
    }
}

/// Whether an error object carries the gateway stamp
pub fn is_stamped(error: &ToolError) -> bool {
    error
        .data
        .as_ref()
        .and_then(|data| data.get(STAMP_KEY))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Classifies an error that came back from a backend.
///
/// Checked in order: the stamp, an exact code or message match, then the
/// reserved message text anywhere in the message. A stamped error whose code
/// and message were rewritten is reported as [`ReservedError::ReservedMisuse`].
pub fn detect(error: &ToolError) -> Option<ReservedError> {
    let by_shape = ReservedError::from_code(error.code)
        .or_else(|| ReservedError::from_message(&error.message));
    if is_stamped(error) {
        return Some(
            by_shape
                .or_else(|| ReservedError::find_in_text(&error.message))
                .unwrap_or(ReservedError::ReservedMisuse),
        );
    }
    by_shape.or_else(|| ReservedError::find_in_text(&error.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_codes_and_messages_are_distinct() {
        for a in ReservedError::ALL {
            for b in ReservedError::ALL {
                if a != b {
                    assert_ne!(a.code(), b.code());
                    assert_ne!(a.message(), b.message());
                }
            }
            assert_eq!(ReservedError::from_code(a.code()), Some(a));
            assert_eq!(ReservedError::from_message(a.message()), Some(a));
        }
    }

    #[test]
    fn test_to_tool_error_is_stamped() {
        let mut data = Map::new();
        data.insert("reason".into(), json!("destructive"));
        let error = ReservedError::DenyAbort.to_tool_error(data);

        assert_eq!(error.code, -32950);
        assert_eq!(error.message, "policy_denied");
        assert!(is_stamped(&error));
        assert_eq!(error.data.as_ref().unwrap()["reason"], "destructive");
    }

    #[test]
    fn test_detect_exact_message_with_foreign_code() {
        let error = ToolError::new(-32000, "policy_denied_continue");
        assert_eq!(detect(&error), Some(ReservedError::DenyContinue));
    }

    #[test]
    fn test_detect_code_only() {
        let error = ToolError::new(-32950, "nope");
        assert_eq!(detect(&error), Some(ReservedError::DenyAbort));
    }

    #[test]
    fn test_detect_message_text_fallback() {
        let error = ToolError::new(-32000, "upstream said: policy_denied_continue (retry later)");
        assert_eq!(detect(&error), Some(ReservedError::DenyContinue));

        let error = ToolError::new(-32000, "wrapped: policy_denied");
        assert_eq!(detect(&error), Some(ReservedError::DenyAbort));
    }

    #[test]
    fn test_detect_stamp_survives_rewrap() {
        let error = ToolError::new(-32603, "internal error")
            .with_data(json!({ STAMP_KEY: true, "inner": "whatever" }));
        assert_eq!(detect(&error), Some(ReservedError::ReservedMisuse));
    }

    #[test]
    fn test_detect_ordinary_error() {
        let error = ToolError::new(-32602, "missing argument 'path'");
        assert_eq!(detect(&error), None);

        let falsely_stamped = ToolError::new(-32602, "x").with_data(json!({ STAMP_KEY: false }));
        assert_eq!(detect(&falsely_stamped), None);
    }
}
