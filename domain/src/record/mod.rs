//! Tool call records (the audit trail)

pub mod tool_call_record;

pub use tool_call_record::{
    ApprovalOutcome, CallId, DecisionRecord, ExecutionRecord, RecordError, RecordStatus,
    ToolCallRecord,
};
