//! Audit configuration from TOML (`[audit]` section)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAuditConfig {
    /// JSONL audit trail. Unset disables auditing.
    pub jsonl_path: Option<PathBuf>,
}
