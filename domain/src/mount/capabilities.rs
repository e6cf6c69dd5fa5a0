//! Capability snapshot returned by enumeration

use serde::{Deserialize, Serialize};

use super::name::MountName;
use crate::tool::{Handshake, ToolDefinition};

/// State of one mount in a capability listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MountStatus {
    /// Handshake not cached yet
    Initializing,
    /// Reachable; `tools` carry their exposed `{mount}_{tool}` names
    Running {
        handshake: Handshake,
        tools: Vec<ToolDefinition>,
    },
    Failed { error: String },
}

impl MountStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, MountStatus::Running { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MountStatus::Initializing => "initializing",
            MountStatus::Running { .. } => "running",
            MountStatus::Failed { .. } => "failed",
        }
    }
}

/// One entry of a capability listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountCapabilities {
    pub name: MountName,
    pub pinned: bool,
    #[serde(flatten)]
    pub status: MountStatus,
}

impl MountCapabilities {
    pub fn tools(&self) -> &[ToolDefinition] {
        match &self.status {
            MountStatus::Running { tools, .. } => tools,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serialization() {
        let caps = MountCapabilities {
            name: MountName::new("git").unwrap(),
            pinned: false,
            status: MountStatus::Failed {
                error: "connection reset".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&caps).unwrap(),
            json!({"name": "git", "pinned": false, "state": "failed", "error": "connection reset"})
        );
        assert!(caps.tools().is_empty());
        assert_eq!(caps.status.label(), "failed");
    }

    #[test]
    fn test_running_tools() {
        let status = MountStatus::Running {
            handshake: Handshake::new("git-server"),
            tools: vec![ToolDefinition::new("git_status")],
        };
        assert!(status.is_running());
    }
}
