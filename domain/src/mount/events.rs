//! Mount lifecycle events and relayed backend notifications

use serde::{Deserialize, Serialize};

use super::name::MountName;
use crate::tool::{Handshake, ListKind};

/// Mount lifecycle event.
///
/// A successful mount emits `State` (carrying the cached handshake) and then
/// `Mounted`; unmount emits `Unmounted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MountEvent {
    Mounted { name: MountName },
    Unmounted { name: MountName },
    State { name: MountName, handshake: Handshake },
}

impl MountEvent {
    pub fn name(&self) -> &MountName {
        match self {
            MountEvent::Mounted { name }
            | MountEvent::Unmounted { name }
            | MountEvent::State { name, .. } => name,
        }
    }
}

/// Backend notification tagged with the mount it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendNotification {
    ListChanged { name: MountName, kind: ListKind },
    /// `uri` is exactly what the backend sent
    ResourceUpdated { name: MountName, uri: String },
}

impl BackendNotification {
    pub fn name(&self) -> &MountName {
        match self {
            BackendNotification::ListChanged { name, .. }
            | BackendNotification::ResourceUpdated { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mount_event_serialization() {
        let event = MountEvent::Mounted {
            name: MountName::new("git").unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "mounted", "name": "git"})
        );
        assert_eq!(event.name().as_str(), "git");
    }

    #[test]
    fn test_notification_keeps_uri() {
        let note = BackendNotification::ResourceUpdated {
            name: MountName::new("fs").unwrap(),
            uri: "file:///tmp/a%20b.txt".into(),
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["uri"], "file:///tmp/a%20b.txt");
        assert_eq!(note.name().as_str(), "fs");
    }
}
