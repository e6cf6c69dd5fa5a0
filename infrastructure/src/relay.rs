//! Change notification relay
//!
//! Every mount gets its own [`BackendObserver`] from
//! [`NotificationRelay::observer_for`]. Events are tagged with the mount name
//! and republished on a single broadcast channel.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use toolgate_domain::{BackendNotification, BackendObserver, ListKind, MountName};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

/// Collects backend change notifications and fans them out.
pub struct NotificationRelay {
    pending: Mutex<BTreeSet<(MountName, ListKind)>>,
    events: broadcast::Sender<BackendNotification>,
}

impl NotificationRelay {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            pending: Mutex::new(BTreeSet::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackendNotification> {
        self.events.subscribe()
    }

    /// Observer that attributes every event to `name`.
    pub fn observer_for(self: &Arc<Self>, name: &MountName) -> Arc<dyn BackendObserver> {
        Arc::new(MountObserver {
            name: name.clone(),
            relay: Arc::clone(self),
        })
    }

    /// Drains the set of lists reported as changed since the last call.
    pub fn pop_list_changes(&self) -> Vec<(MountName, ListKind)> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *pending).into_iter().collect()
    }

    /// Drops pending changes for a mount that went away.
    pub fn forget(&self, name: &MountName) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(n, _)| n != name);
    }

    fn list_changed(&self, name: &MountName, kind: ListKind) {
        debug!(mount = %name, %kind, "List changed");
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((name.clone(), kind));
        let _ = self.events.send(BackendNotification::ListChanged {
            name: name.clone(),
            kind,
        });
    }

    fn resource_updated(&self, name: &MountName, uri: &str) {
        debug!(mount = %name, uri, "Resource updated");
        let _ = self.events.send(BackendNotification::ResourceUpdated {
            name: name.clone(),
            uri: uri.to_string(),
        });
    }
}

impl Default for NotificationRelay {
    fn default() -> Self {
        Self::new()
    }
}

struct MountObserver {
    name: MountName,
    relay: Arc<NotificationRelay>,
}

impl BackendObserver for MountObserver {
    fn on_list_changed(&self, kind: ListKind) {
        self.relay.list_changed(&self.name, kind);
    }

    fn on_resource_updated(&self, uri: &str) {
        self.relay.resource_updated(&self.name, uri);
    }
}
