//! Approval rendezvous: suspend a call until an operator resolves it.
//!
//! When the policy says ASK, the gateway parks the call here under its call
//! id. An out-of-band actor (CLI prompt, UI) later calls [`approve`],
//! [`reject`] or [`deny_continue`] with that id, which wakes the parked call.
//!
//! ```text
//! gateway task                      operator
//!     │                                 │
//!     │ await_decision(c1) ──┐          │
//!     │   (suspended)        │ pending()│──▶ {c1: git_push}
//!     │                      │          │
//!     │                      └──────────│ approve(c1)
//!     ▼ Continue                        │
//! ```
//!
//! The pending map sits behind a short std mutex; the wait itself happens
//! outside the lock on a shared single-resolution future, so every waiter on
//! the same id observes the same resolution. If every waiter gives up before
//! a resolution arrives, the entry is removed and the id can be reused.
//!
//! [`approve`]: ApprovalRendezvous::approve
//! [`reject`]: ApprovalRendezvous::reject
//! [`deny_continue`]: ApprovalRendezvous::deny_continue

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{FutureExt, Shared};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use toolgate_domain::{CallId, PolicyNotification, ToolCall};
use tracing::{debug, info};

/// How an operator resolved a pending call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Run the call
    Continue { reason: Option<String> },
    /// Refuse the call and stop the agent's turn
    Abort { reason: Option<String> },
    /// Refuse the call; the agent may carry on
    DenyContinue { reason: Option<String> },
}

impl Resolution {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Resolution::Continue { reason }
            | Resolution::Abort { reason }
            | Resolution::DenyContinue { reason } => reason.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RendezvousError {
    #[error("Approval for call {0} was dropped without a resolution")]
    Closed(CallId),
}

struct PendingApproval {
    tool_call: ToolCall,
    sender: oneshot::Sender<Resolution>,
    resolution: Shared<oneshot::Receiver<Resolution>>,
    waiters: usize,
    generation: u64,
}

type PendingMap = Arc<Mutex<HashMap<CallId, PendingApproval>>>;

fn lock(map: &PendingMap) -> MutexGuard<'_, HashMap<CallId, PendingApproval>> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}

/// Per-call-id suspend/resume primitive for ASK decisions.
pub struct ApprovalRendezvous {
    pending: PendingMap,
    events: broadcast::Sender<PolicyNotification>,
    next_generation: AtomicU64,
}

impl Default for ApprovalRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalRendezvous {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Subscribe to `ApprovalsChanged` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PolicyNotification> {
        self.events.subscribe()
    }

    /// Suspend until `call_id` is resolved.
    ///
    /// A second await on an id that is already pending attaches to the
    /// existing entry and receives the same resolution.
    pub async fn await_decision(
        &self,
        call_id: &CallId,
        tool_call: &ToolCall,
    ) -> Result<Resolution, RendezvousError> {
        let (resolution, guard, created) = {
            let mut pending = lock(&self.pending);
            let mut created = false;
            let entry = pending.entry(call_id.clone()).or_insert_with(|| {
                created = true;
                let (sender, receiver) = oneshot::channel();
                PendingApproval {
                    tool_call: tool_call.clone(),
                    sender,
                    resolution: receiver.shared(),
                    waiters: 0,
                    generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
                }
            });
            entry.waiters += 1;
            let guard = WaiterGuard {
                pending: Arc::clone(&self.pending),
                events: self.events.clone(),
                call_id: call_id.clone(),
                generation: entry.generation,
            };
            (entry.resolution.clone(), guard, created)
        };

        if created {
            info!(call_id = %call_id, tool = %tool_call.name, "Call awaiting approval");
            self.notify();
        }

        let outcome = resolution.await;
        drop(guard);
        outcome.map_err(|_| RendezvousError::Closed(call_id.clone()))
    }

    /// Resolve `call_id` with Continue. Returns false if nothing was pending.
    pub fn approve(&self, call_id: &CallId, reason: Option<String>) -> bool {
        self.resolve(call_id, Resolution::Continue { reason })
    }

    /// Resolve `call_id` with Abort. Returns false if nothing was pending.
    pub fn reject(&self, call_id: &CallId, reason: Option<String>) -> bool {
        self.resolve(call_id, Resolution::Abort { reason })
    }

    /// Resolve `call_id` with DenyContinue. Returns false if nothing was pending.
    pub fn deny_continue(&self, call_id: &CallId, reason: Option<String>) -> bool {
        self.resolve(call_id, Resolution::DenyContinue { reason })
    }

    /// Pop the entry and deliver `resolution` to its waiters.
    ///
    /// Unknown or already-resolved ids are a no-op.
    pub fn resolve(&self, call_id: &CallId, resolution: Resolution) -> bool {
        let Some(entry) = lock(&self.pending).remove(call_id) else {
            debug!(call_id = %call_id, "No pending approval to resolve");
            return false;
        };
        info!(call_id = %call_id, tool = %entry.tool_call.name, resolution = ?resolution, "Approval resolved");
        let delivered = entry.sender.send(resolution).is_ok();
        self.notify();
        delivered
    }

    /// Snapshot of unresolved calls
    pub fn pending(&self) -> BTreeMap<CallId, ToolCall> {
        lock(&self.pending)
            .iter()
            .map(|(id, entry)| (id.clone(), entry.tool_call.clone()))
            .collect()
    }

    pub fn is_pending(&self, call_id: &CallId) -> bool {
        lock(&self.pending).contains_key(call_id)
    }

    /// Drop every pending entry without resolving it.
    ///
    /// Waiters observe [`RendezvousError::Closed`]. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "Dropping unresolved approvals");
            self.notify();
        }
        drained.len()
    }

    fn notify(&self) {
        let _ = self.events.send(PolicyNotification::ApprovalsChanged);
    }
}

/// Counts one waiter; the last one to leave without a resolution removes the entry.
struct WaiterGuard {
    pending: PendingMap,
    events: broadcast::Sender<PolicyNotification>,
    call_id: CallId,
    generation: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        let last = match pending.get_mut(&self.call_id) {
            Some(entry) if entry.generation == self.generation => {
                entry.waiters -= 1;
                entry.waiters == 0
            }
            _ => false,
        };
        if last {
            pending.remove(&self.call_id);
            drop(pending);
            debug!(call_id = %self.call_id, "Approval abandoned by every waiter");
            let _ = self.events.send(PolicyNotification::ApprovalsChanged);
        }
    }
}
