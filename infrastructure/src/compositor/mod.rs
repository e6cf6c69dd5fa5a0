//! Compositor: the mount registry and aggregated tool surface
//!
//! The [`Compositor`] holds named backend mounts and exposes every backend
//! tool as `{mount}_{tool}`. It implements [`ToolSurface`], so the policy
//! gateway forwards allowed calls straight into it.
//!
//! # Locking
//!
//! - `mount`, `unmount`, `reconcile`, `mount_all` and `close` serialize on an
//!   async operation lock.
//! - The entry map sits behind a `std::sync::RwLock` that is only held for
//!   map access, never across `.await`. Enumeration and routing copy what
//!   they need out of it.
//!
//! # Lifecycle
//!
//! ```text
//! mount ──► Initializing ──open ok──► Running ──unmount──► (gone)
//!                 │
//!                 └──open failed──► (gone), MountError::Open
//! ```

pub mod factory;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, broadcast};
use toolgate_application::ToolSurface;
use toolgate_domain::tool::value_objects::METHOD_NOT_FOUND;
use toolgate_domain::{
    Handshake, MountCapabilities, MountError, MountEvent, MountName, MountStatus, ServerSpec,
    ToolCall, ToolDefinition, ToolError, ToolProvider, ToolResult,
};
use tracing::{debug, info, warn};

pub use factory::{ProviderFactory, StdioProviderFactory};

use crate::relay::NotificationRelay;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum MountSource {
    Spec(ServerSpec),
    InProcess,
}

struct MountEntry {
    source: MountSource,
    provider: Arc<dyn ToolProvider>,
    /// `None` while the provider is still opening
    handshake: Option<Handshake>,
    pinned: bool,
}

/// Outcome of [`Compositor::reconcile`].
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub mounted: Vec<MountName>,
    pub unmounted: Vec<MountName>,
    pub remounted: Vec<MountName>,
    /// Per-name failures; the raw name is kept since it may be invalid
    pub errors: Vec<(String, MountError)>,
}

impl ReconcileReport {
    /// True when reconcile changed nothing.
    pub fn is_noop(&self) -> bool {
        self.mounted.is_empty() && self.unmounted.is_empty() && self.remounted.is_empty()
    }
}

/// Mount registry plus `{mount}_{tool}` routing.
pub struct Compositor {
    factory: Arc<dyn ProviderFactory>,
    relay: Arc<NotificationRelay>,
    entries: RwLock<BTreeMap<MountName, Arc<MountEntry>>>,
    op_lock: Mutex<()>,
    events: broadcast::Sender<MountEvent>,
}

impl Compositor {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            factory,
            relay: Arc::new(NotificationRelay::new()),
            entries: RwLock::new(BTreeMap::new()),
            op_lock: Mutex::new(()),
            events,
        }
    }

    pub fn with_relay(mut self, relay: Arc<NotificationRelay>) -> Self {
        self.relay = relay;
        self
    }

    pub fn relay(&self) -> &Arc<NotificationRelay> {
        &self.relay
    }

    /// Subscribe to mount lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<MountEvent> {
        self.events.subscribe()
    }

    // ==================== Structural operations ====================

    /// Mount a backend described by `spec` under `name`.
    pub async fn mount(&self, name: &str, spec: ServerSpec) -> Result<Handshake, MountError> {
        let name = MountName::new(name)?;
        let _guard = self.op_lock.lock().await;
        self.attach_spec(name, spec).await
    }

    /// Mount an already constructed provider.
    ///
    /// Pinned mounts survive `reconcile` and `close` and refuse `unmount`.
    pub async fn mount_in_process(
        &self,
        name: &str,
        provider: Arc<dyn ToolProvider>,
        pinned: bool,
    ) -> Result<Handshake, MountError> {
        let name = MountName::new(name)?;
        let _guard = self.op_lock.lock().await;
        self.attach(name, MountSource::InProcess, provider, pinned)
            .await
    }

    /// Unmount `name`. Unknown names are a no-op.
    pub async fn unmount(&self, name: &str) -> Result<(), MountError> {
        let Ok(name) = MountName::new(name) else {
            return Ok(());
        };
        let _guard = self.op_lock.lock().await;

        let pinned = self.read_entries().get(&name).map(|e| e.pinned);
        match pinned {
            None => {
                debug!(mount = %name, "Unmount of unknown mount ignored");
                Ok(())
            }
            Some(true) => Err(MountError::Pinned(name.to_string())),
            Some(false) => {
                self.detach(&name).await;
                Ok(())
            }
        }
    }

    /// Converge the mount set to `desired`.
    ///
    /// Non-pinned mounts absent from `desired` are unmounted, missing ones
    /// mounted and changed specs re-mounted. Equal specs are left alone.
    pub async fn reconcile(&self, desired: &BTreeMap<String, ServerSpec>) -> ReconcileReport {
        let _guard = self.op_lock.lock().await;
        let mut report = ReconcileReport::default();
        let wanted = Self::parse_names(desired, &mut report.errors);

        let current: BTreeMap<MountName, Arc<MountEntry>> = self
            .read_entries()
            .iter()
            .map(|(n, e)| (n.clone(), Arc::clone(e)))
            .collect();

        for (name, entry) in &current {
            if !entry.pinned && !wanted.contains_key(name) {
                self.detach(name).await;
                report.unmounted.push(name.clone());
            }
        }

        let mut to_attach = Vec::new();
        for (name, spec) in wanted {
            let Some(entry) = current.get(&name) else {
                to_attach.push((name, spec, false));
                continue;
            };
            let unchanged =
                matches!(&entry.source, MountSource::Spec(s) if s.canonical() == spec.canonical());
            if unchanged {
                continue;
            }
            if entry.pinned {
                report
                    .errors
                    .push((name.to_string(), MountError::Pinned(name.to_string())));
                continue;
            }
            self.detach(&name).await;
            to_attach.push((name, spec, true));
        }

        let results = join_all(to_attach.into_iter().map(|(name, spec, remount)| async move {
            let result = self.attach_spec(name.clone(), spec).await;
            (name, remount, result)
        }))
        .await;

        for (name, remount, result) in results {
            match result {
                Ok(_) if remount => report.remounted.push(name),
                Ok(_) => report.mounted.push(name),
                Err(e) => report.errors.push((name.to_string(), e)),
            }
        }

        info!(
            mounted = report.mounted.len(),
            unmounted = report.unmounted.len(),
            remounted = report.remounted.len(),
            errors = report.errors.len(),
            "Reconciled mounts"
        );
        report
    }

    /// Mount several specs concurrently, collecting per-name errors.
    ///
    /// Unlike [`reconcile`](Self::reconcile) this never unmounts anything.
    pub async fn mount_all(
        &self,
        specs: &BTreeMap<String, ServerSpec>,
    ) -> Vec<(String, MountError)> {
        let _guard = self.op_lock.lock().await;
        let mut errors = Vec::new();
        let wanted = Self::parse_names(specs, &mut errors);

        let results = join_all(wanted.into_iter().map(|(name, spec)| async move {
            let result = self.attach_spec(name.clone(), spec).await;
            (name, result)
        }))
        .await;

        errors.extend(
            results
                .into_iter()
                .filter_map(|(name, result)| result.err().map(|e| (name.to_string(), e))),
        );
        errors
    }

    /// Unmount every non-pinned mount.
    pub async fn close(&self) {
        let _guard = self.op_lock.lock().await;
        let names: Vec<MountName> = self
            .read_entries()
            .iter()
            .filter(|(_, e)| !e.pinned)
            .map(|(n, _)| n.clone())
            .collect();
        for name in names {
            self.detach(&name).await;
        }
    }

    // ==================== Queries ====================

    pub fn mount_names(&self) -> Vec<MountName> {
        self.read_entries().keys().cloned().collect()
    }

    /// Specs of the spec-backed mounts.
    pub fn mount_specs(&self) -> BTreeMap<MountName, ServerSpec> {
        self.read_entries()
            .iter()
            .filter_map(|(name, entry)| match &entry.source {
                MountSource::Spec(spec) => Some((name.clone(), spec.clone())),
                MountSource::InProcess => None,
            })
            .collect()
    }

    /// Enumerate every mount's status and tools.
    ///
    /// One `list_tools` runs per reachable mount, all concurrently. A failing
    /// mount is reported as `Failed` without affecting the others.
    pub async fn list_capabilities(&self) -> Vec<MountCapabilities> {
        let snapshot: Vec<(MountName, Arc<MountEntry>)> = self
            .read_entries()
            .iter()
            .map(|(n, e)| (n.clone(), Arc::clone(e)))
            .collect();

        let listings = snapshot.into_iter().map(|(name, entry)| async move {
            let status = match &entry.handshake {
                None => MountStatus::Initializing,
                Some(_) if !entry.provider.is_connected() => MountStatus::Failed {
                    error: "backend is not connected".into(),
                },
                Some(handshake) => match entry.provider.list_tools().await {
                    Ok(tools) => MountStatus::Running {
                        handshake: handshake.clone(),
                        tools: tools.iter().map(|t| t.namespaced(name.as_str())).collect(),
                    },
                    Err(e) => {
                        warn!(mount = %name, "Capability enumeration failed: {}", e);
                        MountStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                },
            };
            MountCapabilities {
                name,
                pinned: entry.pinned,
                status,
            }
        });

        join_all(listings).await
    }

    /// All tools of the running mounts, with exposed names.
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        self.list_capabilities()
            .await
            .into_iter()
            .flat_map(|caps| caps.tools().to_vec())
            .collect()
    }

    // ==================== Internals ====================

    fn read_entries(&self) -> RwLockReadGuard<'_, BTreeMap<MountName, Arc<MountEntry>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, BTreeMap<MountName, Arc<MountEntry>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn parse_names(
        specs: &BTreeMap<String, ServerSpec>,
        errors: &mut Vec<(String, MountError)>,
    ) -> BTreeMap<MountName, ServerSpec> {
        let mut wanted = BTreeMap::new();
        for (raw, spec) in specs {
            match MountName::new(raw.as_str()) {
                Ok(name) => {
                    wanted.insert(name, spec.clone());
                }
                Err(e) => errors.push((raw.clone(), e)),
            }
        }
        wanted
    }

    async fn attach_spec(&self, name: MountName, spec: ServerSpec) -> Result<Handshake, MountError> {
        if self.read_entries().contains_key(&name) {
            return Err(MountError::AlreadyMounted(name.to_string()));
        }
        let provider = self.factory.create(&name, &spec);
        self.attach(name, MountSource::Spec(spec), provider, false)
            .await
    }

    /// Register, open and publish a mount. Caller holds the operation lock.
    async fn attach(
        &self,
        name: MountName,
        source: MountSource,
        provider: Arc<dyn ToolProvider>,
        pinned: bool,
    ) -> Result<Handshake, MountError> {
        {
            let mut entries = self.write_entries();
            if entries.contains_key(&name) {
                return Err(MountError::AlreadyMounted(name.to_string()));
            }
            entries.insert(
                name.clone(),
                Arc::new(MountEntry {
                    source: source.clone(),
                    provider: Arc::clone(&provider),
                    handshake: None,
                    pinned,
                }),
            );
        }

        let mut guard = OpeningGuard {
            compositor: self,
            name: name.clone(),
            provider: Arc::clone(&provider),
            armed: true,
        };

        match provider.open(self.relay.observer_for(&name)).await {
            Ok(handshake) => {
                guard.armed = false;
                self.write_entries().insert(
                    name.clone(),
                    Arc::new(MountEntry {
                        source,
                        provider,
                        handshake: Some(handshake.clone()),
                        pinned,
                    }),
                );
                info!(mount = %name, server = %handshake.server_name, pinned, "Mounted");
                let _ = self.events.send(MountEvent::State {
                    name: name.clone(),
                    handshake: handshake.clone(),
                });
                let _ = self.events.send(MountEvent::Mounted { name });
                Ok(handshake)
            }
            Err(e) => {
                guard.armed = false;
                self.write_entries().remove(&name);
                provider.close().await;
                self.relay.forget(&name);
                warn!(mount = %name, "Mount failed: {}", e);
                Err(MountError::Open {
                    name: name.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Remove and close a mount. Caller holds the operation lock.
    async fn detach(&self, name: &MountName) -> bool {
        let removed = self.write_entries().remove(name);
        let Some(entry) = removed else {
            return false;
        };
        self.relay.forget(name);
        entry.provider.close().await;
        info!(mount = %name, "Unmounted");
        let _ = self.events.send(MountEvent::Unmounted { name: name.clone() });
        true
    }

    /// Longest mounted prefix wins, so `git_hub_x` prefers `git_hub` over `git`.
    fn route(&self, exposed: &str) -> Option<(MountName, Arc<dyn ToolProvider>, String)> {
        self.read_entries()
            .iter()
            .filter_map(|(name, entry)| {
                name.strip_tool_prefix(exposed)
                    .map(|local| (name, entry, local))
            })
            .max_by_key(|(name, _, _)| name.as_str().len())
            .map(|(name, entry, local)| {
                (
                    name.clone(),
                    Arc::clone(&entry.provider),
                    local.to_string(),
                )
            })
    }
}

/// Undoes a half-finished `attach` when its future is dropped mid-open.
struct OpeningGuard<'a> {
    compositor: &'a Compositor,
    name: MountName,
    provider: Arc<dyn ToolProvider>,
    armed: bool,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut entries = self.compositor.write_entries();
            let ours = entries
                .get(&self.name)
                .is_some_and(|e| e.handshake.is_none() && Arc::ptr_eq(&e.provider, &self.provider));
            if ours {
                entries.remove(&self.name);
            }
        }
        self.compositor.relay.forget(&self.name);
        warn!(mount = %self.name, "Mount cancelled while opening");

        let provider = Arc::clone(&self.provider);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { provider.close().await });
        }
    }
}

#[async_trait]
impl ToolSurface for Compositor {
    async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let Some((mount, provider, local)) = self.route(&call.name) else {
            debug!(tool = %call.name, "No mount matches");
            let error = MountError::UnknownMount(call.name.clone());
            return Err(ToolError::new(METHOD_NOT_FOUND, error.to_string()));
        };

        debug!(mount = %mount, tool = %local, "Routing call");
        provider
            .call_tool(&call.renamed(local))
            .await
            .map_err(|e| e.to_tool_error())
    }
}
