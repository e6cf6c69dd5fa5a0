//! Provider construction for spec-backed mounts

use std::sync::Arc;
use std::time::Duration;

use toolgate_domain::{MountName, ServerSpec, ToolProvider};

use crate::stdio::{DEFAULT_REQUEST_TIMEOUT, StdioToolProvider};

/// Builds the provider for a [`ServerSpec`].
///
/// The compositor calls this once per mount; the provider is opened
/// afterwards.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, name: &MountName, spec: &ServerSpec) -> Arc<dyn ToolProvider>;
}

/// Factory producing [`StdioToolProvider`]s.
pub struct StdioProviderFactory {
    request_timeout: Duration,
}

impl StdioProviderFactory {
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for StdioProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for StdioProviderFactory {
    fn create(&self, name: &MountName, spec: &ServerSpec) -> Arc<dyn ToolProvider> {
        Arc::new(
            StdioToolProvider::new(name.as_str(), spec.clone())
                .with_request_timeout(self.request_timeout),
        )
    }
}
