//! Structural mount errors

use thiserror::Error;

use crate::tool::ProviderError;

/// Errors from mount, unmount and routing.
///
/// Always surfaced to the caller and never retried automatically.
#[derive(Debug, Clone, Error)]
pub enum MountError {
    #[error("Invalid mount name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Mount '{0}' already exists")]
    AlreadyMounted(String),

    #[error("Mount '{0}' is pinned and cannot be unmounted")]
    Pinned(String),

    #[error("No mount serves tool '{0}'")]
    UnknownMount(String),

    #[error("Failed to open mount '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: ProviderError,
    },
}
