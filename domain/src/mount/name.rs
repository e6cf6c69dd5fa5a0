//! Validated mount names

use serde::{Deserialize, Serialize};

use super::error::MountError;

/// Separator that mount names must never contain.
///
/// Tools are exposed as `{mount}_{tool}`; banning `__` inside mount names
/// keeps a mount name from swallowing part of a tool name on another mount.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Name of a mounted backend, e.g. `git` or `issue_tracker`.
///
/// Must start with a lowercase ASCII letter, continue with lowercase
/// letters, digits or `_`, not end with `_` and not contain `__`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MountName(String);

impl MountName {
    pub fn new(name: impl Into<String>) -> Result<Self, MountError> {
        let name = name.into();
        match Self::check(&name) {
            Some(reason) => Err(MountError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    fn check(name: &str) -> Option<&'static str> {
        let mut chars = name.chars();
        match chars.next() {
            None => return Some("name is empty"),
            Some(c) if !c.is_ascii_lowercase() => {
                return Some("must start with a lowercase letter");
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Some("only lowercase letters, digits and '_' are allowed");
        }
        if name.contains(NAMESPACE_SEPARATOR) {
            return Some("must not contain the namespace separator '__'");
        }
        if name.ends_with('_') {
            return Some("must not end with '_'");
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix this mount's tools carry on the aggregated surface
    pub fn tool_prefix(&self) -> String {
        format!("{}_", self.0)
    }

    /// Strips this mount's prefix from an exposed tool name.
    ///
    /// Returns the backend-local tool name, or `None` if the tool does not
    /// belong to this mount.
    pub fn strip_tool_prefix<'a>(&self, exposed: &'a str) -> Option<&'a str> {
        exposed
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|local| !local.is_empty())
    }
}

impl std::fmt::Display for MountName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MountName {
    type Error = MountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for MountName {
    type Error = MountError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MountName> for String {
    fn from(name: MountName) -> Self {
        name.0
    }
}
