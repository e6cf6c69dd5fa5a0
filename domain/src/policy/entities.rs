//! Policy and proposal entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The active authorization policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy program text, opaque to the gateway
    pub source: String,
    /// Monotonic version assigned by the record store
    pub version: u64,
}

impl Policy {
    pub fn new(source: impl Into<String>, version: u64) -> Self {
        Self {
            source: source.into(),
            version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Withdrawn => "withdrawn",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed policy change awaiting operator review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub status: ProposalStatus,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(id: impl Into<String>, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: ProposalStatus::Pending,
            content: content.into(),
            created_at,
            decided_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    /// Moves a pending proposal to `status`. Returns false if it was not pending.
    pub fn decide(&mut self, status: ProposalStatus, at: DateTime<Utc>) -> bool {
        if !self.is_pending() || status == ProposalStatus::Pending {
            return false;
        }
        self.status = status;
        self.decided_at = Some(at);
        true
    }
}
