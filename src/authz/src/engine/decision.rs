//! Permission decisions and their evaluation trace

use crate::types::{ActionResourceId, GroupId, PermissionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Denied,

    /// The resource could not be interpreted; the host's default applies
    Indeterminate,
}

impl Decision {
    /// Determinate decision from a boolean
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Decision::Allowed
        } else {
            Decision::Denied
        }
    }

    /// Collapse to a boolean, using `default` for [`Decision::Indeterminate`]
    pub fn allowed_or(self, default: bool) -> bool {
        match self {
            Decision::Allowed => true,
            Decision::Denied => false,
            Decision::Indeterminate => default,
        }
    }

    pub fn is_allowed(self) -> bool {
        self == Decision::Allowed
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Decision::Allowed => "allowed",
            Decision::Denied => "denied",
            Decision::Indeterminate => "indeterminate",
        };
        f.write_str(label)
    }
}

/// Why the engine reached its decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionReason {
    /// Actor is the root account
    Superuser,

    /// A stored grant matched
    Grant { permission_id: PermissionId },

    /// No grant covers any of the resolved users or groups
    NoMatchingGrant,

    /// Resource shape not understood
    UnsupportedResource,
}

/// Full trace of one permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: DecisionReason,

    /// Users the actor resolved to, anonymous row included
    pub user_ids: Vec<UserId>,
    pub group_ids: Vec<GroupId>,
    pub action_resource_ids: Vec<ActionResourceId>,

    /// Rows created by this call
    #[serde(default)]
    pub provisioned_users: Vec<UserId>,
    #[serde(default)]
    pub provisioned_action_resources: Vec<ActionResourceId>,
}

impl Evaluation {
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }
}
