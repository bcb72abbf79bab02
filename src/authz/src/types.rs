//! Core permission types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Row id of a user
pub type UserId = i64;

/// Row id of a group
pub type GroupId = i64;

/// Row id of an action-resource
pub type ActionResourceId = i64;

/// Row id of a permission grant
pub type PermissionId = i64;

/// Reserved superuser row id
pub const SUPERUSER_ID: UserId = 1;

/// Reserved anonymous ("everyone") row id
pub const ANONYMOUS_ID: UserId = 2;

/// Reserved "Auto-added users" group id
pub const AUTO_ADDED_GROUP_ID: GroupId = 1;

/// Name of the reserved auto-added group
pub const AUTO_ADDED_GROUP_NAME: &str = "Auto-added users";

/// Lookup expression that identifies the superuser
pub const SUPERUSER_LOOKUP: &str = "actor.id";

/// Sentinel value of [`SUPERUSER_LOOKUP`] that bypasses every grant
pub const SUPERUSER_VALUE: &str = "root";

/// Lookup expression of the anonymous row (always paired with a NULL value)
pub const ANONYMOUS_LOOKUP: &str = "actor";

/// A stored user: an attribute-path lookup and the value it must produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub description: Option<String>,
    pub lookup: String,
    /// `None` only for the anonymous row
    pub value: Option<String>,
}

impl User {
    /// True for the reserved superuser and anonymous rows
    pub fn is_reserved(&self) -> bool {
        self.id == SUPERUSER_ID || self.id == ANONYMOUS_ID
    }
}

/// Natural key of a user row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey {
    pub lookup: String,
    pub value: Option<String>,
}

impl UserKey {
    pub fn new(lookup: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            lookup: lookup.into(),
            value: Some(value.into()),
        }
    }

    /// Key of the anonymous row
    pub fn anonymous() -> Self {
        Self {
            lookup: ANONYMOUS_LOOKUP.to_string(),
            value: None,
        }
    }
}

/// A named group of users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

/// Membership of a user in a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupMembership {
    pub group_id: GroupId,
    pub user_id: UserId,
}

/// A grant target: an action, optionally narrowed to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActionResource {
    pub id: ActionResourceId,
    pub action: String,
    pub resource_primary: Option<String>,
    pub resource_secondary: Option<String>,
}

impl ActionResource {
    pub fn key(&self) -> ActionResourceKey {
        ActionResourceKey {
            action: self.action.clone(),
            primary: self.resource_primary.clone(),
            secondary: self.resource_secondary.clone(),
        }
    }
}

/// Natural key of an action-resource row. `None` is distinct from `Some("")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionResourceKey {
    pub action: String,
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

impl ActionResourceKey {
    /// The unqualified `(action, NULL, NULL)` target
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            primary: None,
            secondary: None,
        }
    }

    /// `(action, primary, NULL)`
    pub fn primary(action: impl Into<String>, primary: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            primary: Some(primary.into()),
            secondary: None,
        }
    }

    /// `(action, primary, secondary)`
    pub fn qualified(
        action: impl Into<String>,
        primary: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            primary: Some(primary.into()),
            secondary: Some(secondary.into()),
        }
    }

    /// Key for the most specific row a resource maps to
    pub fn for_resource(action: impl Into<String>, resource: &Resource) -> Self {
        match resource {
            Resource::NoResource => Self::action(action),
            Resource::Primary(p) => Self::primary(action, p.clone()),
            Resource::PrimarySecondary(p, s) => Self::qualified(action, p.clone(), s.clone()),
        }
    }
}

impl fmt::Display for ActionResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(p) = &self.primary {
            write!(f, " on {}", p)?;
        }
        if let Some(s) = &self.secondary {
            write!(f, "/{}", s)?;
        }
        Ok(())
    }
}

/// Who a grant is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "id")]
pub enum Subject {
    User(UserId),
    Group(GroupId),
}

/// A stored permission grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: PermissionId,
    pub actions_resources_id: ActionResourceId,
    pub user_id: Option<UserId>,
    pub group_id: Option<GroupId>,
}

impl Permission {
    /// The grant's subject; `None` when neither column is set (a grant nobody can satisfy)
    pub fn subject(&self) -> Option<Subject> {
        match (self.user_id, self.group_id) {
            (Some(user), _) => Some(Subject::User(user)),
            (None, Some(group)) => Some(Subject::Group(group)),
            (None, None) => None,
        }
    }
}

/// Resource a permission check is about
///
/// At most two levels deep: a primary resource (e.g. a database) and a
/// secondary one inside it (e.g. a table).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resource {
    #[default]
    NoResource,
    Primary(String),
    PrimarySecondary(String, String),
}

impl Resource {
    pub fn primary(primary: impl Into<String>) -> Self {
        Resource::Primary(primary.into())
    }

    pub fn pair(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Resource::PrimarySecondary(primary.into(), secondary.into())
    }

    /// Interpret an untyped resource as supplied by a host.
    ///
    /// Empty values (`null`, `""`, `[]`, `{}`) mean no resource, a string is a
    /// primary resource and a two element array of strings is a
    /// primary/secondary pair (`[p, null]` collapses to `Primary(p)`).
    /// Any other shape returns `None`: the engine has no opinion on it.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Resource::NoResource),
            Value::String(s) if s.is_empty() => Some(Resource::NoResource),
            Value::String(s) => Some(Resource::Primary(s.clone())),
            Value::Array(items) if items.is_empty() => Some(Resource::NoResource),
            Value::Object(map) if map.is_empty() => Some(Resource::NoResource),
            Value::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
                (Value::String(p), Value::String(s)) => {
                    Some(Resource::PrimarySecondary(p.clone(), s.clone()))
                }
                (Value::String(p), Value::Null) => Some(Resource::Primary(p.clone())),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::NoResource => write!(f, "-"),
            Resource::Primary(p) => write!(f, "{}", p),
            Resource::PrimarySecondary(p, s) => write!(f, "{}/{}", p, s),
        }
    }
}
