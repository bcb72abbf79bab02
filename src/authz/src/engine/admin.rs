//! Operator-facing management of the permission tables

use crate::actor::ActorRegistry;
use crate::error::{PermissionError, Result};
use crate::grant::GrantStore;
use crate::group::GroupIndex;
use crate::resource::ResourceRegistry;
use crate::store::{EntityCounts, Store};
use crate::types::{
    ActionResource, ActionResourceId, ActionResourceKey, Group, GroupId, GroupMembership,
    Permission, PermissionId, Subject, User, UserId, UserKey, ANONYMOUS_ID, AUTO_ADDED_GROUP_ID,
    SUPERUSER_ID,
};
use tracing::info;

/// Administrative operations over every component
///
/// Obtained from [`super::PermissionEngine::admin`]. The superuser, the
/// anonymous user and the auto-added group cannot be deleted here.
#[derive(Clone)]
pub struct Admin {
    store: Store,
    actors: ActorRegistry,
    groups: GroupIndex,
    resources: ResourceRegistry,
    grants: GrantStore,
}

impl Admin {
    pub(crate) fn new(
        store: Store,
        actors: ActorRegistry,
        groups: GroupIndex,
        resources: ResourceRegistry,
        grants: GrantStore,
    ) -> Self {
        Self {
            store,
            actors,
            groups,
            resources,
            grants,
        }
    }

    /// Create tables and reserved rows if missing
    pub async fn init(&self) -> Result<EntityCounts> {
        self.store.ensure_schema().await?;
        self.store.counts().await
    }

    pub async fn counts(&self) -> Result<EntityCounts> {
        self.store.ensure_schema().await?;
        self.store.counts().await
    }

    // Users

    pub async fn create_user(&self, key: &UserKey, description: Option<&str>) -> Result<UserId> {
        self.store.ensure_schema().await?;
        self.actors.create_user(key, description).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store.ensure_schema().await?;
        self.actors.list_users().await
    }

    pub async fn delete_user(&self, id: UserId) -> Result<bool> {
        if id == SUPERUSER_ID || id == ANONYMOUS_ID {
            return Err(PermissionError::Reserved(format!("User {} is reserved", id)));
        }
        self.store.ensure_schema().await?;
        let deleted = self.actors.delete_user(id).await?;
        if deleted {
            info!("Deleted user {}", id);
        }
        Ok(deleted)
    }

    // Groups

    pub async fn create_group(&self, name: &str) -> Result<GroupId> {
        self.store.ensure_schema().await?;
        self.groups.create_group(name).await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.store.ensure_schema().await?;
        self.groups.list_groups().await
    }

    pub async fn delete_group(&self, id: GroupId) -> Result<bool> {
        if id == AUTO_ADDED_GROUP_ID {
            return Err(PermissionError::Reserved(format!("Group {} is reserved", id)));
        }
        self.store.ensure_schema().await?;
        let deleted = self.groups.delete_group(id).await?;
        if deleted {
            info!("Deleted group {}", id);
        }
        Ok(deleted)
    }

    pub async fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<()> {
        self.require_group(group_id).await?;
        self.require_user(user_id).await?;
        self.groups.add_member(group_id, user_id).await
    }

    pub async fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        self.store.ensure_schema().await?;
        self.groups.remove_member(group_id, user_id).await
    }

    pub async fn members_of(&self, group_id: GroupId) -> Result<Vec<UserId>> {
        self.store.ensure_schema().await?;
        self.groups.members_of(group_id).await
    }

    pub async fn list_memberships(&self) -> Result<Vec<GroupMembership>> {
        self.store.ensure_schema().await?;
        self.groups.list_memberships().await
    }

    // Action-resources

    pub async fn create_action_resource(&self, key: &ActionResourceKey) -> Result<ActionResourceId> {
        self.store.ensure_schema().await?;
        self.resources.create_action_resource(key).await
    }

    pub async fn list_action_resources(&self) -> Result<Vec<ActionResource>> {
        self.store.ensure_schema().await?;
        self.resources.list_action_resources().await
    }

    pub async fn delete_action_resource(&self, id: ActionResourceId) -> Result<bool> {
        self.store.ensure_schema().await?;
        self.resources.delete_action_resource(id).await
    }

    // Grants

    /// Grant `subject` access to an existing action-resource
    pub async fn grant(
        &self,
        action_resource: ActionResourceId,
        subject: Subject,
    ) -> Result<PermissionId> {
        self.store.ensure_schema().await?;
        if self.resources.get_action_resource(action_resource).await?.is_none() {
            return Err(PermissionError::NotFound(format!(
                "Action-resource {} does not exist",
                action_resource
            )));
        }
        match subject {
            Subject::User(id) => self.require_user(id).await?,
            Subject::Group(id) => self.require_group(id).await?,
        }
        self.grants.grant(action_resource, subject).await
    }

    /// Grant on the action-resource for `key`, creating it if needed
    pub async fn grant_on(&self, key: &ActionResourceKey, subject: Subject) -> Result<PermissionId> {
        let action_resource = self.create_action_resource(key).await?;
        self.grant(action_resource, subject).await
    }

    pub async fn revoke(&self, id: PermissionId) -> Result<bool> {
        self.store.ensure_schema().await?;
        self.grants.revoke(id).await
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.store.ensure_schema().await?;
        self.grants.list_permissions().await
    }

    async fn require_user(&self, id: UserId) -> Result<()> {
        self.store.ensure_schema().await?;
        match self.actors.get_user(id).await? {
            Some(_) => Ok(()),
            None => Err(PermissionError::NotFound(format!("User {} does not exist", id))),
        }
    }

    async fn require_group(&self, id: GroupId) -> Result<()> {
        self.store.ensure_schema().await?;
        match self.groups.get_group(id).await? {
            Some(_) => Ok(()),
            None => Err(PermissionError::NotFound(format!("Group {} does not exist", id))),
        }
    }
}
