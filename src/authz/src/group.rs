//! Group membership index

use crate::error::{PermissionError, Result};
use crate::types::{Group, GroupId, GroupMembership, UserId};
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, instrument};

/// Owner of the `groups` and `group_membership` tables
#[derive(Clone)]
pub struct GroupIndex {
    pool: SqlitePool,
}

impl GroupIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Deduplicated ids of every group containing any of `user_ids`.
    ///
    /// No users means no groups; there is no implicit "everyone" group.
    #[instrument(skip(self), fields(users = user_ids.len()))]
    pub async fn groups_for(&self, user_ids: &[UserId]) -> Result<Vec<GroupId>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT DISTINCT group_id FROM group_membership WHERE user_id IN (",
        );
        let mut ids = query.separated(", ");
        for id in user_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY group_id");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to load group memberships"))?;

        let groups = rows
            .iter()
            .map(|r| r.try_get::<i64, _>("group_id"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PermissionError::Database(format!("Failed to read group id: {}", e)))?;

        debug!("Users belong to {} group(s)", groups.len());
        Ok(groups)
    }

    /// Add a user to a group; adding twice is a no-op
    pub async fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<()> {
        sqlx::query(
            "INSERT INTO group_membership (group_id, user_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to add group member"))?;
        Ok(())
    }

    /// Returns false if the user was not a member
    pub async fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM group_membership WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to remove group member"))?
            .rows_affected();
        Ok(removed > 0)
    }

    pub async fn members_of(&self, group_id: GroupId) -> Result<Vec<UserId>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM group_membership WHERE group_id = ? ORDER BY user_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to list group members"))
    }

    pub async fn list_memberships(&self) -> Result<Vec<GroupMembership>> {
        sqlx::query_as::<_, GroupMembership>(
            "SELECT group_id, user_id FROM group_membership ORDER BY group_id, user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to list memberships"))
    }

    /// Create a group, or return the id of the existing group with that name
    pub async fn create_group(&self, name: &str) -> Result<GroupId> {
        if name.trim().is_empty() {
            return Err(PermissionError::InvalidInput("Group name must not be empty".into()));
        }

        sqlx::query(r#"INSERT INTO "groups" (name) VALUES (?) ON CONFLICT DO NOTHING"#)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to create group"))?;

        sqlx::query_scalar::<_, i64>(r#"SELECT id FROM "groups" WHERE name = ?"#)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to read group id"))
    }

    pub async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        sqlx::query_as::<_, Group>(r#"SELECT id, name FROM "groups" WHERE id = ?"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to get group"))
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        sqlx::query_as::<_, Group>(r#"SELECT id, name FROM "groups" ORDER BY id"#)
            .fetch_all(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to list groups"))
    }

    /// Delete a group with its memberships and grants. Returns false if absent.
    pub async fn delete_group(&self, id: GroupId) -> Result<bool> {
        let deleted = sqlx::query(r#"DELETE FROM "groups" WHERE id = ?"#)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to delete group"))?
            .rows_affected();
        Ok(deleted > 0)
    }
}
