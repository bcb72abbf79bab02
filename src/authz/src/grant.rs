//! Grant store: allow-rows tying an action-resource to a user or a group

use crate::error::{PermissionError, Result};
use crate::types::{ActionResourceId, GroupId, Permission, PermissionId, Subject, UserId};
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info, instrument};

/// Owner of the `permissions` table
#[derive(Clone)]
pub struct GrantStore {
    pool: SqlitePool,
}

impl GrantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// First grant on any of `action_resources` for any of `users` or `groups`.
    ///
    /// A plain existence check: there are no deny rows, and no ordering
    /// between grants. Empty action-resources, or no subjects at all, never match.
    #[instrument(skip_all, fields(
        action_resources = action_resources.len(),
        users = users.len(),
        groups = groups.len()
    ))]
    pub async fn find_matching(
        &self,
        action_resources: &[ActionResourceId],
        users: &[UserId],
        groups: &[GroupId],
    ) -> Result<Option<PermissionId>> {
        if action_resources.is_empty() || (users.is_empty() && groups.is_empty()) {
            return Ok(None);
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM permissions WHERE actions_resources_id IN (");
        push_id_list(&mut query, action_resources);
        query.push(" AND (");

        let mut subject_clauses = 0;
        if !users.is_empty() {
            query.push("user_id IN (");
            push_id_list(&mut query, users);
            subject_clauses += 1;
        }
        if !groups.is_empty() {
            if subject_clauses > 0 {
                query.push(" OR ");
            }
            query.push("group_id IN (");
            push_id_list(&mut query, groups);
        }
        query.push(") ORDER BY id LIMIT 1");

        let matched = query
            .build_query_scalar::<i64>()
            .fetch_optional(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to match grants"))?;

        debug!("Matching grant: {:?}", matched);
        Ok(matched)
    }

    /// Grant `subject` access to an action-resource; granting twice is a no-op
    #[instrument(skip(self))]
    pub async fn grant(
        &self,
        action_resource: ActionResourceId,
        subject: Subject,
    ) -> Result<PermissionId> {
        let (user_id, group_id) = match subject {
            Subject::User(id) => (Some(id), None),
            Subject::Group(id) => (None, Some(id)),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO permissions (actions_resources_id, user_id, group_id)
            VALUES (?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(action_resource)
        .bind(user_id)
        .bind(group_id)
        .execute(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to grant permission"))?
        .rows_affected();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM permissions
            WHERE actions_resources_id = ? AND user_id IS ? AND group_id IS ?
            "#,
        )
        .bind(action_resource)
        .bind(user_id)
        .bind(group_id)
        .fetch_one(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to read permission id"))?;

        if inserted > 0 {
            info!("Granted action-resource {} to {:?}", action_resource, subject);
        }
        Ok(id)
    }

    /// Remove a grant. Returns false if absent.
    pub async fn revoke(&self, id: PermissionId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM permissions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to revoke permission"))?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            "SELECT id, actions_resources_id, user_id, group_id FROM permissions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to list permissions"))
    }
}

/// Push `?, ?, ...)` binding every id
fn push_id_list(query: &mut QueryBuilder<Sqlite>, ids: &[i64]) {
    let mut list = query.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
}
