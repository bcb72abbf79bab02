//! Resource registry: maps (action, resource) to stored grant targets
//!
//! A check for `view-table` on `(fixtures, facetable)` can be satisfied by a
//! grant on any of:
//!
//! ```text
//! (view-table, NULL,     NULL)        always looked up, provisioned
//! (view-table, fixtures, NULL)        looked up only
//! (view-table, fixtures, facetable)   looked up, provisioned
//! ```
//!
//! For a primary-only resource the middle row is provisioned too.

use crate::error::{PermissionError, Result};
use crate::types::{ActionResource, ActionResourceId, ActionResourceKey, Resource};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, instrument};

/// Outcome of the read-only phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceResolution {
    /// Existing rows relevant to the check
    pub ids: Vec<ActionResourceId>,

    /// Rows the check is entitled to create
    pub missing: Vec<ActionResourceKey>,
}

impl ResourceResolution {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.missing.is_empty()
    }
}

/// Owner of the `actions_resources` table
#[derive(Clone)]
pub struct ResourceRegistry {
    pool: SqlitePool,
}

impl ResourceRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find the rows relevant to `action` on `resource` without writing.
    ///
    /// An empty action resolves to nothing at all.
    #[instrument(skip(self, resource), fields(resource = %resource))]
    pub async fn resolve_or_none(
        &self,
        action: &str,
        resource: &Resource,
    ) -> Result<ResourceResolution> {
        let mut resolution = ResourceResolution::default();
        if action.is_empty() {
            return Ok(resolution);
        }

        // (key, provision when missing)
        let mut targets = vec![(ActionResourceKey::action(action), true)];
        match resource {
            Resource::NoResource => {}
            Resource::Primary(primary) => {
                targets.push((ActionResourceKey::primary(action, primary.clone()), true));
            }
            Resource::PrimarySecondary(primary, secondary) => {
                targets.push((ActionResourceKey::primary(action, primary.clone()), false));
                targets.push((
                    ActionResourceKey::qualified(action, primary.clone(), secondary.clone()),
                    true,
                ));
            }
        }

        for (key, provision) in targets {
            match self.find(&key).await? {
                Some(id) => resolution.ids.push(id),
                None if provision => resolution.missing.push(key),
                None => {}
            }
        }

        debug!(
            "Resolved {} action-resource(s), {} missing",
            resolution.ids.len(),
            resolution.missing.len()
        );
        Ok(resolution)
    }

    /// Insert the row for `key` unless it exists, returning its id either way
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn provision(&self, key: &ActionResourceKey) -> Result<ActionResourceId> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO actions_resources (action, resource_primary, resource_secondary)
            VALUES (?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&key.action)
        .bind(&key.primary)
        .bind(&key.secondary)
        .execute(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to provision action-resource"))?
        .rows_affected();

        let id = self.find(key).await?.ok_or_else(|| {
            PermissionError::Internal(format!("Action-resource {} vanished after provisioning", key))
        })?;

        if inserted > 0 {
            info!("Auto-added action-resource {} ({})", id, key);
        }
        Ok(id)
    }

    /// Id of the row with exactly this key; NULL only matches NULL
    pub async fn find(&self, key: &ActionResourceKey) -> Result<Option<ActionResourceId>> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM actions_resources
            WHERE action = ? AND resource_primary IS ? AND resource_secondary IS ?
            "#,
        )
        .bind(&key.action)
        .bind(&key.primary)
        .bind(&key.secondary)
        .fetch_optional(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to look up action-resource"))
    }

    // Administrative operations

    /// Create a grant target explicitly, e.g. before granting on it
    pub async fn create_action_resource(&self, key: &ActionResourceKey) -> Result<ActionResourceId> {
        if key.action.is_empty() {
            return Err(PermissionError::InvalidInput("Action must not be empty".into()));
        }
        if key.primary.is_none() && key.secondary.is_some() {
            return Err(PermissionError::InvalidInput(format!(
                "Secondary resource without a primary in {}",
                key
            )));
        }
        self.provision(key).await
    }

    pub async fn get_action_resource(&self, id: ActionResourceId) -> Result<Option<ActionResource>> {
        sqlx::query_as::<_, ActionResource>(
            "SELECT id, action, resource_primary, resource_secondary FROM actions_resources WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to get action-resource"))
    }

    pub async fn list_action_resources(&self) -> Result<Vec<ActionResource>> {
        sqlx::query_as::<_, ActionResource>(
            "SELECT id, action, resource_primary, resource_secondary FROM actions_resources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to list action-resources"))
    }

    /// Delete a grant target and the grants on it. Returns false if absent.
    pub async fn delete_action_resource(&self, id: ActionResourceId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM actions_resources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to delete action-resource"))?
            .rows_affected();
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn registry() -> (Store, ResourceRegistry) {
        let store = Store::in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();
        let registry = ResourceRegistry::new(store.pool().clone());
        (store, registry)
    }

    #[tokio::test]
    async fn test_empty_action_resolves_nothing() {
        let (_store, registry) = registry().await;
        let resolution = registry
            .resolve_or_none("", &Resource::primary("fixtures"))
            .await
            .unwrap();
        assert!(resolution.is_empty());
    }

    #[tokio::test]
    async fn test_action_only_on_fresh_store() {
        let (_store, registry) = registry().await;
        let resolution = registry
            .resolve_or_none("view-instance", &Resource::NoResource)
            .await
            .unwrap();
        assert!(resolution.ids.is_empty());
        assert_eq!(resolution.missing, vec![ActionResourceKey::action("view-instance")]);
    }

    #[tokio::test]
    async fn test_primary_resource_provisions_both_levels() {
        let (_store, registry) = registry().await;
        let resolution = registry
            .resolve_or_none("view-database", &Resource::primary("fixtures"))
            .await
            .unwrap();
        assert_eq!(
            resolution.missing,
            vec![
                ActionResourceKey::action("view-database"),
                ActionResourceKey::primary("view-database", "fixtures"),
            ]
        );
    }

    #[tokio::test]
    async fn test_pair_only_looks_up_primary_level() {
        let (_store, registry) = registry().await;
        let resolution = registry
            .resolve_or_none("view-table", &Resource::pair("fixtures", "facetable"))
            .await
            .unwrap();
        assert_eq!(
            resolution.missing,
            vec![
                ActionResourceKey::action("view-table"),
                ActionResourceKey::qualified("view-table", "fixtures", "facetable"),
            ]
        );

        let primary = registry
            .provision(&ActionResourceKey::primary("view-table", "fixtures"))
            .await
            .unwrap();
        let resolution = registry
            .resolve_or_none("view-table", &Resource::pair("fixtures", "facetable"))
            .await
            .unwrap();
        assert_eq!(resolution.ids, vec![primary]);
    }

    #[tokio::test]
    async fn test_null_is_not_empty_string() {
        let (store, registry) = registry().await;
        let null_secondary = registry
            .provision(&ActionResourceKey::primary("view-table", "x"))
            .await
            .unwrap();
        let empty_secondary = registry
            .provision(&ActionResourceKey::qualified("view-table", "x", ""))
            .await
            .unwrap();

        assert_ne!(null_secondary, empty_secondary);
        assert_eq!(store.counts().await.unwrap().action_resources, 2);
    }

    #[tokio::test]
    async fn test_provision_twice_returns_same_id() {
        let (store, registry) = registry().await;
        let key = ActionResourceKey::action("edit-widget");
        let first = registry.provision(&key).await.unwrap();
        let second = registry.provision(&key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.counts().await.unwrap().action_resources, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_secondary_without_primary() {
        let (_store, registry) = registry().await;
        let key = ActionResourceKey {
            action: "view-table".to_string(),
            primary: None,
            secondary: Some("facetable".to_string()),
        };
        let err = registry.create_action_resource(&key).await.unwrap_err();
        assert!(matches!(err, PermissionError::InvalidInput(_)));
    }
}
