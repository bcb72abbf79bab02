//! Permission engine
//!
//! Orchestrates actor resolution, resource resolution, group expansion and
//! grant matching, with auto-provisioning and metrics.
//!
//! ```text
//! actor ──► ActorRegistry ──► users ──► GroupIndex ──► groups ─┐
//!                                                              ├─► GrantStore ──► Decision
//! (action, resource) ──► ResourceRegistry ──► action-resources ┘         ▲
//!                                                        superuser OR ───┘
//! ```

mod admin;
pub mod decision;
pub mod metrics;

pub use admin::Admin;
pub use decision::{Decision, DecisionReason, Evaluation};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::actor::ActorRegistry;
use crate::config::Settings;
use crate::error::{PermissionError, Result};
use crate::grant::GrantStore;
use crate::group::GroupIndex;
use crate::lookup;
use crate::resource::ResourceRegistry;
use crate::store::Store;
use crate::types::{
    ActionResourceId, Resource, UserId, AUTO_ADDED_GROUP_ID, SUPERUSER_LOOKUP, SUPERUSER_VALUE,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Permission engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Create rows for unseen actors and action-resources while checking.
    /// When off, checks never write.
    #[serde(default = "default_true")]
    pub auto_provision: bool,

    /// Lookup preferred when provisioning a new actor. Empty disables it.
    #[serde(default = "default_secondary_identity_lookup")]
    pub secondary_identity_lookup: Option<String>,

    /// Enable metrics collection
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_provision: true,
            secondary_identity_lookup: default_secondary_identity_lookup(),
            enable_metrics: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(expr) = self.secondary_identity() {
            if expr.split('.').next() != Some(lookup::ROOT_SEGMENT) {
                return Err(PermissionError::Config(format!(
                    "secondary_identity_lookup '{}' must start with '{}'",
                    expr,
                    lookup::ROOT_SEGMENT
                )));
            }
        }
        Ok(())
    }

    /// The secondary identity lookup, if one is enabled
    pub fn secondary_identity(&self) -> Option<&str> {
        self.secondary_identity_lookup
            .as_deref()
            .filter(|expr| !expr.is_empty())
    }
}

fn default_true() -> bool {
    true
}

fn default_secondary_identity_lookup() -> Option<String> {
    Some("actor.gh_email".to_string())
}

/// Host-facing permission check
///
/// Implemented by [`PermissionEngine`]; hosts depend on the trait so they can
/// substitute their own implementation in tests.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide whether `actor` may perform `action` on an untyped `resource`.
    ///
    /// `resource` may be `null`, a string, or a `[primary, secondary]` pair.
    /// Any other shape yields [`Decision::Indeterminate`].
    async fn check_permission(
        &self,
        actor: Option<&Value>,
        action: &str,
        resource: &Value,
    ) -> Result<Decision>;
}

/// Database-backed permission engine
///
/// Cheap to share behind an `Arc`; there is no in-process locking, concurrent
/// checks converge through the store's unique indexes.
pub struct PermissionEngine {
    store: Store,
    actors: ActorRegistry,
    groups: GroupIndex,
    resources: ResourceRegistry,
    grants: GrantStore,
    metrics: Option<Arc<MetricsCollector>>,
    config: EngineConfig,
}

impl PermissionEngine {
    /// Create an engine over an existing store
    pub fn new(store: Store, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let pool = store.pool().clone();
        let actors = ActorRegistry::new(pool.clone())
            .with_secondary_identity(config.secondary_identity().map(str::to_string));

        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        info!(
            "PermissionEngine initialized with auto_provision={}, metrics={}",
            config.auto_provision, config.enable_metrics
        );

        Ok(Self {
            actors,
            groups: GroupIndex::new(pool.clone()),
            resources: ResourceRegistry::new(pool.clone()),
            grants: GrantStore::new(pool),
            store,
            metrics,
            config,
        })
    }

    /// Open the configured store and build an engine over it
    pub async fn connect(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let store = Store::connect(&settings.store).await?;
        Self::new(store, settings.engine.clone())
    }

    /// Check a typed resource
    pub async fn check(
        &self,
        actor: Option<&Value>,
        action: &str,
        resource: &Resource,
    ) -> Result<bool> {
        let evaluation = self.evaluate_resource(actor, action, resource).await?;
        Ok(evaluation.is_allowed())
    }

    /// Full trace of a check on an untyped resource
    pub async fn evaluate(
        &self,
        actor: Option<&Value>,
        action: &str,
        resource: &Value,
    ) -> Result<Evaluation> {
        // An empty action never looks at the resource, whatever its shape
        let parsed = if action.is_empty() {
            Some(Resource::NoResource)
        } else {
            Resource::from_value(resource)
        };
        self.observe(actor, action, parsed.as_ref()).await
    }

    /// Full trace of a check on a typed resource
    pub async fn evaluate_resource(
        &self,
        actor: Option<&Value>,
        action: &str,
        resource: &Resource,
    ) -> Result<Evaluation> {
        self.observe(actor, action, Some(resource)).await
    }

    /// Administrative access to users, groups, action-resources and grants
    pub fn admin(&self) -> Admin {
        Admin::new(
            self.store.clone(),
            self.actors.clone(),
            self.groups.clone(),
            self.resources.clone(),
            self.grants.clone(),
        )
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn get_metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.get_metrics().await),
            None => None,
        }
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Close the underlying store
    pub async fn close(&self) {
        self.store.close().await;
    }

    async fn observe(
        &self,
        actor: Option<&Value>,
        action: &str,
        resource: Option<&Resource>,
    ) -> Result<Evaluation> {
        let start = Instant::now();
        let result = self.run(actor, action, resource).await;

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(evaluation) => {
                    metrics.record_decision(evaluation.decision).await;
                    metrics
                        .record_provisioned(
                            evaluation.provisioned_users.len(),
                            evaluation.provisioned_action_resources.len(),
                        )
                        .await;
                    if evaluation.reason == DecisionReason::Superuser {
                        metrics.record_superuser_override().await;
                    }
                }
                Err(_) => metrics.record_error().await,
            }
            metrics.record_latency(start.elapsed()).await;
        }

        if let Err(e) = &result {
            warn!("Permission check for '{}' failed: {}", action, e);
        }
        result
    }

    #[instrument(skip(self, actor, resource))]
    async fn run(
        &self,
        actor: Option<&Value>,
        action: &str,
        resource: Option<&Resource>,
    ) -> Result<Evaluation> {
        self.store.ensure_schema().await?;

        // Actor bootstrap runs even when the resource turns out unsupported
        let (user_ids, provisioned_users) = self.resolve_users(actor).await?;

        let resource = match resource {
            Some(resource) => resource,
            None => {
                debug!("Unsupported resource shape for action '{}'", action);
                return Ok(Evaluation {
                    decision: Decision::Indeterminate,
                    reason: DecisionReason::UnsupportedResource,
                    user_ids,
                    group_ids: Vec::new(),
                    action_resource_ids: Vec::new(),
                    provisioned_users,
                    provisioned_action_resources: Vec::new(),
                });
            }
        };

        let (action_resource_ids, provisioned_action_resources) =
            self.resolve_action_resources(action, resource).await?;
        let group_ids = self.groups.groups_for(&user_ids).await?;
        let matched = self
            .grants
            .find_matching(&action_resource_ids, &user_ids, &group_ids)
            .await?;

        // Superuser is a final OR over the grant match
        let superuser = is_superuser(actor);
        let decision = Decision::from_allowed(matched.is_some() || superuser);
        let reason = match matched {
            Some(permission_id) => DecisionReason::Grant { permission_id },
            None if superuser => DecisionReason::Superuser,
            None => DecisionReason::NoMatchingGrant,
        };

        debug!(
            "Decision for '{}' on {}: {} ({:?}), users={:?}, groups={:?}, action_resources={:?}",
            action, resource, decision, reason, user_ids, group_ids, action_resource_ids
        );

        Ok(Evaluation {
            decision,
            reason,
            user_ids,
            group_ids,
            action_resource_ids,
            provisioned_users,
            provisioned_action_resources,
        })
    }

    /// Users the actor maps to, and the rows this call provisioned
    async fn resolve_users(&self, actor: Option<&Value>) -> Result<(Vec<UserId>, Vec<UserId>)> {
        let resolution = self.actors.resolve_or_none(actor).await?;
        let mut user_ids = resolution.user_ids;
        let mut provisioned = Vec::new();

        if !self.config.auto_provision {
            return Ok((user_ids, provisioned));
        }

        if resolution.anonymous_missing {
            let id = self.actors.provision_anonymous().await?;
            user_ids.push(id);
            provisioned.push(id);
        }

        // A newly provisioned actor row only counts from the next check on
        if let Some(key) = resolution.provision {
            let id = self.actors.provision(&key).await?;
            self.groups.add_member(AUTO_ADDED_GROUP_ID, id).await?;
            provisioned.push(id);
        }

        user_ids.sort_unstable();
        user_ids.dedup();
        Ok((user_ids, provisioned))
    }

    async fn resolve_action_resources(
        &self,
        action: &str,
        resource: &Resource,
    ) -> Result<(Vec<ActionResourceId>, Vec<ActionResourceId>)> {
        let resolution = self.resources.resolve_or_none(action, resource).await?;
        let mut ids = resolution.ids;
        let mut provisioned = Vec::new();

        if self.config.auto_provision {
            for key in &resolution.missing {
                let id = self.resources.provision(key).await?;
                ids.push(id);
                provisioned.push(id);
            }
        }

        ids.sort_unstable();
        ids.dedup();
        Ok((ids, provisioned))
    }
}

#[async_trait]
impl Authorizer for PermissionEngine {
    async fn check_permission(
        &self,
        actor: Option<&Value>,
        action: &str,
        resource: &Value,
    ) -> Result<Decision> {
        let evaluation = self.evaluate(actor, action, resource).await?;
        Ok(evaluation.decision)
    }
}

/// The fixed root account: `actor.id == "root"`
fn is_superuser(actor: Option<&Value>) -> bool {
    actor
        .and_then(|actor| lookup::resolve(actor, SUPERUSER_LOOKUP))
        .map_or(false, |value| value == SUPERUSER_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionResourceKey, Subject, ANONYMOUS_ID};
    use serde_json::json;

    async fn engine() -> PermissionEngine {
        let store = Store::in_memory().await.unwrap();
        PermissionEngine::new(store, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.auto_provision);
        assert_eq!(config.secondary_identity(), Some("actor.gh_email"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_secondary_identity_disables_it() {
        let config = EngineConfig {
            secondary_identity_lookup: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.secondary_identity(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_unrooted_lookup() {
        let config = EngineConfig {
            secondary_identity_lookup: Some("actors.email".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PermissionError::Config(_))));
    }

    #[test]
    fn test_is_superuser() {
        assert!(is_superuser(Some(&json!({"id": "root"}))));
        assert!(!is_superuser(Some(&json!({"id": "Root"}))));
        assert!(!is_superuser(Some(&json!({"name": "root"}))));
        assert!(!is_superuser(None));
    }

    #[tokio::test]
    async fn test_engine_creation() {
        let engine = engine().await;
        assert!(engine.metrics().is_some());
        assert_eq!(engine.get_metrics().await.unwrap().total_checks, 0);
    }

    #[tokio::test]
    async fn test_grant_reason_is_reported() {
        let engine = engine().await;
        let admin = engine.admin();
        let permission = admin
            .grant_on(&ActionResourceKey::action("view-instance"), Subject::User(ANONYMOUS_ID))
            .await
            .unwrap();

        let evaluation = engine
            .evaluate(None, "view-instance", &Value::Null)
            .await
            .unwrap();
        assert_eq!(evaluation.decision, Decision::Allowed);
        assert_eq!(evaluation.reason, DecisionReason::Grant { permission_id: permission });
        assert_eq!(evaluation.user_ids, vec![ANONYMOUS_ID]);
    }

    #[tokio::test]
    async fn test_metrics_follow_decisions() {
        let engine = engine().await;
        let root = json!({"id": "root"});

        engine.check_permission(Some(&root), "view-instance", &Value::Null).await.unwrap();
        engine.check_permission(None, "view-instance", &Value::Null).await.unwrap();
        engine
            .check_permission(None, "view-instance", &json!({"unsupported": "shape"}))
            .await
            .unwrap();

        let metrics = engine.get_metrics().await.unwrap();
        assert_eq!(metrics.total_checks, 3);
        assert_eq!(metrics.allowed_decisions, 1);
        assert_eq!(metrics.denied_decisions, 1);
        assert_eq!(metrics.indeterminate_decisions, 1);
        assert_eq!(metrics.superuser_overrides, 1);
        assert_eq!(metrics.provisioned_action_resources, 1);
        assert!(metrics.avg_latency_ms > 0.0);

        let text = engine.metrics().unwrap().export_prometheus().await;
        assert!(text.contains("live_permissions_checks_total{decision=\"indeterminate\"} 1"));
        assert!(text.contains("live_permissions_superuser_overrides_total 1"));
    }
}
