//! Actor registry: maps opaque actors to stored users
//!
//! Resolution is split in two phases. [`ActorRegistry::resolve_or_none`]
//! only reads and reports what is missing; [`ActorRegistry::provision`] and
//! [`ActorRegistry::provision_anonymous`] perform the writes. The engine
//! composes them.

use crate::error::{PermissionError, Result};
use crate::lookup;
use crate::types::{User, UserId, UserKey, ANONYMOUS_LOOKUP};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument};

/// Outcome of the read-only phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorResolution {
    /// Users that already exist for this actor, anonymous row included
    pub user_ids: Vec<UserId>,

    /// The anonymous row is missing and must be provisioned
    pub anonymous_missing: bool,

    /// New user to provision for a previously unseen actor shape
    pub provision: Option<UserKey>,
}

/// Owner of the `users` table
#[derive(Clone)]
pub struct ActorRegistry {
    pool: SqlitePool,
    secondary_identity_lookup: Option<String>,
}

impl ActorRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            secondary_identity_lookup: None,
        }
    }

    /// Lookup preferred when provisioning an unseen actor, e.g. `actor.gh_email`
    pub fn with_secondary_identity(mut self, lookup: Option<String>) -> Self {
        self.secondary_identity_lookup = lookup;
        self
    }

    /// Find the users an actor maps to without writing anything.
    ///
    /// The anonymous row stands for "everyone" and is part of every
    /// resolution. When a non-null actor matches no stored user, the row to
    /// provision is chosen as follows: the secondary identity lookup if the
    /// actor exposes it and no stored lookup already produced it, otherwise
    /// the first candidate in lookup order. Only one row is ever proposed
    /// per call.
    #[instrument(skip(self, actor))]
    pub async fn resolve_or_none(&self, actor: Option<&Value>) -> Result<ActorResolution> {
        let mut resolution = ActorResolution::default();

        match self.find_anonymous().await? {
            Some(id) => resolution.user_ids.push(id),
            None => resolution.anonymous_missing = true,
        }

        let actor = match actor {
            Some(actor) if !actor.is_null() => actor,
            _ => return Ok(resolution),
        };

        let candidates: Vec<(String, String)> = self
            .distinct_lookups()
            .await?
            .into_iter()
            .filter_map(|expr| lookup::resolve(actor, &expr).map(|value| (expr, value)))
            .collect();

        let matched = self.find_matching(&candidates).await?;
        if !matched.is_empty() {
            debug!("Actor matched {} stored user(s)", matched.len());
            resolution.user_ids.extend(matched);
            return Ok(resolution);
        }

        resolution.provision = self.choose_provision(actor, &candidates);
        Ok(resolution)
    }

    fn choose_provision(&self, actor: &Value, candidates: &[(String, String)]) -> Option<UserKey> {
        if let Some(expr) = &self.secondary_identity_lookup {
            let already_candidate = candidates.iter().any(|(lookup, _)| lookup == expr);
            if !already_candidate {
                if let Some(value) = lookup::resolve(actor, expr) {
                    return Some(UserKey::new(expr.clone(), value));
                }
            }
        }

        candidates
            .first()
            .map(|(lookup, value)| UserKey::new(lookup.clone(), value.clone()))
    }

    /// Insert the user for `key` unless it exists, returning its id either way
    #[instrument(skip(self), fields(lookup = %key.lookup))]
    pub async fn provision(&self, key: &UserKey) -> Result<UserId> {
        let inserted = sqlx::query(
            "INSERT INTO users (lookup, value) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(&key.lookup)
        .bind(&key.value)
        .execute(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to provision user"))?
        .rows_affected();

        let id = self.find(key).await?.ok_or_else(|| {
            PermissionError::Internal(format!("User {} vanished after provisioning", key.lookup))
        })?;

        if inserted > 0 {
            info!("Auto-added user {} for lookup {}", id, key.lookup);
        }
        Ok(id)
    }

    /// Ensure the anonymous row exists
    pub async fn provision_anonymous(&self) -> Result<UserId> {
        self.provision(&UserKey::anonymous()).await
    }

    /// Id of the user with exactly this key (NULL-aware on `value`)
    pub async fn find(&self, key: &UserKey) -> Result<Option<UserId>> {
        let row = sqlx::query("SELECT id FROM users WHERE lookup = ? AND value IS ?")
            .bind(&key.lookup)
            .bind(&key.value)
            .fetch_optional(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to look up user"))?;

        row.map(|r| r.try_get::<i64, _>("id"))
            .transpose()
            .map_err(|e| PermissionError::Database(format!("Failed to read user id: {}", e)))
    }

    async fn find_anonymous(&self) -> Result<Option<UserId>> {
        self.find(&UserKey::anonymous()).await
    }

    /// Every lookup expression in use, except the anonymous one, in text order
    pub async fn distinct_lookups(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT lookup FROM users WHERE lookup != ? ORDER BY lookup",
        )
        .bind(ANONYMOUS_LOOKUP)
        .fetch_all(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to load lookups"))
    }

    /// One batched `(lookup = ? AND value = ?) OR ...` query for all candidates
    async fn find_matching(&self, candidates: &[(String, String)]) -> Result<Vec<UserId>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM users WHERE ");
        for (i, (lookup, value)) in candidates.iter().enumerate() {
            if i > 0 {
                query.push(" OR ");
            }
            query.push("(lookup = ");
            query.push_bind(lookup.clone());
            query.push(" AND value = ");
            query.push_bind(value.clone());
            query.push(")");
        }
        query.push(" ORDER BY id");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to match users"))?;

        rows.iter()
            .map(|r| r.try_get::<i64, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PermissionError::Database(format!("Failed to read user id: {}", e)))
    }

    // Administrative operations

    /// Create a user, or return the existing one with the same key
    pub async fn create_user(&self, key: &UserKey, description: Option<&str>) -> Result<UserId> {
        if key.lookup.split('.').next() != Some(lookup::ROOT_SEGMENT) {
            return Err(PermissionError::InvalidInput(format!(
                "Lookup '{}' must start with '{}'",
                key.lookup,
                lookup::ROOT_SEGMENT
            )));
        }

        sqlx::query(
            "INSERT INTO users (lookup, value, description) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(&key.lookup)
        .bind(&key.value)
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to create user"))?;

        self.find(key)
            .await?
            .ok_or_else(|| PermissionError::Internal(format!("User {} not created", key.lookup)))
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, description, lookup, value FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to get user"))
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        sqlx::query_as::<_, User>("SELECT id, description, lookup, value FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to list users"))
    }

    /// Delete a user; memberships and grants go with it. Returns false if absent.
    pub async fn delete_user(&self, id: UserId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(PermissionError::db("Failed to delete user"))?
            .rows_affected();
        Ok(deleted > 0)
    }
}
