//! SQLite-backed storage shared by every registry
//!
//! The [`Store`] owns the connection pool. Tables are created lazily the
//! first time [`Store::ensure_schema`] runs, which the engine does on its
//! first decision.

mod schema;

use crate::config::StoreConfig;
use crate::error::{PermissionError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Handle to the permission database
///
/// Cheap to clone; clones share the pool and the schema guard.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    schema: Arc<OnceCell<()>>,
}

impl Store {
    /// Open a pooled connection to the database described by `config`
    ///
    /// # Example
    /// ```no_run
    /// use live_permissions::{config::StoreConfig, Store};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = Store::connect(&StoreConfig::default()).await?;
    /// store.ensure_schema().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| PermissionError::Config(format!("Invalid database URL: {}", e)))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .foreign_keys(true)
            .create_if_missing(config.create_if_missing);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_with(options)
            .await
            .map_err(PermissionError::db("Failed to connect to database"))?;

        info!(
            "Opened permission store at {} (max_connections={})",
            config.database_url, config.max_connections
        );
        Ok(Self::from_pool(pool))
    }

    /// Private in-memory database, isolated from every other store
    ///
    /// Limited to a single long-lived connection: an in-memory SQLite
    /// database disappears with the last connection that uses it.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| PermissionError::Config(format!("Invalid database URL: {}", e)))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(PermissionError::db("Failed to open in-memory database"))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap a pool owned by the host application
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema: Arc::new(OnceCell::new()),
        }
    }

    /// Get database pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing tables and reserved rows, once per store
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                for statement in schema::TABLES.iter().chain(schema::RESERVED_ROWS) {
                    sqlx::query(statement)
                        .execute(&self.pool)
                        .await
                        .map_err(PermissionError::db("Failed to create permission tables"))?;
                }
                debug!("Permission tables ready");
                Ok::<(), PermissionError>(())
            })
            .await?;
        Ok(())
    }

    /// Row counts per table
    pub async fn counts(&self) -> Result<EntityCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM "groups") AS groups,
                (SELECT COUNT(*) FROM group_membership) AS memberships,
                (SELECT COUNT(*) FROM actions_resources) AS action_resources,
                (SELECT COUNT(*) FROM permissions) AS permissions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(PermissionError::db("Failed to count rows"))?;

        let get = |column: &str| -> Result<i64> {
            row.try_get::<i64, _>(column)
                .map_err(|e| PermissionError::Database(format!("Failed to read count: {}", e)))
        };

        Ok(EntityCounts {
            users: get("users")?,
            groups: get("groups")?,
            memberships: get("memberships")?,
            action_resources: get("action_resources")?,
            permissions: get("permissions")?,
        })
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Permission store closed");
    }
}

/// Number of rows in each permission table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub users: i64,
    pub groups: i64,
    pub memberships: i64,
    pub action_resources: i64,
    pub permissions: i64,
}
