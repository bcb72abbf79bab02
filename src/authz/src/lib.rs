//! # Live Permissions
//!
//! Embeddable authorization engine backed by a live SQLite store.
//!
//! ## Features
//!
//! - **Lookup expressions** (`actor.id`, `actor.gh_email`) map opaque actors to users
//! - **Auto-provisioning** of unseen actors and action-resources while checking
//! - **Specificity hierarchy**: a grant on `(action)` or `(action, database)`
//!   covers `(action, database, table)`
//! - **Groups** with an "Auto-added users" group for every provisioned user
//! - **Superuser override** for the `root` account
//! - **Async-first design** using Tokio and sqlx
//!
//! ## Example
//!
//! ```rust,no_run
//! use live_permissions::{Authorizer, EngineConfig, PermissionEngine, Store};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::in_memory().await?;
//!     let engine = PermissionEngine::new(store, EngineConfig::default())?;
//!
//!     let actor = json!({"id": "root"});
//!     let decision = engine
//!         .check_permission(Some(&actor), "view-instance", &json!(null))
//!         .await?;
//!
//!     if decision.allowed_or(false) {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod config;
pub mod engine;
pub mod error;
pub mod grant;
pub mod group;
pub mod lookup;
pub mod resource;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use actor::{ActorRegistry, ActorResolution};
pub use config::{Settings, StoreConfig};
pub use engine::{
    Admin, Authorizer, Decision, DecisionReason, EngineConfig, EngineMetrics, Evaluation,
    MetricsCollector, PermissionEngine,
};
pub use error::{PermissionError, Result};
pub use grant::GrantStore;
pub use group::GroupIndex;
pub use resource::{ResourceRegistry, ResourceResolution};
pub use store::{EntityCounts, Store};
pub use types::{
    ActionResource, ActionResourceId, ActionResourceKey, Group, GroupId, GroupMembership,
    Permission, PermissionId, Resource, Subject, User, UserId, UserKey,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
