//! Shared fixtures for integration tests

#![allow(dead_code)]

use live_permissions::{EngineConfig, PermissionEngine, Store, StoreConfig};
use std::path::Path;

/// Engine over a private in-memory store, default configuration
pub async fn memory_engine() -> PermissionEngine {
    memory_engine_with(EngineConfig::default()).await
}

pub async fn memory_engine_with(config: EngineConfig) -> PermissionEngine {
    let store = Store::in_memory().await.expect("in-memory store");
    PermissionEngine::new(store, config).expect("engine")
}

/// Engine over a database file inside `dir`
pub async fn file_engine(dir: &Path) -> PermissionEngine {
    let url = format!("sqlite:{}", dir.join("permissions.db").display());
    let store = Store::connect(&StoreConfig::new(url)).await.expect("file store");
    PermissionEngine::new(store, EngineConfig::default()).expect("engine")
}
