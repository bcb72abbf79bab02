//! Table definitions and reserved rows
//!
//! Every statement is safe to run repeatedly and concurrently from several
//! processes sharing one database file.
//!
//! Uniqueness on nullable columns goes through `IFNULL(col, X'')` expression
//! indexes. A zero-length BLOB never compares equal to TEXT, so NULL becomes a
//! single distinct key that cannot collide with `''`.

pub(crate) const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        description TEXT,
        lookup TEXT NOT NULL,
        value TEXT
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_users_lookup_value
        ON users (lookup, IFNULL(value, X''))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS "groups" (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_membership (
        group_id INTEGER NOT NULL REFERENCES "groups"(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (group_id, user_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_group_membership_user
        ON group_membership (user_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS actions_resources (
        id INTEGER PRIMARY KEY,
        action TEXT NOT NULL,
        resource_primary TEXT,
        resource_secondary TEXT
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_actions_resources_unique
        ON actions_resources (action, IFNULL(resource_primary, X''), IFNULL(resource_secondary, X''))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id INTEGER PRIMARY KEY,
        actions_resources_id INTEGER NOT NULL REFERENCES actions_resources(id) ON DELETE CASCADE,
        user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
        group_id INTEGER REFERENCES "groups"(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_permissions_user
        ON permissions (user_id, actions_resources_id)
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_permissions_group
        ON permissions (group_id, actions_resources_id)
    "#,
];

pub(crate) const RESERVED_ROWS: &[&str] = &[
    r#"
    INSERT OR IGNORE INTO users (id, description, lookup, value)
    VALUES (1, 'Root account', 'actor.id', 'root')
    "#,
    r#"
    INSERT OR IGNORE INTO users (id, description, lookup, value)
    VALUES (2, 'Unauthenticated users', 'actor', NULL)
    "#,
    r#"
    INSERT OR IGNORE INTO "groups" (id, name)
    VALUES (1, 'Auto-added users')
    "#,
    r#"
    INSERT OR IGNORE INTO group_membership (group_id, user_id)
    SELECT 1, 1
    WHERE EXISTS (SELECT 1 FROM users WHERE id = 1)
      AND EXISTS (SELECT 1 FROM "groups" WHERE id = 1)
    "#,
];
