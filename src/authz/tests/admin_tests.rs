//! Administrative operations through the engine's Admin facade

mod common;

use common::memory_engine;
use live_permissions::{ActionResourceKey, PermissionError, Resource, Subject, UserKey};

const SUPERUSER_ID: i64 = 1;
const ANONYMOUS_ID: i64 = 2;
const AUTO_ADDED_GROUP_ID: i64 = 1;

#[tokio::test]
async fn test_init_seeds_reserved_rows() {
    let engine = memory_engine().await;
    let counts = engine.admin().init().await.unwrap();

    assert_eq!(counts.users, 2);
    assert_eq!(counts.groups, 1);
    assert_eq!(counts.memberships, 1);

    let users = engine.admin().list_users().await.unwrap();
    assert_eq!(users[0].id, SUPERUSER_ID);
    assert_eq!(users[0].value.as_deref(), Some("root"));
    assert_eq!(users[1].id, ANONYMOUS_ID);
    assert_eq!(users[1].lookup, "actor");
    assert_eq!(users[1].value, None);
    assert!(users.iter().all(|u| u.is_reserved()));

    let groups = engine.admin().list_groups().await.unwrap();
    assert_eq!(groups[0].name, "Auto-added users");
}

#[tokio::test]
async fn test_reserved_rows_cannot_be_deleted() {
    let engine = memory_engine().await;
    let admin = engine.admin();

    for id in [SUPERUSER_ID, ANONYMOUS_ID] {
        let err = admin.delete_user(id).await.unwrap_err();
        assert!(matches!(err, PermissionError::Reserved(_)));
    }
    let err = admin.delete_group(AUTO_ADDED_GROUP_ID).await.unwrap_err();
    assert!(matches!(err, PermissionError::Reserved(_)));

    assert_eq!(admin.counts().await.unwrap().users, 2);
}

#[tokio::test]
async fn test_deleting_user_cascades() {
    let engine = memory_engine().await;
    let admin = engine.admin();

    let ivy = admin
        .create_user(&UserKey::new("actor.id", "ivy"), Some("Ivy"))
        .await
        .unwrap();
    admin.add_member(AUTO_ADDED_GROUP_ID, ivy).await.unwrap();
    admin
        .grant_on(&ActionResourceKey::action("view-instance"), Subject::User(ivy))
        .await
        .unwrap();

    assert!(admin.delete_user(ivy).await.unwrap());
    assert!(!admin.delete_user(ivy).await.unwrap());

    let counts = admin.counts().await.unwrap();
    assert_eq!(counts.memberships, 1);
    assert_eq!(counts.permissions, 0);
    assert_eq!(counts.action_resources, 1);
}

#[tokio::test]
async fn test_deleting_group_removes_its_grants() {
    let engine = memory_engine().await;
    let admin = engine.admin();

    let staff = admin.create_group("staff").await.unwrap();
    admin.add_member(staff, ANONYMOUS_ID).await.unwrap();
    admin
        .grant_on(&ActionResourceKey::action("view-instance"), Subject::Group(staff))
        .await
        .unwrap();
    assert!(engine.check(None, "view-instance", &Resource::NoResource).await.unwrap());

    assert!(admin.delete_group(staff).await.unwrap());
    assert!(admin.list_permissions().await.unwrap().is_empty());
    assert!(!engine.check(None, "view-instance", &Resource::NoResource).await.unwrap());
}

#[tokio::test]
async fn test_grant_requires_existing_rows() {
    let engine = memory_engine().await;
    let admin = engine.admin();
    let ar = admin
        .create_action_resource(&ActionResourceKey::action("view-instance"))
        .await
        .unwrap();

    let err = admin.grant(ar, Subject::User(999)).await.unwrap_err();
    assert!(matches!(err, PermissionError::NotFound(_)));

    let err = admin.grant(ar, Subject::Group(999)).await.unwrap_err();
    assert!(matches!(err, PermissionError::NotFound(_)));

    let err = admin.grant(999, Subject::User(ANONYMOUS_ID)).await.unwrap_err();
    assert!(matches!(err, PermissionError::NotFound(_)));
}

#[tokio::test]
async fn test_grant_is_idempotent() {
    let engine = memory_engine().await;
    let admin = engine.admin();
    let key = ActionResourceKey::qualified("view-table", "fixtures", "facetable");

    let first = admin.grant_on(&key, Subject::Group(AUTO_ADDED_GROUP_ID)).await.unwrap();
    let second = admin.grant_on(&key, Subject::Group(AUTO_ADDED_GROUP_ID)).await.unwrap();
    assert_eq!(first, second);

    let permissions = admin.list_permissions().await.unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].subject(), Some(Subject::Group(AUTO_ADDED_GROUP_ID)));
}

#[tokio::test]
async fn test_invalid_inputs_rejected() {
    let engine = memory_engine().await;
    let admin = engine.admin();

    let err = admin.create_group("  ").await.unwrap_err();
    assert!(matches!(err, PermissionError::InvalidInput(_)));

    let err = admin
        .create_action_resource(&ActionResourceKey::action(""))
        .await
        .unwrap_err();
    assert!(matches!(err, PermissionError::InvalidInput(_)));

    let err = admin
        .create_user(&UserKey::new("user.id", "x"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PermissionError::InvalidInput(_)));
}

#[tokio::test]
async fn test_membership_management() {
    let engine = memory_engine().await;
    let admin = engine.admin();

    let ops = admin.create_group("ops").await.unwrap();
    admin.add_member(ops, SUPERUSER_ID).await.unwrap();
    admin.add_member(ops, ANONYMOUS_ID).await.unwrap();
    assert_eq!(admin.members_of(ops).await.unwrap(), vec![SUPERUSER_ID, ANONYMOUS_ID]);

    assert!(admin.remove_member(ops, SUPERUSER_ID).await.unwrap());
    assert_eq!(admin.members_of(ops).await.unwrap(), vec![ANONYMOUS_ID]);
    assert_eq!(admin.list_memberships().await.unwrap().len(), 2);

    let err = admin.add_member(ops, 999).await.unwrap_err();
    assert!(matches!(err, PermissionError::NotFound(_)));
}
