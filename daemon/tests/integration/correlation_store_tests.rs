use groupware_sync_daemon::persistency::correlation_repository::{CorrelationStore, StoreError};
use groupware_sync_daemon::persistency::types::{CollectionCorrelation, CorrelationScope, EntityCorrelation};
use groupware_sync_lib::{EntityType, Side};

use crate::common::setup::setup_persistency;

fn contacts() -> CorrelationScope<'static> {
    CorrelationScope::new("alice", EntityType::Contact)
}

fn link(collection: &CollectionCorrelation, local_id: &str, remote_id: &str) -> EntityCorrelation {
    EntityCorrelation {
        id: None,
        entity_type: collection.entity_type,
        user_id: collection.user_id.clone(),
        affiliation_id: collection.affiliation_id,
        local_entity_id: local_id.to_string(),
        local_signature: format!("sig-{}", local_id),
        local_collection_id: collection.local_collection_id.clone(),
        remote_entity_id: remote_id.to_string(),
        remote_signature: format!("sig-{}", remote_id),
        remote_collection_id: collection.remote_collection_id.clone(),
    }
}

#[tokio::test]
async fn test_collection_correlation_lifecycle() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();

    let created = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();
    assert!(created.affiliation_id > 0);
    assert_eq!(created.user_id, "alice");
    assert_eq!(created.entity_type, EntityType::Contact);
    assert_eq!(created.local_cursor, None);
    assert_eq!(created.remote_cursor, None);

    let found = repo
        .find_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();
    assert_eq!(found, Some(created.clone()));

    let other_type = repo
        .find_collection_correlation(CorrelationScope::new("alice", EntityType::Task), "personal", "contacts")
        .await
        .unwrap();
    assert!(other_type.is_none());

    let duplicate = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn test_cursors_are_stored_per_side() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();
    let collection = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();

    repo.store_local_cursor(collection.affiliation_id, "12").await.unwrap();
    repo.store_remote_cursor(collection.affiliation_id, "sync-key-4").await.unwrap();

    let stored = repo
        .find_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.cursor(Side::Local), Some("12"));
    assert_eq!(stored.cursor(Side::Remote), Some("sync-key-4"));

    let missing = repo.store_cursor(9999, Side::Local, "1").await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_upsert_inserts_then_updates() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();
    let collection = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();

    let id = repo.upsert(&link(&collection, "l1", "r1")).await.unwrap();

    let mut stored = repo.find_by_local_id(contacts(), "l1").await.unwrap().unwrap();
    assert_eq!(stored.id, Some(id));
    assert_eq!(stored.remote_entity_id, "r1");

    stored.remote_entity_id = "r2".to_string();
    stored.remote_signature = "sig-r2".to_string();
    let same_id = repo.upsert(&stored).await.unwrap();
    assert_eq!(same_id, id);

    assert!(repo.find_by_remote_id(contacts(), "r1").await.unwrap().is_none());
    let by_remote = repo.find_by_remote_id(contacts(), "r2").await.unwrap().unwrap();
    assert_eq!(by_remote.local_entity_id, "l1");
    assert_eq!(by_remote.remote_signature, "sig-r2");

    let all = repo
        .find_by_collection_pair(contacts(), "personal", "contacts")
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_duplicate_entity_ids_conflict() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();
    let collection = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();

    repo.upsert(&link(&collection, "l1", "r1")).await.unwrap();

    let same_local = repo.upsert(&link(&collection, "l1", "r2")).await;
    assert!(matches!(same_local, Err(StoreError::Conflict(_))));

    let same_remote = repo.upsert(&link(&collection, "l2", "r1")).await;
    assert!(matches!(same_remote, Err(StoreError::Conflict(_))));

    // Same ids under another user are independent
    let bob_collection = repo
        .create_collection_correlation(CorrelationScope::new("bob", EntityType::Contact), "personal", "contacts")
        .await
        .unwrap();
    repo.upsert(&link(&bob_collection, "l1", "r1")).await.unwrap();
}

#[tokio::test]
async fn test_delete_respects_scope() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();
    let collection = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();
    let id = repo.upsert(&link(&collection, "l1", "r1")).await.unwrap();

    let wrong_user = repo
        .delete(CorrelationScope::new("mallory", EntityType::Contact), id)
        .await
        .unwrap();
    assert!(!wrong_user);

    assert!(repo.delete(contacts(), id).await.unwrap());
    assert!(!repo.delete(contacts(), id).await.unwrap());
    assert!(repo.find_by_local_id(contacts(), "l1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_collection_delete_cascades_to_its_entities_only() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();
    let doomed = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();
    let kept = repo
        .create_collection_correlation(contacts(), "work", "Work Contacts")
        .await
        .unwrap();

    repo.upsert(&link(&doomed, "l1", "r1")).await.unwrap();
    repo.upsert(&link(&doomed, "l2", "r2")).await.unwrap();
    repo.upsert(&link(&kept, "l3", "r3")).await.unwrap();

    let removed = repo
        .delete_collection_correlation(doomed.affiliation_id)
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let remaining = repo.collection_correlations_for_user("alice").await.unwrap();
    assert_eq!(remaining, vec![kept.clone()]);
    assert!(repo.find_by_local_id(contacts(), "l1").await.unwrap().is_none());
    assert!(repo.find_by_local_id(contacts(), "l3").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_by_affiliation_keeps_collection() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();
    let collection = repo
        .create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();
    repo.upsert(&link(&collection, "l1", "r1")).await.unwrap();

    assert_eq!(repo.delete_by_affiliation_id(collection.affiliation_id).await.unwrap(), 1);
    assert_eq!(repo.collection_correlations_for_user("alice").await.unwrap().len(), 1);
    assert!(repo
        .find_by_collection_pair(contacts(), "personal", "contacts")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_collections_are_listed_per_user() {
    let persistency = setup_persistency().await.unwrap();
    let repo = persistency.correlation_repository();
    repo.create_collection_correlation(contacts(), "personal", "contacts")
        .await
        .unwrap();
    repo.create_collection_correlation(CorrelationScope::new("alice", EntityType::Event), "calendar", "Calendar")
        .await
        .unwrap();
    repo.create_collection_correlation(CorrelationScope::new("bob", EntityType::Task), "todo", "Tasks")
        .await
        .unwrap();

    let alice = repo.collection_correlations_for_user("alice").await.unwrap();
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].entity_type, EntityType::Contact);
    assert_eq!(alice[1].entity_type, EntityType::Event);
    assert_eq!(repo.collection_correlations_for_user("bob").await.unwrap().len(), 1);
}
