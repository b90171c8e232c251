mod common;

use aclcache_core::events::{EventBroadcaster, RecordEventType};
use aclcache_core::{CacheStatus, ProviderKind};
use aclcache_db_memory::{FaultOp, InMemoryStorage};
use aclcache_engine::{AppConfig, CloudAclDriver, SyncOp};
use aclcache_storage::{
    CanonicalAclStorage, CatalogStorage, DynStorage, EventedStorage,
};
use common::{Harness, entries, remote};
use std::sync::Arc;

#[tokio::test]
async fn empty_cache_adds_every_remote_acl() {
    let h = Harness::new(ProviderKind::Aliyun).await;

    let result = h
        .sync(vec![
            remote("acl-a", "office", &["10.0.0.0/8"]),
            remote("acl-b", "vpn", &["172.16.0.0/12"]),
        ])
        .await;

    assert_eq!(result.added, 2);
    assert!(result.is_ok());
    assert_eq!(result.deleted + result.updated, 0);
    assert_eq!(h.storage.count_canonical_acls().await.unwrap(), 2);

    let records = h.live_records().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == CacheStatus::Creating));
    assert_eq!(h.by_external_id("acl-a").await.name, "office");
    assert_eq!(h.by_external_id("acl-b").await.project_id, "proj-1");
}

#[tokio::test]
async fn second_pass_with_same_listing_adds_and_removes_nothing() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    let listing = vec![
        remote("acl-a", "office", &["10.0.0.0/8"]),
        remote("acl-b", "vpn", &["172.16.0.0/12"]),
    ];

    h.sync(listing.clone()).await;
    let second = h.sync(listing).await;

    assert_eq!(second.added, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.updated, 2);
    assert!(second.is_ok());
    assert_eq!(h.live_records().await.len(), 2);
    assert_eq!(h.storage.count_canonical_acls().await.unwrap(), 2);
}

#[tokio::test]
async fn same_content_in_any_order_shares_one_canonical_row() {
    let h = Harness::new(ProviderKind::Huawei).await;
    h.listener("lis-1").await;
    h.listener("lis-2").await;

    let result = h
        .sync(vec![
            remote("acl-a", "", &["10.0.0.0/8", "192.168.1.0/24"]).with_listener("lis-1"),
            remote("acl-b", "", &["192.168.1.0/24", "10.0.0.0/8"]).with_listener("lis-2"),
        ])
        .await;

    assert_eq!(result.added, 2);
    let a = h.by_external_id("acl-a").await;
    let b = h.by_external_id("acl-b").await;
    assert_eq!(a.canonical_acl_id, b.canonical_acl_id);
    assert_ne!(a.listener_id, b.listener_id);

    let fingerprint = entries(&["10.0.0.0/8", "192.168.1.0/24"]).fingerprint();
    assert_eq!(
        h.storage.count_canonical_by_fingerprint(&fingerprint).await.unwrap(),
        1
    );
    assert_eq!(h.storage.count_canonical_acls().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_content_in_one_region_is_an_add_error() {
    let h = Harness::new(ProviderKind::Aliyun).await;

    let result = h
        .sync(vec![
            remote("acl-a", "one", &["10.0.0.0/8"]),
            remote("acl-b", "two", &["10.0.0.0/8"]),
        ])
        .await;

    assert_eq!(result.added, 1);
    assert_eq!(result.add_errors, 1);
    let err = result.error_for("acl-b").unwrap();
    assert_eq!(err.op, SyncOp::Add);
    assert!(err.message.contains("Duplicate"));
    assert_eq!(h.live_records().await.len(), 1);
}

#[tokio::test]
async fn removal_blocked_by_listener_leaves_record_unknown() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    h.sync(vec![remote("x", "office", &["10.0.0.0/8"])]).await;
    let record = h.by_external_id("x").await;
    h.storage
        .insert_listener(
            aclcache_storage::LoadbalancerListener::new("web", "lis-web", &h.provider, &h.region.id)
                .with_acl(&record.id),
        )
        .await
        .unwrap();

    let result = h.sync(vec![]).await;

    assert_eq!(result.deleted, 0);
    assert_eq!(result.delete_errors, 1);
    assert!(result.error_for(&record.id).unwrap().message.contains("Resource busy"));

    let after = h.record(&record.id).await;
    assert_eq!(after.status, CacheStatus::Unknown);
    assert!(!after.pending_deleted);
}

#[tokio::test]
async fn unknown_record_recovers_when_listed_again() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    let listing = vec![remote("x", "office", &["10.0.0.0/8"])];
    h.sync(listing.clone()).await;
    let record = h.by_external_id("x").await;
    h.storage
        .insert_listener(
            aclcache_storage::LoadbalancerListener::new("web", "lis-web", &h.provider, &h.region.id)
                .with_acl(&record.id),
        )
        .await
        .unwrap();
    h.sync(vec![]).await;
    assert_eq!(h.record(&record.id).await.status, CacheStatus::Unknown);

    let result = h.sync(listing).await;
    assert_eq!(result.updated, 1);
    assert_eq!(h.record(&record.id).await.status, CacheStatus::Running);
}

#[tokio::test]
async fn unreferenced_removal_soft_deletes_and_purges() {
    let mut h = Harness::new(ProviderKind::Aliyun).await;
    h.sync(vec![remote("x", "office", &["10.0.0.0/8"])]).await;
    h.drain().await;
    let record = h.by_external_id("x").await;
    assert_eq!(record.status, CacheStatus::Running);

    let result = h.sync(vec![]).await;
    assert_eq!(result.deleted, 1);

    let after = h.record(&record.id).await;
    assert!(after.pending_deleted);
    assert_eq!(after.status, CacheStatus::Deleting);
    assert!(h.live_records().await.is_empty());

    let calls = h.driver.call_count();
    assert_eq!(h.drain().await, 1);
    assert_eq!(h.record(&record.id).await.status, CacheStatus::Deleted);
    assert_eq!(h.driver.call_count(), calls, "purge must not reach the cloud");
}

#[tokio::test]
async fn common_update_syncs_name_and_metadata_for_named_providers() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    h.sync(vec![remote("x", "office", &["10.0.0.0/8"])]).await;

    h.sync(vec![
        remote("x", "office-renamed", &["10.0.0.0/8"]).with_metadata("owner", "netops"),
    ])
    .await;

    let record = h.by_external_id("x").await;
    assert_eq!(record.name, "office-renamed");
    assert_eq!(record.metadata.get("owner").map(String::as_str), Some("netops"));
}

#[tokio::test]
async fn listener_scoped_update_rebinds_listener_and_keeps_name() {
    let h = Harness::new(ProviderKind::Huawei).await;
    let first = h.listener("lis-1").await;
    let second = h.listener("lis-2").await;
    h.sync(vec![
        remote("x", "", &["10.0.0.0/8"]).with_listener("lis-1"),
    ])
    .await;
    let before = h.by_external_id("x").await;
    assert_eq!(before.listener_id.as_deref(), Some(first.id.as_str()));

    let result = h
        .sync(vec![
            remote("x", "remote-name", &["10.0.0.0/8"]).with_listener("lis-2"),
        ])
        .await;

    assert_eq!(result.updated, 1);
    let after = h.by_external_id("x").await;
    assert_eq!(after.listener_id.as_deref(), Some(second.id.as_str()));
    assert_eq!(after.name, before.name);
}

#[tokio::test]
async fn replacing_acl_on_referenced_listener_leaves_old_binding_untouched() {
    let h = Harness::new(ProviderKind::Huawei).await;
    h.listener("lis-1").await;
    h.sync(vec![remote("x", "", &["10.0.0.0/8"]).with_listener("lis-1")])
        .await;
    let before = h.by_external_id("x").await;
    h.storage
        .insert_listener(
            aclcache_storage::LoadbalancerListener::new("web", "lis-web", &h.provider, &h.region.id)
                .with_acl(&before.id),
        )
        .await
        .unwrap();

    let result = h
        .sync(vec![
            remote("y", "", &["172.16.0.0/12"]).with_listener("lis-1"),
        ])
        .await;

    assert_eq!(result.delete_errors, 1);
    assert_eq!(result.added, 0);
    assert_eq!(result.add_errors, 1);
    assert!(result.error_for("y").unwrap().message.contains("Duplicate"));

    let after = h.record(&before.id).await;
    assert_eq!(after.canonical_acl_id, before.canonical_acl_id);
    assert_eq!(after.name, before.name);
    assert_eq!(after.external_id, "x");
    assert_eq!(after.status, CacheStatus::Unknown);
}

#[tokio::test]
async fn rebinding_onto_a_listener_held_elsewhere_is_an_update_error() {
    let h = Harness::new(ProviderKind::Huawei).await;
    let first = h.listener("lis-1").await;
    h.listener("lis-2").await;
    h.sync(vec![
        remote("x", "", &["10.0.0.0/8"]).with_listener("lis-1"),
        remote("y", "", &["172.16.0.0/12"]).with_listener("lis-2"),
    ])
    .await;
    let x = h.by_external_id("x").await;

    let result = h
        .sync(vec![
            remote("x", "", &["10.0.0.0/8"]).with_listener("lis-2"),
            remote("y", "", &["172.16.0.0/12"]).with_listener("lis-2"),
        ])
        .await;

    assert_eq!(result.updated, 1);
    assert_eq!(result.update_errors, 1);
    assert!(result.error_for(&x.id).unwrap().message.contains("Duplicate"));
    assert_eq!(
        h.record(&x.id).await.listener_id.as_deref(),
        Some(first.id.as_str())
    );
}

#[tokio::test]
async fn unknown_bound_listener_is_an_item_error() {
    let h = Harness::new(ProviderKind::Huawei).await;
    h.listener("lis-1").await;

    let result = h
        .sync(vec![
            remote("x", "", &["10.0.0.0/8"]).with_listener("lis-1"),
            remote("y", "", &["10.1.0.0/16"]).with_listener("lis-missing"),
        ])
        .await;

    assert_eq!(result.added, 1);
    assert_eq!(result.add_errors, 1);
    assert!(result.error_for("y").unwrap().message.contains("not found"));

    let result = h
        .sync(vec![remote("x", "", &["10.0.0.0/8"]).with_listener("lis-gone")])
        .await;
    assert_eq!(result.update_errors, 1);
}

#[tokio::test]
async fn transient_store_error_only_fails_its_item() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    let listing = vec![
        remote("acl-a", "a", &["10.0.0.0/8"]),
        remote("acl-b", "b", &["172.16.0.0/12"]),
    ];

    h.memory.fail_next(FaultOp::InsertCachedAcl, 1);
    let first = h.sync(listing.clone()).await;
    assert_eq!(first.added, 1);
    assert_eq!(first.add_errors, 1);
    assert!(first.errors[0].message.contains("injected fault"));

    let second = h.sync(listing).await;
    assert_eq!(second.added, 1);
    assert_eq!(second.updated, 1);
    assert!(second.is_ok());
    assert_eq!(h.live_records().await.len(), 2);
}

#[tokio::test]
async fn bulk_load_failure_aborts_the_pass() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    h.memory.fail_next(FaultOp::FindCachedAcls, 1);

    let err = h
        .cache
        .manager
        .sync_loadbalancer_acls(
            &h.cred,
            &h.provider,
            &h.region,
            vec![remote("acl-a", "a", &["10.0.0.0/8"])],
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("injected fault"));
    assert!(h.live_records().await.is_empty());
}

#[tokio::test]
async fn duplicate_remote_ids_abort_the_pass() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    let err = h
        .cache
        .manager
        .sync_loadbalancer_acls(
            &h.cred,
            &h.provider,
            &h.region,
            vec![
                remote("acl-a", "a", &["10.0.0.0/8"]),
                remote("acl-a", "a", &["10.0.0.0/8"]),
            ],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("duplicate remote key"));
}

#[tokio::test]
async fn sync_from_cloud_lists_through_the_driver() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    h.driver
        .seed(&h.provider, &h.region, remote("acl-a", "a", &["10.0.0.0/8"]));

    let result = h
        .cache
        .manager
        .sync_from_cloud(&h.cred, &h.provider, &h.region)
        .await
        .unwrap();
    assert_eq!(result.added, 1);

    h.driver.fail_next(1);
    assert!(
        h.cache
            .manager
            .sync_from_cloud(&h.cred, &h.provider, &h.region)
            .await
            .is_err()
    );
    let listed = h.driver.list_acls(&h.provider, &h.region).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn full_task_queue_counts_against_the_item() {
    let mut config = AppConfig::default();
    config.tasks.queue_capacity = 1;
    let h = Harness::with_config(ProviderKind::Aliyun, &config).await;

    let result = h
        .sync(vec![
            remote("acl-a", "a", &["10.0.0.0/8"]),
            remote("acl-b", "b", &["172.16.0.0/12"]),
        ])
        .await;

    assert_eq!(result.added, 1);
    assert_eq!(result.add_errors, 1);
    assert!(result.errors[0].message.contains("queue is full"));
    // The record exists; only its Create task was not queued.
    assert_eq!(h.live_records().await.len(), 2);
}

#[tokio::test]
async fn local_record_awaiting_create_is_adopted() {
    let h = Harness::new(ProviderKind::Aliyun).await;
    let canonical = h
        .cache
        .manager
        .canonical_store()
        .resolve(&entries(&["10.0.0.0/8"]), "office", &h.cred)
        .await
        .unwrap();
    let local = h
        .cache
        .manager
        .get_or_create_cached_acl(&h.provider, &h.region.id, None, &canonical)
        .await
        .unwrap();
    assert!(local.external_id.is_empty());

    let result = h.sync(vec![remote("acl-a", "office", &["10.0.0.0/8"])]).await;

    assert_eq!(result.added, 1);
    let adopted = h.by_external_id("acl-a").await;
    assert_eq!(adopted.id, local.id);
    assert_eq!(h.live_records().await.len(), 1);
}

#[tokio::test]
async fn pass_writes_the_ops_log() {
    let broadcaster = EventBroadcaster::new_shared();
    let mut rx = broadcaster.subscribe();
    let memory = Arc::new(InMemoryStorage::new());
    let storage: DynStorage = Arc::new(EventedStorage::new(InMemoryStorage::new(), broadcaster));
    let h = Harness::on_storage(ProviderKind::Aliyun, &AppConfig::default(), memory, storage).await;

    h.sync(vec![remote("acl-a", "a", &["10.0.0.0/8"])]).await;
    let record = h.by_external_id("acl-a").await;

    let mut created = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if ev.event_type == RecordEventType::Created {
            created.push(ev.keyword);
        }
    }
    assert_eq!(created, ["loadbalanceracl", "cachedloadbalanceracl"]);

    h.sync(vec![]).await;
    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        assert_eq!(ev.record_id, record.id);
        kinds.push(ev.event_type);
    }
    assert!(kinds.contains(&RecordEventType::StatusChanged));
    assert!(kinds.contains(&RecordEventType::PendingDeleted));
}
