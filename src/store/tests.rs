//! Unit tests for the block and share stores.

use std::collections::BTreeMap;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::backend::{ApiError, GrantAccess};
use crate::microversion::Microversion;
use crate::test_support::ScriptedCloud;

type ScriptedBlockStore = BlockStore<ScriptedCloud, ScriptedCloud>;
type ScriptedShareStore = ShareStore<ScriptedCloud, ScriptedCloud>;

fn config(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[fixture]
fn block_cloud() -> ScriptedCloud {
    ScriptedCloud::new().with_volume("vol-1", Some("ssd"))
}

#[fixture]
fn share_cloud() -> ScriptedCloud {
    ScriptedCloud::new().with_share(
        "share-1",
        &[("team", "storage")],
        &[("ip", "10.0.0.0/24", "rw"), ("ip", "10.0.1.0/24", "ro")],
    )
}

async fn block_store(cloud: &ScriptedCloud, pairs: &[(&str, &str)]) -> ScriptedBlockStore {
    let mut store = ScriptedBlockStore::new(cloud.clone());
    store.init(&config(pairs)).await.expect("block store init");
    store
}

async fn share_store(cloud: &ScriptedCloud, pairs: &[(&str, &str)]) -> ScriptedShareStore {
    let mut store = ScriptedShareStore::new(cloud.clone());
    store.init(&config(pairs)).await.expect("share store init");
    store
}

#[tokio::test(start_paused = true)]
async fn operations_before_init_are_rejected() {
    let store = ScriptedBlockStore::new(ScriptedCloud::new());
    let err = store
        .create_snapshot(&SnapshotRequest::new("vol-1"))
        .await
        .expect_err("store is not initialised");
    assert!(matches!(err, StoreError::NotInitialised));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn init_connects_once_unless_a_cloud_is_named(block_cloud: ScriptedCloud) {
    let mut store = ScriptedBlockStore::new(block_cloud.clone());
    store
        .init(&config(&[("region", "RegionTwo")]))
        .await
        .expect("first init");
    store.init(&config(&[])).await.expect("second init");
    assert_eq!(block_cloud.regions(), vec![Some(String::from("RegionTwo"))]);

    store
        .init(&config(&[("cloud", "other")]))
        .await
        .expect("re-init against another cloud");
    assert_eq!(block_cloud.regions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn connect_failures_name_the_service() {
    let cloud = ScriptedCloud::new().with_connect_failure(ApiError::Auth(String::from("denied")));
    let mut store = ScriptedShareStore::new(cloud);
    let err = store
        .init(&config(&[]))
        .await
        .expect_err("connect fails");
    assert!(matches!(
        err,
        StoreError::Connect {
            service: "shared filesystem",
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn invalid_settings_fail_init() {
    let mut store = ScriptedBlockStore::new(ScriptedCloud::new());
    let err = store
        .init(&config(&[("volumeTimeout", "forever")]))
        .await
        .expect_err("invalid timeout");
    assert!(matches!(err, StoreError::Config(_)));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn block_snapshot_carries_tags_and_name(block_cloud: ScriptedCloud) {
    let store = block_store(&block_cloud, &[]).await;
    let snapshot_id = store
        .create_snapshot(
            &SnapshotRequest::new("vol-1")
                .tag("purpose", "test")
                .name("nightly"),
        )
        .await
        .expect("snapshot created");
    assert_eq!(snapshot_id, "snap-1");
    assert_eq!(block_cloud.calls(), vec![String::from("create_snapshot vol-1")]);
    let requests = block_cloud.created_snapshots();
    let request = requests.first().expect("one snapshot request");
    assert_eq!(request.name, "nightly");
    assert!(request.force);
    assert_eq!(
        request.metadata.get("purpose").map(String::as_str),
        Some("test")
    );
}

#[rstest]
#[case::enforced("true", Some("zone-b"))]
#[case::not_enforced("false", None)]
#[tokio::test(start_paused = true)]
async fn block_clone_sends_zone_only_when_enforced(
    block_cloud: ScriptedCloud,
    #[case] enforce: &str,
    #[case] expected_zone: Option<&str>,
) {
    let store = block_store(&block_cloud, &[("enforceAZ", enforce)]).await;
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("vol-1"))
        .await
        .expect("snapshot created");
    let volume_id = store
        .create_volume_from_snapshot(&snapshot_id, Some("ssd"), Some("zone-b"), Some(3000))
        .await
        .expect("volume created");
    assert_eq!(volume_id, "vol-2");
    let requests = block_cloud.created_volumes();
    let request = requests.first().expect("one volume request");
    assert_eq!(request.availability_zone.as_deref(), expected_zone);
    assert_eq!(request.volume_type.as_deref(), Some("ssd"));
    assert!(request.name.starts_with("snap-1.backup."));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn block_volume_deletion_honours_cascade_and_confirms_absence(block_cloud: ScriptedCloud) {
    let store = block_store(
        &block_cloud,
        &[("cascadeDelete", "true"), ("ensureDeleted", "true")],
    )
    .await;
    store.delete_volume("vol-1").await.expect("volume deleted");
    assert_eq!(block_cloud.calls(), vec![String::from("delete_volume vol-1 cascade")]);
    assert_eq!(block_cloud.deleted(), vec![String::from("vol-1")]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn block_snapshot_wait_times_out(block_cloud: ScriptedCloud) {
    let mut store =
        ScriptedBlockStore::new(block_cloud.clone()).with_poll_interval(Duration::from_millis(500));
    store
        .init(&config(&[("snapshotTimeout", "3s")]))
        .await
        .expect("block store init");
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("vol-1"))
        .await
        .expect("snapshot created");
    block_cloud.script_status(&snapshot_id, &["creating"]);
    let err = store
        .wait_for_snapshot_status(&snapshot_id)
        .await
        .expect_err("snapshot never settles");
    assert!(err.is_timeout());
    let polls = block_cloud
        .fetches()
        .iter()
        .filter(|id| **id == snapshot_id)
        .count();
    assert_eq!(polls, 7);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn block_volume_readiness(block_cloud: ScriptedCloud) {
    let store = block_store(&block_cloud, &[]).await;
    assert!(store.is_volume_ready("vol-1").await.expect("volume fetched"));
    block_cloud.script_status("vol-1", &["in-use"]);
    assert!(!store.is_volume_ready("vol-1").await.expect("volume fetched"));
    let info = store
        .get_volume_info("vol-1", None)
        .await
        .expect("volume info");
    assert_eq!(info.volume_type.as_deref(), Some("ssd"));
    assert_eq!(info.iops, None);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn block_store_has_no_replicas(block_cloud: ScriptedCloud) {
    let store = block_store(&block_cloud, &[]).await;
    let err = store
        .create_replica("vol-1", Some("zone-b"))
        .await
        .expect_err("replicas unsupported");
    assert!(matches!(
        err,
        StoreError::Unsupported {
            backend: StorageKind::Block,
            ..
        }
    ));
    assert!(matches!(
        store.inactive_replicas("vol-1").await,
        Err(StoreError::Unsupported { .. })
    ));
    store
        .wait_for_replica_status("repl-1")
        .await
        .expect("no-op wait");
    store
        .wait_for_replica_sync_state("repl-1")
        .await
        .expect("no-op wait");
    store
        .wait_for_replica_active_state("repl-1")
        .await
        .expect("no-op wait");
}

#[rstest]
#[case::supports_access_rules(Some("2.45"), Microversion::ACCESS_RULES)]
#[case::newer_endpoint(Some("2.79"), Microversion::ACCESS_RULES)]
#[case::older_endpoint(Some("2.10"), Microversion::MINIMUM)]
#[case::query_fails(None, Microversion::MINIMUM)]
#[case::garbled_version(Some("latest"), Microversion::MINIMUM)]
#[tokio::test(start_paused = true)]
async fn share_init_negotiates_microversion(
    #[case] max: Option<&str>,
    #[case] expected: Microversion,
) {
    let cloud = ScriptedCloud::new().with_max_version(max);
    let store = share_store(&cloud, &[]).await;
    assert_eq!(store.microversion(), expected);
    assert_eq!(cloud.microversion(), Some(expected));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn share_clone_propagates_metadata_and_first_rule(share_cloud: ScriptedCloud) {
    let store = share_store(&share_cloud, &[]).await;
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("share-1"))
        .await
        .expect("snapshot created");
    let share_id = store
        .create_volume_from_snapshot(&snapshot_id, None, Some("zone-b"), None)
        .await
        .expect("share cloned");

    assert_eq!(share_id, "share-2");
    let requests = share_cloud.created_shares();
    let request = requests.first().expect("one share request");
    assert_eq!(request.share_proto, "NFS");
    assert_eq!(request.size, 5);
    assert_eq!(request.availability_zone.as_deref(), Some("zone-b"));
    assert_eq!(request.metadata.get("team").map(String::as_str), Some("storage"));
    assert!(request.name.starts_with("snap-1.backup."));
    assert_eq!(
        share_cloud.grants(),
        vec![(
            String::from("share-2"),
            GrantAccess {
                access_type: String::from("ip"),
                access_to: String::from("10.0.0.0/24"),
                access_level: String::from("rw"),
            },
        )]
    );
    assert!(
        share_cloud
            .calls()
            .contains(&String::from("list_share_access_rules share-1"))
    );
}

#[tokio::test(start_paused = true)]
async fn minimum_microversion_uses_the_legacy_listing() {
    let cloud = ScriptedCloud::new()
        .with_max_version(Some("2.7"))
        .with_share("share-1", &[], &[("cephx", "alice", "rw")]);
    let store = share_store(&cloud, &[]).await;
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("share-1"))
        .await
        .expect("snapshot created");
    store
        .create_volume_from_snapshot(&snapshot_id, None, None, None)
        .await
        .expect("share cloned");
    let calls = cloud.calls();
    assert!(calls.contains(&String::from("list_access_rights share-1")));
    assert!(!calls.iter().any(|call| call.starts_with("list_share_access_rules")));
}

#[tokio::test(start_paused = true)]
async fn share_without_rules_fails_before_creating_anything() {
    let cloud = ScriptedCloud::new().with_share("share-1", &[], &[]);
    let store = share_store(&cloud, &[]).await;
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("share-1"))
        .await
        .expect("snapshot created");
    let err = store
        .create_volume_from_snapshot(&snapshot_id, None, None, None)
        .await
        .expect_err("no access rule");
    assert!(matches!(
        err,
        StoreError::CloneStep {
            step: "fetch access rule",
            ..
        }
    ));
    assert_eq!(err.orphaned_volume(), None);
    assert!(cloud.created_shares().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_grant_reports_the_created_share(share_cloud: ScriptedCloud) {
    share_cloud.fail_action("grant_access");
    let store = share_store(&share_cloud, &[]).await;
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("share-1"))
        .await
        .expect("snapshot created");
    let err = store
        .create_volume_from_snapshot(&snapshot_id, None, None, None)
        .await
        .expect_err("grant fails");
    assert!(matches!(err, StoreError::CloneStep { step: "grant access", .. }));
    assert_eq!(err.orphaned_volume(), Some("share-2"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn share_wait_timeout_names_the_step(share_cloud: ScriptedCloud) {
    share_cloud.script_status("share-2", &["creating"]);
    let store = share_store(&share_cloud, &[("shareTimeout", "5s")]).await;
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("share-1"))
        .await
        .expect("snapshot created");
    let err = store
        .create_volume_from_snapshot(&snapshot_id, None, None, None)
        .await
        .expect_err("share never settles");
    assert!(err.is_timeout());
    assert!(matches!(err, StoreError::CloneStep { step: "wait for share", .. }));
    assert_eq!(err.orphaned_volume(), Some("share-2"));
    assert!(share_cloud.grants().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn replica_is_synced_and_promoted(share_cloud: ScriptedCloud) {
    let store = share_store(&share_cloud, &[("replicaTimeout", "30s")]).await;
    let replica_id = store
        .create_replica("share-1", Some("zone-b"))
        .await
        .expect("replica created");
    assert_eq!(replica_id, "repl-1");
    store
        .wait_for_replica_status(&replica_id)
        .await
        .expect("replica available");
    store.resync_replica(&replica_id).await.expect("resync");
    store
        .wait_for_replica_sync_state(&replica_id)
        .await
        .expect("replica in sync");
    store.promote_replica(&replica_id).await.expect("promote");
    store
        .wait_for_replica_active_state(&replica_id)
        .await
        .expect("replica active");
    assert_eq!(
        share_cloud.calls(),
        vec![
            String::from("create_replica share-1"),
            String::from("resync_replica repl-1"),
            String::from("promote_replica repl-1"),
        ]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn promotion_leaves_the_former_primary_inactive(share_cloud: ScriptedCloud) {
    let store = share_store(&share_cloud, &[("ensureDeleted", "true")]).await;
    let replica_id = store
        .create_replica("share-1", None)
        .await
        .expect("replica created");
    assert_eq!(
        store.inactive_replicas("share-1").await.expect("listed"),
        vec![String::from("repl-1")]
    );
    store
        .delete_volume("share-1")
        .await
        .expect_err("share with replicas is kept");

    store.promote_replica(&replica_id).await.expect("promote");
    assert_eq!(
        store.inactive_replicas("share-1").await.expect("listed"),
        vec![String::from("share-1-primary")]
    );
    store
        .delete_replica(&replica_id)
        .await
        .expect_err("active replica is kept");
    store
        .delete_replica("share-1-primary")
        .await
        .expect("former primary deleted");
    store.delete_volume("share-1").await.expect("share deleted");
    assert_eq!(
        share_cloud.deleted(),
        vec![String::from("share-1-primary"), String::from("share-1")]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn replica_sync_wait_times_out_while_out_of_sync(share_cloud: ScriptedCloud) {
    let mut store =
        ScriptedShareStore::new(share_cloud.clone()).with_poll_interval(Duration::from_secs(2));
    store
        .init(&config(&[("replicaTimeout", "4s")]))
        .await
        .expect("share store init");
    let replica_id = store
        .create_replica("share-1", None)
        .await
        .expect("replica created");
    let err = store
        .wait_for_replica_sync_state(&replica_id)
        .await
        .expect_err("replica never syncs");
    assert!(err.is_timeout());
    let polls = share_cloud
        .fetches()
        .iter()
        .filter(|id| **id == replica_id)
        .count();
    assert_eq!(polls, 3);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn share_deletions_confirm_absence(share_cloud: ScriptedCloud) {
    let store = share_store(&share_cloud, &[("ensureDeleted", "true")]).await;
    let snapshot_id = store
        .create_snapshot(&SnapshotRequest::new("share-1"))
        .await
        .expect("snapshot created");
    let replica_id = store
        .create_replica("share-1", None)
        .await
        .expect("replica created");
    store.delete_replica(&replica_id).await.expect("replica deleted");
    store
        .delete_snapshot(&snapshot_id)
        .await
        .expect("snapshot deleted");
    store.delete_volume("share-1").await.expect("share deleted");
    assert_eq!(
        share_cloud.deleted(),
        vec![
            String::from("repl-1"),
            String::from("snap-1"),
            String::from("share-1"),
        ]
    );
}

#[test]
fn generated_snapshot_names_embed_the_volume() {
    let generated = SnapshotRequest::new("vol-9").snapshot_name();
    assert!(generated.starts_with("vol-9.snap."));
    assert_eq!(
        SnapshotRequest::new("vol-9").name("fixed").snapshot_name(),
        "fixed"
    );
    assert_eq!(StorageKind::Share.to_string(), "manila");
}
