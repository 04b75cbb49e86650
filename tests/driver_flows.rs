//! End-to-end driver runs against the scripted cloud.

use std::time::Duration;

use rstest::rstest;
use stackclone::test_support::ScriptedCloud;
use stackclone::{
    ApiError, BlockStore, CREATED_BY_TAG, CloneStage, Driver, DriverError, ShareStore,
    StorageKind, StoreError,
};

#[path = "common/run_request.rs"]
mod run_request;

use run_request::run_request;

fn block_driver(cloud: &ScriptedCloud) -> Driver {
    Driver::new(Box::new(BlockStore::<_, ScriptedCloud>::new(cloud.clone())))
        .with_settle_delay(Duration::ZERO)
}

fn share_driver(cloud: &ScriptedCloud) -> Driver {
    Driver::new(Box::new(ShareStore::<_, ScriptedCloud>::new(cloud.clone())))
}

#[tokio::test(start_paused = true)]
async fn block_run_clones_snapshots_and_cleans_up() {
    let cloud = ScriptedCloud::new().with_volume("vol-1", Some("ssd"));
    let mut request = run_request(StorageKind::Block, "vol-1");
    request.snapshots = 2;

    let outcome = block_driver(&cloud)
        .run(&request)
        .await
        .expect("block run succeeds");

    assert_eq!(outcome.snapshot_id, "snap-1");
    assert_eq!(outcome.volume_id, "vol-2");
    let report = outcome.clone.expect("clone flow ran");
    assert_eq!(report.snapshots, vec!["snap-2", "snap-3"]);
    assert!(outcome.cleanup.is_clean());
    assert_eq!(cloud.deleted(), vec!["snap-3", "snap-2", "vol-2", "snap-1"]);
    assert!(cloud.calls().contains(&String::from("delete_volume vol-2 cascade")));
    let source_snapshot = cloud.created_snapshots();
    assert_eq!(
        source_snapshot
            .first()
            .and_then(|request| request.metadata.get(CREATED_BY_TAG))
            .map(String::as_str),
        Some("stackclone")
    );
    let created = cloud.created_volumes();
    assert_eq!(created.len(), 1);
    assert_eq!(
        created.first().map(|volume| volume.snapshot_id.as_str()),
        Some("snap-1")
    );
}

#[tokio::test(start_paused = true)]
async fn share_run_promotes_the_replica_and_cleans_up() {
    let cloud = ScriptedCloud::new().with_share(
        "share-1",
        &[("team", "storage")],
        &[("ip", "10.0.0.1", "rw")],
    );
    let mut request = run_request(StorageKind::Share, "share-1");
    request.sync = true;

    let outcome = share_driver(&cloud)
        .run(&request)
        .await
        .expect("share run succeeds");

    assert_eq!(outcome.snapshot_id, "snap-1");
    assert_eq!(outcome.volume_id, "share-2");
    let report = outcome.clone.expect("clone flow ran");
    assert_eq!(report.snapshots, vec!["snap-2"]);
    assert_eq!(report.replica.as_deref(), Some("repl-1"));
    assert!(outcome.cleanup.is_clean());
    assert_eq!(
        cloud.deleted(),
        vec!["share-2-primary", "snap-2", "share-2", "snap-1"]
    );
    assert_eq!(cloud.grants().len(), 1);
    let calls = cloud.calls();
    assert!(calls.contains(&String::from("resync_replica repl-1")));
    assert!(calls.contains(&String::from("promote_replica repl-1")));
    assert!(!calls.contains(&String::from("delete_replica repl-1")));
}

#[tokio::test(start_paused = true)]
async fn failed_clone_still_deletes_the_source_snapshot() {
    let cloud = ScriptedCloud::new().with_volume("vol-1", None);
    cloud.fail_action("create_volume");

    let err = block_driver(&cloud)
        .run(&run_request(StorageKind::Block, "vol-1"))
        .await
        .expect_err("clone fails");

    assert!(matches!(err, DriverError::Clone { ref snapshot_id, .. } if snapshot_id == "snap-1"));
    assert_eq!(cloud.deleted(), vec!["snap-1"]);
}

#[tokio::test(start_paused = true)]
async fn failed_grant_deletes_the_orphaned_share() {
    let cloud = ScriptedCloud::new().with_share("share-1", &[], &[("ip", "10.0.0.1", "rw")]);
    cloud.fail_action("grant_access");

    let err = share_driver(&cloud)
        .run(&run_request(StorageKind::Share, "share-1"))
        .await
        .expect_err("grant fails");

    assert!(matches!(err, DriverError::Clone { .. }));
    assert_eq!(cloud.deleted(), vec!["share-2", "snap-1"]);
}

#[tokio::test(start_paused = true)]
async fn flow_failure_releases_everything_created() {
    let cloud = ScriptedCloud::new().with_share("share-1", &[], &[("ip", "10.0.0.1", "rw")]);
    cloud.fail_action("promote_replica");
    let mut request = run_request(StorageKind::Share, "share-1");
    request.sync = true;

    let err = share_driver(&cloud)
        .run(&request)
        .await
        .expect_err("promotion fails");

    let DriverError::Flow(flow) = err else {
        panic!("expected a flow failure, got {err:?}");
    };
    assert_eq!(flow.stage, CloneStage::Promote);
    assert_eq!(cloud.deleted(), vec!["repl-1", "snap-2", "share-2", "snap-1"]);
}

#[rstest]
#[case::block(StorageKind::Block, "vol-1")]
#[case::share(StorageKind::Share, "share-1")]
#[tokio::test(start_paused = true)]
async fn other_methods_skip_the_clone_flow(#[case] storage: StorageKind, #[case] source: &str) {
    let cloud = ScriptedCloud::new()
        .with_volume("vol-1", None)
        .with_share("share-1", &[], &[]);
    let mut request = run_request(storage, source);
    request.method = String::from("backup");
    let mut driver = match storage {
        StorageKind::Block => block_driver(&cloud),
        StorageKind::Share => share_driver(&cloud),
    };

    let outcome = driver.run(&request).await.expect("run succeeds");

    assert_eq!(outcome.clone, None);
    assert_eq!(cloud.deleted().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn init_failure_creates_nothing() {
    let cloud = ScriptedCloud::new()
        .with_connect_failure(ApiError::Auth(String::from("invalid credentials")));

    let err = block_driver(&cloud)
        .run(&run_request(StorageKind::Block, "vol-1"))
        .await
        .expect_err("init fails");

    assert!(matches!(
        err,
        DriverError::Init {
            backend: StorageKind::Block,
            source: StoreError::Connect { .. },
        }
    ));
    assert!(cloud.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn blank_volume_id_is_rejected_before_init() {
    let cloud = ScriptedCloud::new();

    let err = block_driver(&cloud)
        .run(&run_request(StorageKind::Block, " "))
        .await
        .expect_err("validation fails");

    assert_eq!(err.to_string(), "source volume id must be set");
    assert!(cloud.regions().is_empty());
}
