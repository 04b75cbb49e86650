//! Scoped cleanup of resources created during a run.
//!
//! Every resource is recorded the moment its create call succeeds. Releasing
//! the ledger deletes everything in reverse creation order and never stops
//! early: a failed deletion is logged and reported, and the remaining
//! resources are still attempted.

use std::fmt;

use tracing::{info, warn};

use crate::store::ResourceStore;

/// Kind of a tracked resource, selecting the delete operation used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// A volume or share snapshot.
    Snapshot,
    /// A volume or share.
    Volume,
    /// A share replica.
    Replica,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => f.write_str("snapshot"),
            Self::Volume => f.write_str("volume"),
            Self::Replica => f.write_str("replica"),
        }
    }
}

/// A resource awaiting deletion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackedResource {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Backend identifier.
    pub id: String,
}

/// A deletion that failed during release.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CleanupFailure {
    /// Resource that could not be deleted.
    pub resource: TrackedResource,
    /// Rendered error chain.
    pub message: String,
}

/// Outcome of releasing a ledger.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CleanupReport {
    /// Resources deleted, in deletion order.
    pub deleted: Vec<TrackedResource>,
    /// Resources whose deletion failed, in attempt order.
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Returns `true` when every deletion succeeded.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered record of resources created during a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CleanupLedger {
    resources: Vec<TrackedResource>,
}

impl CleanupLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    /// Records a created resource.
    pub fn track(&mut self, kind: ResourceKind, id: impl Into<String>) {
        let resource = TrackedResource {
            kind,
            id: id.into(),
        };
        info!(kind = %resource.kind, id = %resource.id, "scheduled deletion");
        self.resources.push(resource);
    }

    /// Returns the tracked resources in creation order.
    #[must_use]
    pub fn resources(&self) -> &[TrackedResource] {
        &self.resources
    }

    /// Replaces the tracked `kind`/`from` entry with `to`, keeping its
    /// position in the release order. Nothing changes when `from` is not
    /// tracked.
    pub fn retarget(&mut self, kind: ResourceKind, from: &str, to: Vec<String>) {
        let Some(position) = self
            .resources
            .iter()
            .position(|resource| resource.kind == kind && resource.id == from)
        else {
            return;
        };
        info!(kind = %kind, from, to = ?to, "rescheduled deletion");
        let replacements = to.into_iter().map(|id| TrackedResource { kind, id });
        self.resources.splice(position..=position, replacements);
    }

    /// Deletes every tracked resource through `store`, newest first.
    pub async fn release(self, store: &dyn ResourceStore) -> CleanupReport {
        let mut report = CleanupReport::default();
        for resource in self.resources.into_iter().rev() {
            let outcome = match resource.kind {
                ResourceKind::Snapshot => store.delete_snapshot(&resource.id).await,
                ResourceKind::Volume => store.delete_volume(&resource.id).await,
                ResourceKind::Replica => store.delete_replica(&resource.id).await,
            };
            match outcome {
                Ok(()) => {
                    info!(kind = %resource.kind, id = %resource.id, "deleted");
                    report.deleted.push(resource);
                }
                Err(err) => {
                    let message = crate::error_chain(&err);
                    warn!(
                        kind = %resource.kind,
                        id = %resource.id,
                        error = %message,
                        "cleanup failed"
                    );
                    report.failed.push(CleanupFailure { resource, message });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::*;
    use crate::store::{BlockStore, ShareStore};
    use crate::test_support::ScriptedCloud;

    async fn block_store(cloud: &ScriptedCloud) -> BlockStore<ScriptedCloud, ScriptedCloud> {
        let mut store = BlockStore::new(cloud.clone());
        store.init(&BTreeMap::new()).await.expect("init");
        store
    }

    #[tokio::test(start_paused = true)]
    async fn releases_in_reverse_creation_order() {
        let cloud = ScriptedCloud::new().with_volume("vol-1", None);
        let store = block_store(&cloud).await;
        let mut ledger = CleanupLedger::new();
        ledger.track(ResourceKind::Volume, "vol-1");
        ledger.track(ResourceKind::Snapshot, "snap-missing");
        let report = ledger.release(&store).await;

        assert_eq!(
            cloud.calls(),
            vec![
                String::from("delete_snapshot snap-missing"),
                String::from("delete_volume vol-1"),
            ]
        );
        assert_eq!(report.deleted.len(), 1);
        assert!(!report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_release() {
        let cloud = ScriptedCloud::new().with_volume("vol-1", None);
        cloud.fail_action("delete_snapshot");
        let store = block_store(&cloud).await;
        let mut ledger = CleanupLedger::new();
        ledger.track(ResourceKind::Volume, "vol-1");
        ledger.track(ResourceKind::Snapshot, "snap-1");
        let report = ledger.release(&store).await;

        assert_eq!(
            report.deleted,
            vec![TrackedResource {
                kind: ResourceKind::Volume,
                id: String::from("vol-1"),
            }]
        );
        let failure = report.failed.first().expect("one failure");
        assert_eq!(failure.resource.id, "snap-1");
        assert!(failure.message.contains("scripted failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn replicas_are_deleted_through_the_replica_endpoint() {
        let cloud = ScriptedCloud::new().with_share("share-1", &[], &[]);
        let mut store: ShareStore<ScriptedCloud, ScriptedCloud> = ShareStore::new(cloud.clone());
        store.init(&BTreeMap::new()).await.expect("init");
        let replica_id = store
            .create_replica("share-1", None)
            .await
            .expect("replica created");
        let mut ledger = CleanupLedger::new();
        ledger.track(ResourceKind::Replica, replica_id);
        let report = ledger.release(&store).await;

        assert!(report.is_clean());
        assert_eq!(cloud.deleted(), vec![String::from("repl-1")]);
    }

    #[test]
    fn empty_ledger_reports_nothing() {
        let ledger = CleanupLedger::new();
        assert!(ledger.resources().is_empty());
    }

    #[rstest]
    #[case::former_primary(vec![String::from("share-2-primary")], &["snap-1", "share-2-primary", "snap-2"][..])]
    #[case::nothing_inactive(Vec::new(), &["snap-1", "snap-2"][..])]
    fn retargeting_keeps_the_release_position(
        #[case] replacements: Vec<String>,
        #[case] expected: &[&str],
    ) {
        let mut ledger = CleanupLedger::new();
        ledger.track(ResourceKind::Snapshot, "snap-1");
        ledger.track(ResourceKind::Replica, "repl-1");
        ledger.track(ResourceKind::Snapshot, "snap-2");
        ledger.retarget(ResourceKind::Replica, "repl-1", replacements);
        let ids: Vec<&str> = ledger.resources().iter().map(|res| res.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn retargeting_an_untracked_resource_changes_nothing() {
        let mut ledger = CleanupLedger::new();
        ledger.track(ResourceKind::Replica, "repl-1");
        ledger.retarget(ResourceKind::Snapshot, "repl-1", vec![String::from("snap-9")]);
        assert_eq!(ledger.resources().len(), 1);
    }
}
