//! Multi-step clone flows built from store operations.
//!
//! Both flows snapshot the freshly cloned volume `N` times, firing every
//! create before awaiting any of them, then wait on each in creation order.
//! The share flow continues with a replica that is optionally resynchronised
//! and promoted. The first failing step aborts the flow; nothing is rolled
//! back here because every created resource is already in the caller's
//! [`CleanupLedger`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::cleanup::{CleanupLedger, ResourceKind};
use crate::store::{ResourceStore, SnapshotRequest, StorageKind, StoreError};

/// Pause after the block flow so the backend settles before cleanup.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// What a clone flow should do beyond the initial clone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClonePlan {
    /// Number of snapshots to take of the cloned volume.
    pub snapshots: usize,
    /// Resynchronise and promote the replica (share flow only).
    pub sync: bool,
    /// Target zone for the replica.
    pub zone: Option<String>,
}

/// Step of a clone flow, reported with failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloneStage {
    /// Waiting for the cloned volume to become available.
    VolumeWait,
    /// Requesting a snapshot of the cloned volume.
    Snapshot,
    /// Waiting for a snapshot to become available.
    SnapshotWait,
    /// Requesting the replica.
    Replica,
    /// Waiting for the replica to become available.
    ReplicaWait,
    /// Requesting a replica resync.
    Resync,
    /// Waiting for the replica to report `in_sync`.
    SyncWait,
    /// Requesting the replica promotion.
    Promote,
    /// Waiting for the replica to report `active`.
    ActiveWait,
}

impl fmt::Display for CloneStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::VolumeWait => "volume wait",
            Self::Snapshot => "snapshot",
            Self::SnapshotWait => "snapshot wait",
            Self::Replica => "replica creation",
            Self::ReplicaWait => "replica wait",
            Self::Resync => "replica resync",
            Self::SyncWait => "replica sync wait",
            Self::Promote => "replica promotion",
            Self::ActiveWait => "replica active wait",
        };
        f.write_str(label)
    }
}

/// Failure of a clone flow.
#[derive(Debug, Error)]
#[error("clone flow failed during {stage} of {id}")]
pub struct CloneError {
    /// Step that failed.
    pub stage: CloneStage,
    /// Resource the step worked on.
    pub id: String,
    /// Store failure.
    #[source]
    pub source: StoreError,
}

impl CloneError {
    fn at(stage: CloneStage, id: &str) -> impl FnOnce(StoreError) -> Self {
        let owned_id = id.to_owned();
        move |source| {
            error!(stage = %stage, id = %owned_id, error = %source, "clone flow aborted");
            Self {
                stage,
                id: owned_id,
                source,
            }
        }
    }
}

/// Resources a completed flow created.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CloneReport {
    /// Snapshots of the cloned volume, in creation order.
    pub snapshots: Vec<String>,
    /// Replica created by the share flow.
    pub replica: Option<String>,
}

/// Sequences store operations into the block and share clone flows.
pub struct CloneOrchestrator<'a> {
    store: &'a dyn ResourceStore,
    settle_delay: Duration,
}

impl<'a> CloneOrchestrator<'a> {
    /// Creates an orchestrator driving `store`.
    #[must_use]
    pub const fn new(store: &'a dyn ResourceStore) -> Self {
        Self {
            store,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Overrides the pause taken after the block flow.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Runs the flow matching the store's backend against `volume_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError`] naming the first step that failed.
    pub async fn run(
        &self,
        plan: &ClonePlan,
        volume_id: &str,
        ledger: &mut CleanupLedger,
    ) -> Result<CloneReport, CloneError> {
        match self.store.kind() {
            StorageKind::Block => self.block_flow(plan, volume_id, ledger).await,
            StorageKind::Share => self.share_flow(plan, volume_id, ledger).await,
        }
    }

    async fn block_flow(
        &self,
        plan: &ClonePlan,
        volume_id: &str,
        ledger: &mut CleanupLedger,
    ) -> Result<CloneReport, CloneError> {
        self.store
            .wait_for_volume_status(volume_id)
            .await
            .map_err(CloneError::at(CloneStage::VolumeWait, volume_id))?;
        let snapshots = self.snapshot_batch(plan, volume_id, ledger).await?;
        info!(
            volume_id,
            delay_secs = self.settle_delay.as_secs(),
            "block flow finished, settling"
        );
        sleep(self.settle_delay).await;
        Ok(CloneReport {
            snapshots,
            replica: None,
        })
    }

    async fn share_flow(
        &self,
        plan: &ClonePlan,
        volume_id: &str,
        ledger: &mut CleanupLedger,
    ) -> Result<CloneReport, CloneError> {
        let snapshots = self.snapshot_batch(plan, volume_id, ledger).await?;

        let replica_id = self
            .store
            .create_replica(volume_id, plan.zone.as_deref())
            .await
            .map_err(CloneError::at(CloneStage::Replica, volume_id))?;
        ledger.track(ResourceKind::Replica, replica_id.clone());
        self.store
            .wait_for_replica_status(&replica_id)
            .await
            .map_err(CloneError::at(CloneStage::ReplicaWait, &replica_id))?;
        info!(replica_id = %replica_id, "replica available");

        if plan.sync {
            self.store
                .resync_replica(&replica_id)
                .await
                .map_err(CloneError::at(CloneStage::Resync, &replica_id))?;
            self.store
                .wait_for_replica_sync_state(&replica_id)
                .await
                .map_err(CloneError::at(CloneStage::SyncWait, &replica_id))?;
            info!(replica_id = %replica_id, "replica in sync");
            self.store
                .promote_replica(&replica_id)
                .await
                .map_err(CloneError::at(CloneStage::Promote, &replica_id))?;
            self.store
                .wait_for_replica_active_state(&replica_id)
                .await
                .map_err(CloneError::at(CloneStage::ActiveWait, &replica_id))?;
            info!(replica_id = %replica_id, zone = plan.zone.as_deref(), "replica promoted");
            self.reschedule_replica_cleanup(volume_id, &replica_id, ledger)
                .await;
        }

        Ok(CloneReport {
            snapshots,
            replica: Some(replica_id),
        })
    }

    /// The promoted replica is now active and cannot be deleted; the former
    /// primary is released in its place.
    async fn reschedule_replica_cleanup(
        &self,
        share_id: &str,
        promoted_id: &str,
        ledger: &mut CleanupLedger,
    ) {
        match self.store.inactive_replicas(share_id).await {
            Ok(inactive) => ledger.retarget(ResourceKind::Replica, promoted_id, inactive),
            Err(err) => warn!(
                share_id,
                replica_id = promoted_id,
                error = %err,
                "failed to list replicas; keeping the promoted replica scheduled"
            ),
        }
    }

    /// Creates every snapshot first, then waits on each in creation order.
    async fn snapshot_batch(
        &self,
        plan: &ClonePlan,
        volume_id: &str,
        ledger: &mut CleanupLedger,
    ) -> Result<Vec<String>, CloneError> {
        let mut created = Vec::new();
        for index in 1..=plan.snapshots {
            let request = SnapshotRequest::new(volume_id)
                .zone(plan.zone.clone())
                .name(format!("test snapshot from {volume_id} {index}"));
            let snapshot_id = self
                .store
                .create_snapshot(&request)
                .await
                .map_err(CloneError::at(CloneStage::Snapshot, volume_id))?;
            ledger.track(ResourceKind::Snapshot, snapshot_id.clone());
            created.push(snapshot_id);
        }
        for snapshot_id in &created {
            self.store
                .wait_for_snapshot_status(snapshot_id)
                .await
                .map_err(CloneError::at(CloneStage::SnapshotWait, snapshot_id))?;
            info!(snapshot_id = %snapshot_id, "snapshot available");
        }
        Ok(created)
    }
}
