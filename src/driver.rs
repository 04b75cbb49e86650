//! End-to-end run: snapshot the source, clone it, exercise the clone, and
//! clean up.
//!
//! Every resource is tracked in a [`CleanupLedger`] as soon as it exists and
//! the ledger is released on every exit path after `init`, so an early
//! failure still deletes what the run created. Cleanup failures are logged
//! and reported in the outcome but never replace the primary error.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::backend::Connect;
use crate::cleanup::{CleanupLedger, CleanupReport, ResourceKind};
use crate::openstack::{CinderClient, ManilaClient};
use crate::orchestrator::{
    CloneError, CloneOrchestrator, ClonePlan, CloneReport, DEFAULT_SETTLE_DELAY,
};
use crate::store::{
    BlockStore, CloneMethod, ResourceStore, ShareStore, SnapshotRequest, StorageKind, StoreError,
};

/// Metadata key marking snapshots taken of the source volume.
pub const CREATED_BY_TAG: &str = "created_by";
const CREATED_BY: &str = "stackclone";

/// Timeout applied to every wait of a run.
pub const RUN_TIMEOUT: &str = "20m";

/// Parameters of a single run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunRequest {
    /// Backend to exercise.
    pub storage: StorageKind,
    /// Source volume or share.
    pub volume_id: String,
    /// Snapshots to take of the clone.
    pub snapshots: usize,
    /// Resynchronise and promote the replica.
    pub sync: bool,
    /// Region hint.
    pub region: Option<String>,
    /// Zone for the clone and the replica.
    pub zone: Option<String>,
    /// Snapshot method; only `clone` runs the clone flows.
    pub method: String,
}

impl RunRequest {
    /// Checks that the request names a source volume.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when the volume id is blank.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.volume_id.trim().is_empty() {
            return Err(DriverError::Config(String::from(
                "source volume id must be set",
            )));
        }
        Ok(())
    }

    /// Builds the store configuration map for this run.
    #[must_use]
    pub fn store_config(&self) -> BTreeMap<String, String> {
        let region = self.region.clone().unwrap_or_default();
        [
            ("cascadeDelete", String::from("true")),
            ("cloneTimeout", String::from(RUN_TIMEOUT)),
            ("enforceAZ", String::from("true")),
            ("ensureDeleted", String::from("true")),
            ("ensureDeletedDelay", String::from("10s")),
            ("method", self.method.clone()),
            ("region", region),
            ("replicaTimeout", String::from(RUN_TIMEOUT)),
            ("shareTimeout", String::from(RUN_TIMEOUT)),
            ("snapshotTimeout", String::from(RUN_TIMEOUT)),
            ("backupTimeout", String::from(RUN_TIMEOUT)),
            ("imageTimeout", String::from(RUN_TIMEOUT)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
    }

    /// Returns the clone flow plan for this run.
    #[must_use]
    pub fn plan(&self) -> ClonePlan {
        ClonePlan {
            snapshots: self.snapshots,
            sync: self.sync,
            zone: self.zone.clone(),
        }
    }
}

/// Errors raised by a run.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Raised when the request is invalid.
    #[error("{0}")]
    Config(String),
    /// Raised when the store cannot be initialised.
    #[error("error initialising the {backend} store")]
    Init {
        /// Backend being initialised.
        backend: StorageKind,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Raised when the source snapshot cannot be created.
    #[error("failed to create a snapshot of {volume_id}")]
    Snapshot {
        /// Source volume.
        volume_id: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Raised when the clone cannot be created.
    #[error("failed to create a volume from snapshot {snapshot_id}")]
    Clone {
        /// Source snapshot.
        snapshot_id: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Raised when the clone flow fails.
    #[error(transparent)]
    Flow(#[from] CloneError),
}

/// Result of a successful run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOutcome {
    /// Snapshot of the source volume.
    pub snapshot_id: String,
    /// Volume cloned from that snapshot.
    pub volume_id: String,
    /// Clone flow results, absent when the method is not `clone`.
    pub clone: Option<CloneReport>,
    /// Deletions performed at the end of the run.
    pub cleanup: CleanupReport,
}

/// Boxes the OpenStack-backed store for `kind`.
#[must_use]
pub fn select_store<C>(kind: StorageKind, connector: C) -> Box<dyn ResourceStore>
where
    C: Connect<CinderClient> + Connect<ManilaClient> + 'static,
{
    match kind {
        StorageKind::Block => Box::new(BlockStore::<C, CinderClient>::new(connector)),
        StorageKind::Share => Box::new(ShareStore::<C, ManilaClient>::new(connector)),
    }
}

/// Runs the snapshot, clone, and cleanup sequence against one store.
pub struct Driver {
    store: Box<dyn ResourceStore>,
    settle_delay: Duration,
}

impl Driver {
    /// Creates a driver around an uninitialised store.
    #[must_use]
    pub fn new(store: Box<dyn ResourceStore>) -> Self {
        Self {
            store,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Overrides the pause taken at the end of the block flow.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Executes `request`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] for the first failing step. Resources created
    /// before the failure have already been released when this returns.
    pub async fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, DriverError> {
        request.validate()?;
        let backend = self.store.kind();
        self.store
            .init(&request.store_config())
            .await
            .map_err(|source| DriverError::Init { backend, source })?;

        let mut ledger = CleanupLedger::new();
        let result = self.execute(request, &mut ledger).await;
        let cleanup = ledger.release(self.store.as_ref()).await;
        if !cleanup.is_clean() {
            warn!(failed = cleanup.failed.len(), "cleanup left resources behind");
        }
        if let Err(err) = &result {
            error!(error = %crate::error_chain(err), "run failed");
        }
        result.map(|(snapshot_id, volume_id, clone)| RunOutcome {
            snapshot_id,
            volume_id,
            clone,
            cleanup,
        })
    }

    async fn execute(
        &self,
        request: &RunRequest,
        ledger: &mut CleanupLedger,
    ) -> Result<(String, String, Option<CloneReport>), DriverError> {
        let store = self.store.as_ref();
        match store.is_volume_ready(&request.volume_id).await {
            Ok(true) => {}
            Ok(false) => warn!(volume_id = %request.volume_id, "source is not available"),
            Err(err) => warn!(
                volume_id = %request.volume_id,
                error = %err,
                "failed to check the source status"
            ),
        }

        let source_snapshot =
            SnapshotRequest::new(request.volume_id.clone()).tag(CREATED_BY_TAG, CREATED_BY);
        let snapshot_id = store
            .create_snapshot(&source_snapshot)
            .await
            .map_err(|source| DriverError::Snapshot {
                volume_id: request.volume_id.clone(),
                source,
            })?;
        ledger.track(ResourceKind::Snapshot, snapshot_id.clone());

        let volume_id = match store
            .create_volume_from_snapshot(&snapshot_id, None, request.zone.as_deref(), None)
            .await
        {
            Ok(volume_id) => volume_id,
            Err(source) => {
                if let Some(orphan) = source.orphaned_volume() {
                    ledger.track(ResourceKind::Volume, orphan);
                }
                return Err(DriverError::Clone {
                    snapshot_id,
                    source,
                });
            }
        };
        ledger.track(ResourceKind::Volume, volume_id.clone());
        info!(snapshot_id = %snapshot_id, volume_id = %volume_id, "volume cloned");

        if store.settings().method != CloneMethod::Clone {
            info!(method = %store.settings().method, "skipping the clone flow");
            return Ok((snapshot_id, volume_id, None));
        }

        let report = CloneOrchestrator::new(store)
            .with_settle_delay(self.settle_delay)
            .run(&request.plan(), &volume_id, ledger)
            .await?;
        Ok((snapshot_id, volume_id, Some(report)))
    }
}
