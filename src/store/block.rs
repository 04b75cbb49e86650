//! Block storage implementation of [`ResourceStore`].

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{ApiError, BlockApi, Connect, CreateVolume, CreateVolumeSnapshot};
use crate::wait::{DEFAULT_POLL_INTERVAL, StatusWaiter};

use super::{
    ResourceStore, SNAPSHOT_DESCRIPTION, SNAPSHOT_READY, SnapshotRequest, StorageKind,
    StoreError, StoreFuture, StoreSettings, VOLUME_READY, VolumeInfo, clone_name,
};

const SERVICE: &str = "block storage";

/// Store backed by the block storage API.
///
/// Replica operations are not available on block storage; the replica waits
/// succeed immediately so the shared orchestration code can call them.
#[derive(Debug)]
pub struct BlockStore<C, A> {
    connector: C,
    api: Option<A>,
    settings: StoreSettings,
    poll_interval: Duration,
}

impl<C, A> BlockStore<C, A>
where
    C: Connect<A>,
    A: BlockApi,
{
    /// Creates an uninitialised store.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            api: None,
            settings: StoreSettings::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the interval between status polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn api(&self) -> Result<&A, StoreError> {
        self.api.as_ref().ok_or(StoreError::NotInitialised)
    }

    const fn waiter(&self, timeout: Duration) -> StatusWaiter {
        StatusWaiter::new(timeout).with_poll_interval(self.poll_interval)
    }

    fn unsupported<T>(operation: &'static str) -> StoreFuture<'static, T>
    where
        T: Send + 'static,
    {
        Box::pin(async move {
            Err(StoreError::Unsupported {
                operation,
                backend: StorageKind::Block,
            })
        })
    }
}

impl<C, A> ResourceStore for BlockStore<C, A>
where
    C: Connect<A>,
    A: BlockApi,
{
    fn kind(&self) -> StorageKind {
        StorageKind::Block
    }

    fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    fn init<'a>(&'a mut self, config: &'a BTreeMap<String, String>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let settings = StoreSettings::from_map(config)?;
            info!(
                region = settings.region.as_deref(),
                cloud = settings.cloud.as_deref(),
                method = %settings.method,
                "initialising block store"
            );
            if self.api.is_none() || settings.cloud.is_some() {
                let api = self
                    .connector
                    .connect(settings.region.as_deref())
                    .await
                    .map_err(|source| StoreError::Connect {
                        service: SERVICE,
                        source,
                    })?;
                self.api = Some(api);
                info!("created block storage client");
            }
            self.settings = settings;
            Ok(())
        })
    }

    fn create_snapshot<'a>(&'a self, request: &'a SnapshotRequest) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let api = self.api()?;
            let name = request.snapshot_name();
            info!(
                volume_id = %request.volume_id,
                zone = request.zone.as_deref(),
                snapshot_name = %name,
                "creating block snapshot"
            );
            let body = CreateVolumeSnapshot {
                volume_id: request.volume_id.clone(),
                name,
                description: String::from(SNAPSHOT_DESCRIPTION),
                force: true,
                metadata: request.tags.clone(),
            };
            let snapshot = api.create_snapshot(&body).await.map_err(|source| {
                StoreError::operation("create snapshot of", request.volume_id.clone(), source)
            })?;
            info!(snapshot_id = %snapshot.id, "block snapshot requested");
            Ok(snapshot.id)
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            info!(snapshot_id, "deleting block snapshot");
            api.delete_snapshot(snapshot_id)
                .await
                .map_err(|source| {
                    StoreError::operation("delete snapshot", snapshot_id.to_owned(), source)
                })?;
            if self.settings.ensure_deleted {
                self.settings
                    .deletion_waiter(self.settings.snapshot_timeout)
                    .wait_for_absence(
                        snapshot_id,
                        || api.get_snapshot(snapshot_id),
                        ApiError::is_not_found,
                    )
                    .await
                    .map_err(|source| StoreError::wait("snapshot deletion", source))?;
            }
            Ok(())
        })
    }

    fn create_volume_from_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
        volume_type: Option<&'a str>,
        zone: Option<&'a str>,
        iops: Option<i64>,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let api = self.api()?;
            if iops.is_some() {
                debug!(snapshot_id, "iops is ignored by block storage");
            }
            self.waiter(self.settings.snapshot_timeout)
                .wait_for(snapshot_id, SNAPSHOT_READY, || api.get_snapshot(snapshot_id))
                .await
                .map_err(|source| StoreError::wait("snapshot availability", source))?;
            let availability_zone = if self.settings.enforce_az {
                zone.map(str::to_owned)
            } else {
                None
            };
            let body = CreateVolume {
                name: clone_name(snapshot_id),
                snapshot_id: snapshot_id.to_owned(),
                volume_type: volume_type.map(str::to_owned),
                availability_zone,
            };
            info!(
                snapshot_id,
                volume_type,
                zone = body.availability_zone.as_deref(),
                volume_name = %body.name,
                "creating block volume from snapshot"
            );
            let volume = api.create_volume(&body).await.map_err(|source| {
                StoreError::operation("create volume from snapshot", snapshot_id.to_owned(), source)
            })?;
            info!(snapshot_id, volume_id = %volume.id, "block volume requested");
            Ok(volume.id)
        })
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            let cascade = self.settings.cascade_delete;
            info!(volume_id, cascade, "deleting block volume");
            api.delete_volume(volume_id, cascade)
                .await
                .map_err(|source| {
                    StoreError::operation("delete volume", volume_id.to_owned(), source)
                })?;
            if self.settings.ensure_deleted {
                self.settings
                    .deletion_waiter(self.settings.volume_timeout)
                    .wait_for_absence(
                        volume_id,
                        || api.get_volume(volume_id),
                        ApiError::is_not_found,
                    )
                    .await
                    .map_err(|source| StoreError::wait("volume deletion", source))?;
            }
            Ok(())
        })
    }

    fn get_volume_info<'a>(
        &'a self,
        volume_id: &'a str,
        zone: Option<&'a str>,
    ) -> StoreFuture<'a, VolumeInfo> {
        Box::pin(async move {
            let api = self.api()?;
            debug!(volume_id, zone, "fetching block volume info");
            let volume = api.get_volume(volume_id).await.map_err(|source| {
                StoreError::operation("get volume", volume_id.to_owned(), source)
            })?;
            Ok(VolumeInfo {
                volume_type: volume.volume_type,
                iops: None,
            })
        })
    }

    fn is_volume_ready<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let api = self.api()?;
            let volume = api.get_volume(volume_id).await.map_err(|source| {
                StoreError::operation("get volume", volume_id.to_owned(), source)
            })?;
            let ready = VOLUME_READY.contains(&volume.status.as_str());
            if !ready {
                warn!(volume_id, status = %volume.status, "block volume is not ready");
            }
            Ok(ready)
        })
    }

    fn create_replica<'a>(
        &'a self,
        _share_id: &'a str,
        _zone: Option<&'a str>,
    ) -> StoreFuture<'a, String> {
        Self::unsupported("create replica")
    }

    fn inactive_replicas<'a>(&'a self, _share_id: &'a str) -> StoreFuture<'a, Vec<String>> {
        Self::unsupported("list replicas")
    }

    fn resync_replica<'a>(&'a self, _replica_id: &'a str) -> StoreFuture<'a, ()> {
        Self::unsupported("resync replica")
    }

    fn promote_replica<'a>(&'a self, _replica_id: &'a str) -> StoreFuture<'a, ()> {
        Self::unsupported("promote replica")
    }

    fn delete_replica<'a>(&'a self, _replica_id: &'a str) -> StoreFuture<'a, ()> {
        Self::unsupported("delete replica")
    }

    fn wait_for_volume_status<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            self.waiter(self.settings.volume_timeout)
                .wait_for(volume_id, VOLUME_READY, || api.get_volume(volume_id))
                .await
                .map_err(|source| StoreError::wait("volume availability", source))?;
            Ok(())
        })
    }

    fn wait_for_snapshot_status<'a>(&'a self, snapshot_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            self.waiter(self.settings.snapshot_timeout)
                .wait_for(snapshot_id, SNAPSHOT_READY, || api.get_snapshot(snapshot_id))
                .await
                .map_err(|source| StoreError::wait("snapshot availability", source))?;
            Ok(())
        })
    }

    fn wait_for_replica_status<'a>(&'a self, _replica_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn wait_for_replica_sync_state<'a>(&'a self, _replica_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn wait_for_replica_active_state<'a>(
        &'a self,
        _replica_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}
