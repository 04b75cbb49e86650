//! Shared filesystem implementation of [`ResourceStore`].
//!
//! Cloning a share is a multi-step sequence: the snapshot must settle, the
//! originating share's metadata and first access rule are recovered, and the
//! new share is created, awaited, and granted that rule. Each step failure is
//! reported as [`StoreError::CloneStep`] carrying the new share once it
//! exists, so the caller can still clean it up.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{
    ApiError, Connect, CreateShare, CreateShareReplica, CreateShareSnapshot, ReplicaStateView,
    ShareApi,
};
use crate::microversion::{Microversion, compare};
use crate::wait::{DEFAULT_POLL_INTERVAL, StatusWaiter};

use super::access::AccessRuleListing;
use super::{
    REPLICA_ACTIVE, REPLICA_IN_SYNC, REPLICA_READY, ResourceStore, SNAPSHOT_DESCRIPTION,
    SNAPSHOT_READY, SnapshotRequest, StorageKind, StoreError, StoreFuture, StoreSettings,
    VOLUME_READY, VolumeInfo, clone_name,
};

const SERVICE: &str = "shared filesystem";

fn clone_step(
    step: &'static str,
    id: &str,
    created: Option<&str>,
) -> impl FnOnce(StoreError) -> StoreError {
    let owned_id = id.to_owned();
    let owned_created = created.map(str::to_owned);
    move |source| StoreError::CloneStep {
        step,
        id: owned_id,
        created: owned_created,
        source: Box::new(source),
    }
}

/// Store backed by the shared filesystem API.
#[derive(Debug)]
pub struct ShareStore<C, A> {
    connector: C,
    api: Option<A>,
    settings: StoreSettings,
    microversion: Microversion,
    poll_interval: Duration,
}

impl<C, A> ShareStore<C, A>
where
    C: Connect<A>,
    A: ShareApi,
{
    /// Creates an uninitialised store pinned to the minimum microversion.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            api: None,
            settings: StoreSettings::default(),
            microversion: Microversion::MINIMUM,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the interval between status polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the microversion negotiated by the last `init`.
    #[must_use]
    pub const fn microversion(&self) -> Microversion {
        self.microversion
    }

    fn api(&self) -> Result<&A, StoreError> {
        self.api.as_ref().ok_or(StoreError::NotInitialised)
    }

    const fn waiter(&self, timeout: Duration) -> StatusWaiter {
        StatusWaiter::new(timeout).with_poll_interval(self.poll_interval)
    }

    /// Picks the working microversion for `api`. Failures keep the minimum.
    async fn negotiate(api: &A) -> Microversion {
        let max = match api.max_microversion().await {
            Ok(version) => version,
            Err(err) => {
                warn!(error = %err, "failed to query the shared filesystem microversion");
                return Microversion::MINIMUM;
            }
        };
        let wanted = Microversion::ACCESS_RULES.to_string();
        match compare("lte", &wanted, &max) {
            Ok(true) => {
                debug!(max = %max, "using the access rules microversion");
                Microversion::ACCESS_RULES
            }
            Ok(false) => {
                debug!(max = %max, "keeping the minimum microversion");
                Microversion::MINIMUM
            }
            Err(err) => {
                warn!(max = %max, error = %err, "failed to compare microversions");
                Microversion::MINIMUM
            }
        }
    }

    async fn clone_share(
        &self,
        api: &A,
        snapshot_id: &str,
        zone: Option<&str>,
    ) -> Result<String, StoreError> {
        let snapshot = self
            .waiter(self.settings.snapshot_timeout)
            .wait_for(snapshot_id, SNAPSHOT_READY, || api.get_snapshot(snapshot_id))
            .await
            .map_err(|source| StoreError::wait("snapshot availability", source))
            .map_err(clone_step("wait for snapshot", snapshot_id, None))?;

        let origin = api
            .get_share(&snapshot.share_id)
            .await
            .map_err(|source| {
                StoreError::operation("get share", snapshot.share_id.clone(), source)
            })
            .map_err(clone_step("fetch originating share", &snapshot.share_id, None))?;

        let rule = AccessRuleListing::fetch(api, self.microversion, &origin.id)
            .await
            .map_err(|source| {
                StoreError::operation("list access rules of", origin.id.clone(), source)
            })
            .and_then(|listing| {
                listing.into_first().ok_or_else(|| StoreError::NoAccessRule {
                    share_id: origin.id.clone(),
                })
            })
            .map_err(clone_step("fetch access rule", &origin.id, None))?;
        debug!(share_id = %origin.id, access_id = %rule.id, "recovered access rule");

        let share_proto = if snapshot.share_proto.is_empty() {
            origin.share_proto.clone()
        } else {
            snapshot.share_proto.clone()
        };
        let body = CreateShare {
            share_proto,
            size: snapshot.size,
            name: clone_name(snapshot_id),
            snapshot_id: snapshot_id.to_owned(),
            availability_zone: zone.map(str::to_owned),
            metadata: origin.metadata.clone(),
        };
        info!(
            snapshot_id,
            share_name = %body.name,
            zone,
            size = body.size,
            "creating share from snapshot"
        );
        let share = api
            .create_share(&body)
            .await
            .map_err(|source| {
                StoreError::operation("create share from snapshot", snapshot_id.to_owned(), source)
            })
            .map_err(clone_step("create share", snapshot_id, None))?;
        let created = Some(share.id.as_str());

        self.waiter(self.settings.share_timeout)
            .wait_for(&share.id, VOLUME_READY, || api.get_share(&share.id))
            .await
            .map_err(|source| StoreError::wait("share availability", source))
            .map_err(clone_step("wait for share", &share.id, created))?;

        let granted = api
            .grant_access(&share.id, &rule.grant())
            .await
            .map_err(|source| StoreError::operation("grant access on", share.id.clone(), source))
            .map_err(clone_step("grant access", &share.id, created))?;
        info!(
            share_id = %share.id,
            access_id = %granted.id,
            access_to = %granted.access_to,
            "share cloned"
        );
        Ok(share.id)
    }
}

impl<C, A> ResourceStore for ShareStore<C, A>
where
    C: Connect<A>,
    A: ShareApi,
{
    fn kind(&self) -> StorageKind {
        StorageKind::Share
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
                "initialising share store"
            );
            if self.api.is_none() || settings.cloud.is_some() {
                let mut api = self
                    .connector
                    .connect(settings.region.as_deref())
                    .await
                    .map_err(|source| StoreError::Connect {
                        service: SERVICE,
                        source,
                    })?;
                let version = Self::negotiate(&api).await;
                api.set_microversion(version);
                self.microversion = version;
                self.api = Some(api);
                info!(microversion = %version, "created shared filesystem client");
            }
            self.settings = settings;
            Ok(())
        })
    }

    fn create_snapshot<'a>(&'a self, request: &'a SnapshotRequest) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let api = self.api()?;
            let name = request.snapshot_name();
            if !request.tags.is_empty() {
                debug!(volume_id = %request.volume_id, "share snapshots do not carry tags");
            }
            info!(
                share_id = %request.volume_id,
                zone = request.zone.as_deref(),
                snapshot_name = %name,
                "creating share snapshot"
            );
            let body = CreateShareSnapshot {
                share_id: request.volume_id.clone(),
                name,
                description: String::from(SNAPSHOT_DESCRIPTION),
            };
            let snapshot = api.create_snapshot(&body).await.map_err(|source| {
                StoreError::operation("create snapshot of", request.volume_id.clone(), source)
            })?;
            info!(snapshot_id = %snapshot.id, "share snapshot requested");
            Ok(snapshot.id)
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            info!(snapshot_id, "deleting share snapshot");
            api.delete_snapshot(snapshot_id).await.map_err(|source| {
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
            if volume_type.is_some() || iops.is_some() {
                debug!(snapshot_id, "share type and iops follow the snapshot");
            }
            self.clone_share(api, snapshot_id, zone).await
        })
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            info!(share_id = volume_id, "deleting share");
            api.delete_share(volume_id).await.map_err(|source| {
                StoreError::operation("delete share", volume_id.to_owned(), source)
            })?;
            if self.settings.ensure_deleted {
                self.settings
                    .deletion_waiter(self.settings.share_timeout)
                    .wait_for_absence(
                        volume_id,
                        || api.get_share(volume_id),
                        ApiError::is_not_found,
                    )
                    .await
                    .map_err(|source| StoreError::wait("share deletion", source))?;
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
            debug!(share_id = volume_id, zone, "fetching share info");
            let share = api.get_share(volume_id).await.map_err(|source| {
                StoreError::operation("get share", volume_id.to_owned(), source)
            })?;
            Ok(VolumeInfo {
                volume_type: share.volume_type,
                iops: None,
            })
        })
    }

    fn is_volume_ready<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let api = self.api()?;
            let share = api.get_share(volume_id).await.map_err(|source| {
                StoreError::operation("get share", volume_id.to_owned(), source)
            })?;
            let ready = VOLUME_READY.contains(&share.status.as_str());
            if !ready {
                warn!(share_id = volume_id, status = %share.status, "share is not ready");
            }
            Ok(ready)
        })
    }

    fn create_replica<'a>(
        &'a self,
        share_id: &'a str,
        zone: Option<&'a str>,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let api = self.api()?;
            info!(share_id, zone, "creating share replica");
            let body = CreateShareReplica {
                share_id: share_id.to_owned(),
                availability_zone: zone.map(str::to_owned),
            };
            let replica = api.create_replica(&body).await.map_err(|source| {
                StoreError::operation("create replica of", share_id.to_owned(), source)
            })?;
            info!(share_id, replica_id = %replica.id, "share replica requested");
            Ok(replica.id)
        })
    }

    fn inactive_replicas<'a>(&'a self, share_id: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let api = self.api()?;
            let replicas = api.list_replicas(share_id).await.map_err(|source| {
                StoreError::operation("list replicas", share_id.to_owned(), source)
            })?;
            let inactive: Vec<String> = replicas
                .into_iter()
                .filter(|replica| {
                    !REPLICA_ACTIVE.contains(&replica.replica_state.as_deref().unwrap_or_default())
                })
                .map(|replica| replica.id)
                .collect();
            debug!(share_id, count = inactive.len(), "listed inactive replicas");
            Ok(inactive)
        })
    }

    fn resync_replica<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            info!(replica_id, "resyncing share replica");
            api.resync_replica(replica_id).await.map_err(|source| {
                StoreError::operation("resync replica", replica_id.to_owned(), source)
            })
        })
    }

    fn promote_replica<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            info!(replica_id, "promoting share replica");
            api.promote_replica(replica_id).await.map_err(|source| {
                StoreError::operation("promote replica", replica_id.to_owned(), source)
            })
        })
    }

    fn delete_replica<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            info!(replica_id, "deleting share replica");
            api.delete_replica(replica_id).await.map_err(|source| {
                StoreError::operation("delete replica", replica_id.to_owned(), source)
            })?;
            if self.settings.ensure_deleted {
                self.settings
                    .deletion_waiter(self.settings.replica_timeout)
                    .wait_for_absence(
                        replica_id,
                        || api.get_replica(replica_id),
                        ApiError::is_not_found,
                    )
                    .await
                    .map_err(|source| StoreError::wait("replica deletion", source))?;
            }
            Ok(())
        })
    }

    fn wait_for_volume_status<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            self.waiter(self.settings.share_timeout)
                .wait_for(volume_id, VOLUME_READY, || api.get_share(volume_id))
                .await
                .map_err(|source| StoreError::wait("share availability", source))?;
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

    fn wait_for_replica_status<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            self.waiter(self.settings.replica_timeout)
                .wait_for(replica_id, REPLICA_READY, || api.get_replica(replica_id))
                .await
                .map_err(|source| StoreError::wait("replica availability", source))?;
            Ok(())
        })
    }

    fn wait_for_replica_sync_state<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            self.waiter(self.settings.replica_timeout)
                .wait_for(replica_id, REPLICA_IN_SYNC, move || async move {
                    api.get_replica(replica_id).await.map(ReplicaStateView)
                })
                .await
                .map_err(|source| StoreError::wait("replica synchronisation", source))?;
            Ok(())
        })
    }

    fn wait_for_replica_active_state<'a>(
        &'a self,
        replica_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api = self.api()?;
            self.waiter(self.settings.replica_timeout)
                .wait_for(replica_id, REPLICA_ACTIVE, move || async move {
                    api.get_replica(replica_id).await.map(ReplicaStateView)
                })
                .await
                .map_err(|source| StoreError::wait("replica promotion", source))?;
            Ok(())
        })
    }
}
