//! Block storage (Cinder v3) client.

use serde::{Deserialize, Serialize};

use crate::backend::{
    ApiFuture, BlockApi, CreateVolume, CreateVolumeSnapshot, Volume, VolumeSnapshot,
};

use super::ServiceClient;

#[derive(Deserialize, Serialize)]
struct SnapshotEnvelope<T> {
    snapshot: T,
}

#[derive(Deserialize, Serialize)]
struct VolumeEnvelope<T> {
    volume: T,
}

/// Cinder client implementing [`BlockApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CinderClient {
    service: ServiceClient,
}

impl CinderClient {
    /// Wraps a service client pointed at a Cinder v3 endpoint.
    #[must_use]
    pub const fn new(service: ServiceClient) -> Self {
        Self { service }
    }

    /// Returns the underlying service client.
    #[must_use]
    pub const fn service(&self) -> &ServiceClient {
        &self.service
    }
}

fn volume_path(volume_id: &str, cascade: bool) -> String {
    if cascade {
        format!("volumes/{volume_id}?cascade=true")
    } else {
        format!("volumes/{volume_id}")
    }
}

impl BlockApi for CinderClient {
    fn create_snapshot<'a>(
        &'a self,
        request: &'a CreateVolumeSnapshot,
    ) -> ApiFuture<'a, VolumeSnapshot> {
        Box::pin(async move {
            let envelope: SnapshotEnvelope<VolumeSnapshot> = self
                .service
                .post_json("snapshots", &SnapshotEnvelope { snapshot: request })
                .await?;
            Ok(envelope.snapshot)
        })
    }

    fn get_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, VolumeSnapshot> {
        Box::pin(async move {
            let envelope: SnapshotEnvelope<VolumeSnapshot> = self
                .service
                .get_json(&format!("snapshots/{snapshot_id}"))
                .await?;
            Ok(envelope.snapshot)
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move { self.service.delete(&format!("snapshots/{snapshot_id}")).await })
    }

    fn create_volume<'a>(&'a self, request: &'a CreateVolume) -> ApiFuture<'a, Volume> {
        Box::pin(async move {
            let envelope: VolumeEnvelope<Volume> = self
                .service
                .post_json("volumes", &VolumeEnvelope { volume: request })
                .await?;
            Ok(envelope.volume)
        })
    }

    fn get_volume<'a>(&'a self, volume_id: &'a str) -> ApiFuture<'a, Volume> {
        Box::pin(async move {
            let envelope: VolumeEnvelope<Volume> =
                self.service.get_json(&format!("volumes/{volume_id}")).await?;
            Ok(envelope.volume)
        })
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str, cascade: bool) -> ApiFuture<'a, ()> {
        Box::pin(async move { self.service.delete(&volume_path(volume_id, cascade)).await })
    }
}
