//! Transport contracts for the block storage and shared filesystem APIs.
//!
//! Stores depend on these traits rather than on a concrete HTTP client so the
//! lifecycle logic can be exercised against scripted doubles.

mod error;
mod types;

use std::future::Future;
use std::pin::Pin;

use crate::microversion::Microversion;

pub use error::ApiError;
pub use types::{
    AccessRight, CreateShare, CreateShareReplica, CreateShareSnapshot, CreateVolume,
    CreateVolumeSnapshot, GrantAccess, ReplicaStateView, Share, ShareAccess, ShareReplica,
    ShareSnapshot, Volume, VolumeSnapshot,
};

/// Future returned by transport operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Block storage (Cinder) operations used by the block store.
pub trait BlockApi: Send + Sync {
    /// Requests a snapshot of a volume.
    fn create_snapshot<'a>(
        &'a self,
        request: &'a CreateVolumeSnapshot,
    ) -> ApiFuture<'a, VolumeSnapshot>;

    /// Fetches a snapshot by identifier.
    fn get_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, VolumeSnapshot>;

    /// Deletes a snapshot.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ()>;

    /// Requests a new volume.
    fn create_volume<'a>(&'a self, request: &'a CreateVolume) -> ApiFuture<'a, Volume>;

    /// Fetches a volume by identifier.
    fn get_volume<'a>(&'a self, volume_id: &'a str) -> ApiFuture<'a, Volume>;

    /// Deletes a volume, removing its snapshots too when `cascade` is set.
    fn delete_volume<'a>(&'a self, volume_id: &'a str, cascade: bool) -> ApiFuture<'a, ()>;
}

/// Shared filesystem (Manila) operations used by the share store.
pub trait ShareApi: Send + Sync {
    /// Returns the highest microversion the endpoint supports, as reported.
    fn max_microversion(&self) -> ApiFuture<'_, String>;

    /// Pins the microversion sent with subsequent requests.
    fn set_microversion(&mut self, version: Microversion);

    /// Requests a snapshot of a share.
    fn create_snapshot<'a>(
        &'a self,
        request: &'a CreateShareSnapshot,
    ) -> ApiFuture<'a, ShareSnapshot>;

    /// Fetches a share snapshot by identifier.
    fn get_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ShareSnapshot>;

    /// Deletes a share snapshot.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ()>;

    /// Requests a new share.
    fn create_share<'a>(&'a self, request: &'a CreateShare) -> ApiFuture<'a, Share>;

    /// Fetches a share by identifier.
    fn get_share<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Share>;

    /// Deletes a share.
    fn delete_share<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, ()>;

    /// Lists access rules through the `access_list` share action.
    fn list_access_rights<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Vec<AccessRight>>;

    /// Lists access rules through the `share-access-rules` collection.
    fn list_share_access_rules<'a>(
        &'a self,
        share_id: &'a str,
    ) -> ApiFuture<'a, Vec<ShareAccess>>;

    /// Grants an access rule on a share.
    fn grant_access<'a>(
        &'a self,
        share_id: &'a str,
        request: &'a GrantAccess,
    ) -> ApiFuture<'a, AccessRight>;

    /// Requests a replica of a share.
    fn create_replica<'a>(
        &'a self,
        request: &'a CreateShareReplica,
    ) -> ApiFuture<'a, ShareReplica>;

    /// Fetches a replica by identifier.
    fn get_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ShareReplica>;

    /// Lists every replica of a share, including the active one.
    fn list_replicas<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Vec<ShareReplica>>;

    /// Asks the backend to resynchronise a replica.
    fn resync_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()>;

    /// Promotes a replica to the active role.
    fn promote_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()>;

    /// Deletes a replica.
    fn delete_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()>;
}

/// Produces an authenticated transport client for a region.
///
/// Stores hold a connector rather than a client so they can re-authenticate
/// when re-initialised against a different cloud.
pub trait Connect<A>: Send + Sync {
    /// Authenticates and returns a client bound to `region`, or to the
    /// connector's default region when `None`.
    fn connect<'a>(&'a self, region: Option<&'a str>) -> ApiFuture<'a, A>;
}
