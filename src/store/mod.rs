//! Resource stores wrapping the block and shared filesystem transports.
//!
//! A store owns a connector and, after `init`, an authenticated client. All
//! lifecycle operations and the five specialised waits are exposed through
//! the object-safe [`ResourceStore`] trait so the driver can select a backend
//! at runtime.

mod access;
mod block;
mod error;
mod settings;
mod share;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

pub use block::BlockStore;
pub use error::StoreError;
pub use settings::{
    CloneMethod, DEFAULT_ENSURE_DELETED_DELAY, DEFAULT_TIMEOUT, SettingsError, StoreSettings,
    parse_duration,
};
pub use share::ShareStore;

/// Statuses accepted when waiting for a volume or share to become usable.
pub const VOLUME_READY: &[&str] = &["available"];
/// Statuses accepted when waiting for a snapshot to become usable.
pub const SNAPSHOT_READY: &[&str] = &["available"];
/// Statuses accepted when waiting for a replica to be provisioned.
pub const REPLICA_READY: &[&str] = &["available"];
/// Replication states accepted when waiting for a replica to catch up.
pub const REPLICA_IN_SYNC: &[&str] = &["in_sync"];
/// Replication states accepted when waiting for a promotion to finish.
pub const REPLICA_ACTIVE: &[&str] = &["active"];

const SNAPSHOT_DESCRIPTION: &str = "stackclone snapshot";

/// Future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Storage backend family.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageKind {
    /// Block storage (Cinder).
    Block,
    /// Shared filesystems (Manila).
    Share,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("cinder"),
            Self::Share => f.write_str("manila"),
        }
    }
}

/// Parameters for a snapshot request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SnapshotRequest {
    /// Volume or share to snapshot.
    pub volume_id: String,
    /// Zone of the source, used for logging only.
    pub zone: Option<String>,
    /// Tags applied as snapshot metadata where the backend supports it.
    pub tags: BTreeMap<String, String>,
    /// Explicit snapshot name; a generated one is used when absent.
    pub name: Option<String>,
}

impl SnapshotRequest {
    /// Starts a request for `volume_id`.
    #[must_use]
    pub fn new(volume_id: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            ..Self::default()
        }
    }

    /// Sets the source zone.
    #[must_use]
    pub fn zone(mut self, value: Option<String>) -> Self {
        self.zone = value;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets an explicit snapshot name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = Some(value.into());
        self
    }

    /// Returns the explicit name or generates `<volume>.snap.<random>`.
    #[must_use]
    pub fn snapshot_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}.snap.{}", self.volume_id, Uuid::new_v4().simple()))
    }
}

/// Generates the name of a volume cloned from `snapshot_id`.
pub(crate) fn clone_name(snapshot_id: &str) -> String {
    format!("{snapshot_id}.backup.{}", Uuid::new_v4().simple())
}

/// Type information about a volume.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VolumeInfo {
    /// Volume or share type name.
    pub volume_type: Option<String>,
    /// Provisioned IOPS; never reported by these backends.
    pub iops: Option<i64>,
}

/// Lifecycle operations shared by the block and share stores.
pub trait ResourceStore: Send + Sync {
    /// Returns the backend family.
    fn kind(&self) -> StorageKind;

    /// Returns the settings applied by the last `init`.
    fn settings(&self) -> &StoreSettings;

    /// Parses `config` and connects when no client exists yet or a `cloud`
    /// key asks for a fresh one.
    fn init<'a>(&'a mut self, config: &'a BTreeMap<String, String>) -> StoreFuture<'a, ()>;

    /// Requests a snapshot and returns its identifier without waiting.
    fn create_snapshot<'a>(&'a self, request: &'a SnapshotRequest) -> StoreFuture<'a, String>;

    /// Deletes a snapshot, confirming its absence when `ensureDeleted` is set.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> StoreFuture<'a, ()>;

    /// Creates a volume from a snapshot and returns its identifier.
    fn create_volume_from_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
        volume_type: Option<&'a str>,
        zone: Option<&'a str>,
        iops: Option<i64>,
    ) -> StoreFuture<'a, String>;

    /// Deletes a volume, confirming its absence when `ensureDeleted` is set.
    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, ()>;

    /// Returns the type of a volume.
    fn get_volume_info<'a>(
        &'a self,
        volume_id: &'a str,
        zone: Option<&'a str>,
    ) -> StoreFuture<'a, VolumeInfo>;

    /// Returns `true` when the volume currently reports a ready status.
    fn is_volume_ready<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, bool>;

    /// Requests a replica of a share in `zone` and returns its identifier.
    fn create_replica<'a>(
        &'a self,
        share_id: &'a str,
        zone: Option<&'a str>,
    ) -> StoreFuture<'a, String>;

    /// Returns the replicas of a share that are not `active`, such as the
    /// former primary after a promotion.
    fn inactive_replicas<'a>(&'a self, share_id: &'a str) -> StoreFuture<'a, Vec<String>>;

    /// Asks the backend to resynchronise a replica.
    fn resync_replica<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()>;

    /// Promotes a replica to the active role.
    fn promote_replica<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()>;

    /// Deletes a replica, confirming its absence when `ensureDeleted` is set.
    fn delete_replica<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()>;

    /// Waits until a volume or share is available.
    fn wait_for_volume_status<'a>(&'a self, volume_id: &'a str) -> StoreFuture<'a, ()>;

    /// Waits until a snapshot is available.
    fn wait_for_snapshot_status<'a>(&'a self, snapshot_id: &'a str) -> StoreFuture<'a, ()>;

    /// Waits until a replica is available.
    fn wait_for_replica_status<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()>;

    /// Waits until a replica reports `in_sync`.
    fn wait_for_replica_sync_state<'a>(&'a self, replica_id: &'a str) -> StoreFuture<'a, ()>;

    /// Waits until a replica reports `active`.
    fn wait_for_replica_active_state<'a>(&'a self, replica_id: &'a str)
    -> StoreFuture<'a, ()>;
}

#[cfg(test)]
mod tests;
