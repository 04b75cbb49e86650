//! Resource representations exchanged with the block and shared filesystem
//! APIs.
//!
//! Response types deserialize the subset of fields the stores rely on and
//! tolerate everything else. Request types serialize exactly the body the
//! backend expects inside its top-level envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::wait::Observed;

/// Block storage volume.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Volume {
    /// Volume identifier.
    pub id: String,
    /// Lifecycle status such as `creating` or `available`.
    pub status: String,
    /// Size in GiB.
    #[serde(default)]
    pub size: u64,
    /// Volume type name, when the backend reports one.
    #[serde(default)]
    pub volume_type: Option<String>,
    /// Availability zone hosting the volume.
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// User metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Block storage snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct VolumeSnapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Lifecycle status such as `creating` or `available`.
    pub status: String,
    /// Volume the snapshot was taken from.
    pub volume_id: String,
    /// Size in GiB.
    #[serde(default)]
    pub size: u64,
    /// Snapshot name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of a block snapshot creation request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateVolumeSnapshot {
    /// Volume to snapshot.
    pub volume_id: String,
    /// Snapshot name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Allows snapshotting volumes that are attached.
    pub force: bool,
    /// Metadata applied to the snapshot.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Body of a block volume creation request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateVolume {
    /// Volume name.
    pub name: String,
    /// Snapshot the volume is restored from.
    pub snapshot_id: String,
    /// Volume type; the backend default applies when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    /// Target availability zone; the backend chooses when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

/// Shared filesystem share.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Share {
    /// Share identifier.
    pub id: String,
    /// Lifecycle status such as `creating` or `available`.
    pub status: String,
    /// Export protocol (`NFS`, `CEPHFS`, ...).
    #[serde(default)]
    pub share_proto: String,
    /// Size in GiB.
    #[serde(default)]
    pub size: u64,
    /// Share type name as reported through the legacy `volume_type` field.
    #[serde(default)]
    pub volume_type: Option<String>,
    /// Availability zone hosting the share.
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// User metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Shared filesystem snapshot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ShareSnapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Lifecycle status such as `creating` or `available`.
    pub status: String,
    /// Share the snapshot was taken from.
    pub share_id: String,
    /// Export protocol of the originating share.
    #[serde(default)]
    pub share_proto: String,
    /// Snapshot size in GiB.
    #[serde(default)]
    pub size: u64,
}

/// Body of a share snapshot creation request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateShareSnapshot {
    /// Share to snapshot.
    pub share_id: String,
    /// Snapshot name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Body of a share creation request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateShare {
    /// Export protocol.
    pub share_proto: String,
    /// Size in GiB.
    pub size: u64,
    /// Share name.
    pub name: String,
    /// Snapshot the share is restored from.
    pub snapshot_id: String,
    /// Target availability zone; the backend chooses when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// Metadata copied from the originating share.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Access rule as returned by the legacy `access_list` share action.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AccessRight {
    /// Rule identifier.
    pub id: String,
    /// Rule type (`ip`, `cephx`, `user`, ...).
    pub access_type: String,
    /// Grantee.
    pub access_to: String,
    /// `rw` or `ro`.
    pub access_level: String,
    /// Rule state such as `active`.
    #[serde(default)]
    pub state: String,
    /// Access key for `cephx` rules.
    #[serde(default)]
    pub access_key: Option<String>,
}

/// Access rule as returned by the versioned `share-access-rules` listing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ShareAccess {
    /// Rule identifier.
    pub id: String,
    /// Share the rule belongs to.
    #[serde(default)]
    pub share_id: Option<String>,
    /// Rule type (`ip`, `cephx`, `user`, ...).
    pub access_type: String,
    /// Grantee.
    pub access_to: String,
    /// `rw` or `ro`.
    pub access_level: String,
    /// Rule state such as `active`.
    #[serde(default)]
    pub state: String,
    /// Access key for `cephx` rules.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Rule metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Body of an `allow_access` share action.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GrantAccess {
    /// Rule type.
    pub access_type: String,
    /// Grantee.
    pub access_to: String,
    /// `rw` or `ro`.
    pub access_level: String,
}

/// Shared filesystem replica.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ShareReplica {
    /// Replica identifier.
    pub id: String,
    /// Share the replica belongs to.
    #[serde(default)]
    pub share_id: String,
    /// Lifecycle status such as `creating` or `available`.
    pub status: String,
    /// Replication state: `active`, `in_sync`, `out_of_sync`, or `error`.
    #[serde(default)]
    pub replica_state: Option<String>,
    /// Availability zone hosting the replica.
    #[serde(default)]
    pub availability_zone: Option<String>,
}

/// Body of a share replica creation request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreateShareReplica {
    /// Share to replicate.
    pub share_id: String,
    /// Zone hosting the new replica.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

/// View of a replica that exposes its replication state instead of its
/// lifecycle status, so state transitions can be awaited.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplicaStateView(pub ShareReplica);

impl Observed for Volume {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Observed for VolumeSnapshot {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Observed for Share {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Observed for ShareSnapshot {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Observed for ShareReplica {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Observed for ReplicaStateView {
    fn status(&self) -> &str {
        self.0.replica_state.as_deref().unwrap_or_default()
    }
}
