//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedCloud`] is an in-memory stand-in for both storage APIs. It hands
//! out deterministic identifiers (`snap-1`, `vol-2`, `share-2`, `repl-1`),
//! reports `available` for everything it creates unless a status script says
//! otherwise, and records every call so tests can assert on ordering. Like
//! Manila, it refuses to delete an active replica or a share that still has
//! inactive replicas; a share's own active replica is `<share>-primary`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{
    AccessRight, ApiError, ApiFuture, BlockApi, Connect, CreateShare, CreateShareReplica,
    CreateShareSnapshot, CreateVolume, CreateVolumeSnapshot, GrantAccess, Share, ShareAccess,
    ShareApi, ShareReplica, ShareSnapshot, Volume, VolumeSnapshot,
};
use crate::microversion::Microversion;

const READY: &str = "available";
const ACTIVE: &str = "active";
const OUT_OF_SYNC: &str = "out_of_sync";

#[derive(Debug, Default)]
struct CloudState {
    counters: BTreeMap<&'static str, u32>,
    volumes: BTreeMap<String, Volume>,
    volume_snapshots: BTreeMap<String, VolumeSnapshot>,
    shares: BTreeMap<String, Share>,
    share_snapshots: BTreeMap<String, ShareSnapshot>,
    replicas: BTreeMap<String, ShareReplica>,
    access_rules: BTreeMap<String, Vec<AccessRight>>,
    statuses: BTreeMap<String, VecDeque<String>>,
    failing_actions: BTreeSet<String>,
    failing_gets: BTreeSet<String>,
    connect_failure: Option<ApiError>,
    max_version: Option<String>,
    microversion: Option<Microversion>,
    calls: Vec<String>,
    fetches: Vec<String>,
    deleted: Vec<String>,
    grants: Vec<(String, GrantAccess)>,
    created_snapshots: Vec<CreateVolumeSnapshot>,
    created_volumes: Vec<CreateVolume>,
    created_shares: Vec<CreateShare>,
    regions: Vec<Option<String>>,
}

impl CloudState {
    fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_default();
        *counter += 1;
        format!("{prefix}-{counter}")
    }

    fn bump_to(&mut self, prefix: &'static str, id: &str) {
        let seeded = id
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|number| number.parse::<u32>().ok());
        if let Some(number) = seeded {
            let counter = self.counters.entry(prefix).or_default();
            *counter = (*counter).max(number);
        }
    }

    /// Pops the next scripted status for `id`; the last entry sticks.
    fn scripted_status(&mut self, id: &str) -> Option<String> {
        let queue = self.statuses.get_mut(id)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn replicas_of<'a>(&'a self, share_id: &'a str) -> impl Iterator<Item = &'a ShareReplica> {
        self.replicas
            .values()
            .filter(move |replica| replica.share_id == share_id)
    }

    fn replica_is_active(&self, replica_id: &str) -> bool {
        self.replicas.get(replica_id).is_some_and(is_active)
    }

    /// Replicated shares always carry an active replica of their own,
    /// created alongside the first requested replica.
    fn seed_primary_replica(&mut self, share_id: &str) {
        if self.replicas_of(share_id).next().is_some() {
            return;
        }
        let id = format!("{share_id}-primary");
        let primary = ShareReplica {
            id: id.clone(),
            share_id: share_id.to_owned(),
            status: String::from(READY),
            replica_state: Some(String::from(ACTIVE)),
            availability_zone: None,
        };
        self.replicas.insert(id, primary);
    }

    fn check_action(&mut self, action: &str, target: &str) -> Result<(), ApiError> {
        self.calls.push(format!("{action} {target}"));
        if self.failing_actions.contains(action) {
            return Err(scripted_failure(action, target));
        }
        Ok(())
    }

    fn check_get(&mut self, action: &str, id: &str) -> Result<(), ApiError> {
        self.fetches.push(id.to_owned());
        if self.failing_gets.contains(id) {
            return Err(scripted_failure(action, id));
        }
        Ok(())
    }
}

fn scripted_failure(action: &str, target: &str) -> ApiError {
    ApiError::Http {
        url: format!("scripted://{action}/{target}"),
        status: 500,
        body: String::from("scripted failure"),
    }
}

fn is_active(replica: &ShareReplica) -> bool {
    replica.replica_state.as_deref() == Some(ACTIVE)
}

fn rejected(kind: &str, id: &str, reason: &str) -> ApiError {
    ApiError::Http {
        url: format!("scripted://{kind}/{id}"),
        status: 400,
        body: reason.to_owned(),
    }
}

fn not_found(kind: &str, id: &str) -> ApiError {
    ApiError::NotFound {
        url: format!("scripted://{kind}/{id}"),
    }
}

fn forget<T>(
    resources: &mut BTreeMap<String, T>,
    deleted: &mut Vec<String>,
    kind: &str,
    id: &str,
) -> Result<(), ApiError> {
    resources
        .remove(id)
        .map(|_| deleted.push(id.to_owned()))
        .ok_or_else(|| not_found(kind, id))
}

fn ready<'a, T: Send + 'a>(result: Result<T, ApiError>) -> ApiFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

/// In-memory block and shared filesystem API with scripted behaviour.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCloud {
    state: Arc<Mutex<CloudState>>,
}

impl ScriptedCloud {
    /// Creates an empty cloud that reports `2.45` as its maximum
    /// shared filesystem microversion.
    #[must_use]
    pub fn new() -> Self {
        let cloud = Self::default();
        cloud.lock().max_version = Some(String::from("2.45"));
        cloud
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_state<T>(&self, apply: impl FnOnce(&mut CloudState) -> T) -> T {
        let mut guard = self.lock();
        apply(&mut guard)
    }

    /// Seeds an existing block volume.
    #[must_use]
    pub fn with_volume(self, id: &str, volume_type: Option<&str>) -> Self {
        {
            let mut state = self.lock();
            state.bump_to("vol", id);
            state.volumes.insert(
                id.to_owned(),
                Volume {
                    id: id.to_owned(),
                    status: String::from(READY),
                    size: 10,
                    volume_type: volume_type.map(str::to_owned),
                    availability_zone: Some(String::from("nova")),
                    metadata: BTreeMap::new(),
                },
            );
        }
        self
    }

    /// Seeds an existing share with metadata and access rules.
    #[must_use]
    pub fn with_share(
        self,
        id: &str,
        metadata: &[(&str, &str)],
        rules: &[(&str, &str, &str)],
    ) -> Self {
        {
            let mut state = self.lock();
            state.bump_to("share", id);
            state.shares.insert(
                id.to_owned(),
                Share {
                    id: id.to_owned(),
                    status: String::from(READY),
                    share_proto: String::from("NFS"),
                    size: 5,
                    volume_type: Some(String::from("default")),
                    availability_zone: Some(String::from("zone-a")),
                    metadata: metadata
                        .iter()
                        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                        .collect(),
                },
            );
            let seeded_rules: Vec<AccessRight> = rules
                .iter()
                .enumerate()
                .map(|(index, (access_type, access_to, access_level))| AccessRight {
                    id: format!("{id}-rule-{index}"),
                    access_type: (*access_type).to_owned(),
                    access_to: (*access_to).to_owned(),
                    access_level: (*access_level).to_owned(),
                    state: String::from("active"),
                    access_key: None,
                })
                .collect();
            state.access_rules.insert(id.to_owned(), seeded_rules);
        }
        self
    }

    /// Sets the maximum microversion reported by the version document;
    /// `None` makes the query fail.
    #[must_use]
    pub fn with_max_version(self, version: Option<&str>) -> Self {
        self.lock().max_version = version.map(str::to_owned);
        self
    }

    /// Makes every connect attempt fail with `error`.
    #[must_use]
    pub fn with_connect_failure(self, error: ApiError) -> Self {
        self.lock().connect_failure = Some(error);
        self
    }

    /// Scripts the statuses successive fetches of `id` report. The last
    /// status repeats once the script is exhausted. For replicas the script
    /// drives the replication state rather than the lifecycle status.
    pub fn script_status(&self, id: &str, statuses: &[&str]) {
        self.lock().statuses.insert(
            id.to_owned(),
            statuses.iter().map(|status| (*status).to_owned()).collect(),
        );
    }

    /// Makes every call of `action` (for example `create_share`) fail.
    pub fn fail_action(&self, action: &str) {
        self.lock().failing_actions.insert(action.to_owned());
    }

    /// Makes every fetch of `id` fail with a server error.
    pub fn fail_get(&self, id: &str) {
        self.lock().failing_gets.insert(id.to_owned());
    }

    /// Returns the mutating calls recorded so far as `"<action> <target>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Returns the identifiers fetched so far, one entry per poll.
    #[must_use]
    pub fn fetches(&self) -> Vec<String> {
        self.lock().fetches.clone()
    }

    /// Returns the identifiers deleted so far, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Returns every access grant as `(share_id, rule)`.
    #[must_use]
    pub fn grants(&self) -> Vec<(String, GrantAccess)> {
        self.lock().grants.clone()
    }

    /// Returns the block snapshot creation requests received so far.
    #[must_use]
    pub fn created_snapshots(&self) -> Vec<CreateVolumeSnapshot> {
        self.lock().created_snapshots.clone()
    }

    /// Returns the bodies of every volume creation request.
    #[must_use]
    pub fn created_volumes(&self) -> Vec<CreateVolume> {
        self.lock().created_volumes.clone()
    }

    /// Returns the bodies of every share creation request.
    #[must_use]
    pub fn created_shares(&self) -> Vec<CreateShare> {
        self.lock().created_shares.clone()
    }

    /// Returns the microversion pinned by the last `set_microversion`.
    #[must_use]
    pub fn microversion(&self) -> Option<Microversion> {
        self.lock().microversion
    }

    /// Returns the region hints passed to each connect call.
    #[must_use]
    pub fn regions(&self) -> Vec<Option<String>> {
        self.lock().regions.clone()
    }
}

impl Connect<Self> for ScriptedCloud {
    fn connect<'a>(&'a self, region: Option<&'a str>) -> ApiFuture<'a, Self> {
        ready(self.with_state(|state| {
            state.regions.push(region.map(str::to_owned));
            state
                .connect_failure
                .clone()
                .map_or_else(|| Ok(self.clone()), Err)
        }))
    }
}

impl BlockApi for ScriptedCloud {
    fn create_snapshot<'a>(
        &'a self,
        request: &'a CreateVolumeSnapshot,
    ) -> ApiFuture<'a, VolumeSnapshot> {
        ready(self.with_state(|state| {
            state
                .check_action("create_snapshot", &request.volume_id)
                .map(|()| {
                    let id = state.next_id("snap");
                    let snapshot = VolumeSnapshot {
                        id: id.clone(),
                        status: String::from("creating"),
                        volume_id: request.volume_id.clone(),
                        size: 10,
                        name: Some(request.name.clone()),
                    };
                    state.volume_snapshots.insert(id, snapshot.clone());
                    state.created_snapshots.push(request.clone());
                    snapshot
                })
        }))
    }

    fn get_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, VolumeSnapshot> {
        ready(self.with_state(|state| {
            state.check_get("get_snapshot", snapshot_id).and_then(|()| {
                let status = state.scripted_status(snapshot_id);
                state
                    .volume_snapshots
                    .get(snapshot_id)
                    .cloned()
                    .map(|mut snapshot| {
                        snapshot.status = status.unwrap_or_else(|| String::from(READY));
                        snapshot
                    })
                    .ok_or_else(|| not_found("snapshots", snapshot_id))
            })
        }))
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ()> {
        ready(self.with_state(|state| {
            state
                .check_action("delete_snapshot", snapshot_id)
                .and_then(|()| {
                    forget(&mut state.volume_snapshots, &mut state.deleted, "snapshots", snapshot_id)
                })
        }))
    }

    fn create_volume<'a>(&'a self, request: &'a CreateVolume) -> ApiFuture<'a, Volume> {
        ready(self.with_state(|state| {
            state
                .check_action("create_volume", &request.snapshot_id)
                .map(|()| {
                    let id = state.next_id("vol");
                    let volume = Volume {
                        id: id.clone(),
                        status: String::from("creating"),
                        size: 10,
                        volume_type: request.volume_type.clone(),
                        availability_zone: request.availability_zone.clone(),
                        metadata: BTreeMap::new(),
                    };
                    state.volumes.insert(id, volume.clone());
                    state.created_volumes.push(request.clone());
                    volume
                })
        }))
    }

    fn get_volume<'a>(&'a self, volume_id: &'a str) -> ApiFuture<'a, Volume> {
        ready(self.with_state(|state| {
            state.check_get("get_volume", volume_id).and_then(|()| {
                let status = state.scripted_status(volume_id);
                state
                    .volumes
                    .get(volume_id)
                    .cloned()
                    .map(|mut volume| {
                        volume.status = status.unwrap_or_else(|| String::from(READY));
                        volume
                    })
                    .ok_or_else(|| not_found("volumes", volume_id))
            })
        }))
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str, cascade: bool) -> ApiFuture<'a, ()> {
        ready(self.with_state(|state| {
            let target = if cascade {
                format!("{volume_id} cascade")
            } else {
                volume_id.to_owned()
            };
            state.check_action("delete_volume", &target).and_then(|()| {
                forget(&mut state.volumes, &mut state.deleted, "volumes", volume_id)
            })
        }))
    }
}

impl ShareApi for ScriptedCloud {
    fn max_microversion(&self) -> ApiFuture<'_, String> {
        ready(self.with_state(|state| {
            state.max_version.clone().ok_or_else(|| ApiError::Http {
                url: String::from("scripted://versions"),
                status: 503,
                body: String::from("version document unavailable"),
            })
        }))
    }

    fn set_microversion(&mut self, version: Microversion) {
        self.lock().microversion = Some(version);
    }

    fn create_snapshot<'a>(
        &'a self,
        request: &'a CreateShareSnapshot,
    ) -> ApiFuture<'a, ShareSnapshot> {
        ready(self.with_state(|state| {
            state
                .check_action("create_snapshot", &request.share_id)
                .and_then(|()| {
                    let share = state
                        .shares
                        .get(&request.share_id)
                        .cloned()
                        .ok_or_else(|| not_found("shares", &request.share_id))?;
                    let id = state.next_id("snap");
                    let snapshot = ShareSnapshot {
                        id: id.clone(),
                        status: String::from("creating"),
                        share_id: share.id,
                        share_proto: share.share_proto,
                        size: share.size,
                    };
                    state.share_snapshots.insert(id, snapshot.clone());
                    Ok(snapshot)
                })
        }))
    }

    fn get_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ShareSnapshot> {
        ready(self.with_state(|state| {
            state.check_get("get_snapshot", snapshot_id).and_then(|()| {
                let status = state.scripted_status(snapshot_id);
                state
                    .share_snapshots
                    .get(snapshot_id)
                    .cloned()
                    .map(|mut snapshot| {
                        snapshot.status = status.unwrap_or_else(|| String::from(READY));
                        snapshot
                    })
                    .ok_or_else(|| not_found("snapshots", snapshot_id))
            })
        }))
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ()> {
        ready(self.with_state(|state| {
            state
                .check_action("delete_snapshot", snapshot_id)
                .and_then(|()| {
                    forget(&mut state.share_snapshots, &mut state.deleted, "snapshots", snapshot_id)
                })
        }))
    }

    fn create_share<'a>(&'a self, request: &'a CreateShare) -> ApiFuture<'a, Share> {
        ready(self.with_state(|state| {
            state
                .check_action("create_share", &request.snapshot_id)
                .map(|()| {
                    let id = state.next_id("share");
                    let share = Share {
                        id: id.clone(),
                        status: String::from("creating"),
                        share_proto: request.share_proto.clone(),
                        size: request.size,
                        volume_type: Some(String::from("default")),
                        availability_zone: request.availability_zone.clone(),
                        metadata: request.metadata.clone(),
                    };
                    state.shares.insert(id, share.clone());
                    state.created_shares.push(request.clone());
                    share
                })
        }))
    }

    fn get_share<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Share> {
        ready(self.with_state(|state| {
            state.check_get("get_share", share_id).and_then(|()| {
                let status = state.scripted_status(share_id);
                state
                    .shares
                    .get(share_id)
                    .cloned()
                    .map(|mut share| {
                        share.status = status.unwrap_or_else(|| String::from(READY));
                        share
                    })
                    .ok_or_else(|| not_found("shares", share_id))
            })
        }))
    }

    fn delete_share<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, ()> {
        ready(self.with_state(|state| {
            state.check_action("delete_share", share_id).and_then(|()| {
                if state.replicas_of(share_id).any(|replica| !is_active(replica)) {
                    return Err(rejected("shares", share_id, "share has replicas"));
                }
                forget(&mut state.shares, &mut state.deleted, "shares", share_id)?;
                state.replicas.retain(|_, replica| replica.share_id != share_id);
                Ok(())
            })
        }))
    }

    fn list_access_rights<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Vec<AccessRight>> {
        ready(self.with_state(|state| {
            state
                .check_action("list_access_rights", share_id)
                .map(|()| {
                    state
                        .access_rules
                        .get(share_id)
                        .cloned()
                        .unwrap_or_default()
                })
        }))
    }

    fn list_share_access_rules<'a>(
        &'a self,
        share_id: &'a str,
    ) -> ApiFuture<'a, Vec<ShareAccess>> {
        ready(self.with_state(|state| {
            state
                .check_action("list_share_access_rules", share_id)
                .map(|()| {
                    state
                        .access_rules
                        .get(share_id)
                        .map(|rules| {
                            rules
                                .iter()
                                .map(|rule| ShareAccess {
                                    id: rule.id.clone(),
                                    share_id: Some(share_id.to_owned()),
                                    access_type: rule.access_type.clone(),
                                    access_to: rule.access_to.clone(),
                                    access_level: rule.access_level.clone(),
                                    state: rule.state.clone(),
                                    access_key: rule.access_key.clone(),
                                    metadata: BTreeMap::new(),
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                })
        }))
    }

    fn grant_access<'a>(
        &'a self,
        share_id: &'a str,
        request: &'a GrantAccess,
    ) -> ApiFuture<'a, AccessRight> {
        ready(self.with_state(|state| {
            state.check_action("grant_access", share_id).map(|()| {
                let rule = AccessRight {
                    id: state.next_id("rule"),
                    access_type: request.access_type.clone(),
                    access_to: request.access_to.clone(),
                    access_level: request.access_level.clone(),
                    state: String::from("queued_to_apply"),
                    access_key: None,
                };
                state.grants.push((share_id.to_owned(), request.clone()));
                state
                    .access_rules
                    .entry(share_id.to_owned())
                    .or_default()
                    .push(rule.clone());
                rule
            })
        }))
    }

    fn create_replica<'a>(
        &'a self,
        request: &'a CreateShareReplica,
    ) -> ApiFuture<'a, ShareReplica> {
        ready(self.with_state(|state| {
            state
                .check_action("create_replica", &request.share_id)
                .map(|()| {
                    state.seed_primary_replica(&request.share_id);
                    let id = state.next_id("repl");
                    let replica = ShareReplica {
                        id: id.clone(),
                        share_id: request.share_id.clone(),
                        status: String::from(READY),
                        replica_state: Some(String::from(OUT_OF_SYNC)),
                        availability_zone: request.availability_zone.clone(),
                    };
                    state.replicas.insert(id, replica.clone());
                    replica
                })
        }))
    }

    fn get_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ShareReplica> {
        ready(self.with_state(|state| {
            state.check_get("get_replica", replica_id).and_then(|()| {
                let scripted = state.scripted_status(replica_id);
                state
                    .replicas
                    .get(replica_id)
                    .cloned()
                    .map(|mut replica| {
                        if scripted.is_some() {
                            replica.replica_state = scripted;
                        }
                        replica
                    })
                    .ok_or_else(|| not_found("share-replicas", replica_id))
            })
        }))
    }

    fn list_replicas<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Vec<ShareReplica>> {
        ready(self.with_state(|state| {
            state
                .check_get("list_replicas", share_id)
                .map(|()| state.replicas_of(share_id).cloned().collect())
        }))
    }

    fn resync_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()> {
        ready(self.with_state(|state| {
            state
                .check_action("resync_replica", replica_id)
                .and_then(|()| {
                    state
                        .replicas
                        .get_mut(replica_id)
                        .map(|replica| replica.replica_state = Some(String::from("in_sync")))
                        .ok_or_else(|| not_found("share-replicas", replica_id))
                })
        }))
    }

    fn promote_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()> {
        ready(self.with_state(|state| {
            state
                .check_action("promote_replica", replica_id)
                .and_then(|()| {
                    let share_id = state
                        .replicas
                        .get(replica_id)
                        .map(|replica| replica.share_id.clone())
                        .ok_or_else(|| not_found("share-replicas", replica_id))?;
                    for replica in state.replicas.values_mut() {
                        if replica.share_id == share_id {
                            let promoted = replica.id == replica_id;
                            let next = if promoted { ACTIVE } else { OUT_OF_SYNC };
                            replica.replica_state = Some(String::from(next));
                        }
                    }
                    Ok(())
                })
        }))
    }

    fn delete_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()> {
        ready(self.with_state(|state| {
            state
                .check_action("delete_replica", replica_id)
                .and_then(|()| {
                    if state.replica_is_active(replica_id) {
                        return Err(rejected(
                            "share-replicas",
                            replica_id,
                            "cannot delete the active replica",
                        ));
                    }
                    forget(&mut state.replicas, &mut state.deleted, "share-replicas", replica_id)
                })
        }))
    }
}
