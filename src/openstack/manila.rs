//! Shared filesystem (Manila v2) client.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::backend::{
    AccessRight, ApiError, ApiFuture, CreateShare, CreateShareReplica, CreateShareSnapshot,
    GrantAccess, Share, ShareAccess, ShareApi, ShareReplica, ShareSnapshot,
};
use crate::microversion::Microversion;

use super::ServiceClient;

/// Header pinning the Manila API microversion.
pub const MICROVERSION_HEADER: &str = "X-OpenStack-Manila-API-Version";
/// Header required by the experimental share replica API.
pub const EXPERIMENTAL_HEADER: &str = "X-OpenStack-Manila-API-Experimental";

#[derive(Deserialize, Serialize)]
struct SnapshotEnvelope<T> {
    snapshot: T,
}

#[derive(Deserialize, Serialize)]
struct ShareEnvelope<T> {
    share: T,
}

#[derive(Deserialize, Serialize)]
struct ReplicaEnvelope<T> {
    share_replica: T,
}

#[derive(Deserialize)]
struct ReplicaListEnvelope {
    share_replicas: Vec<ShareReplica>,
}

#[derive(Deserialize)]
struct AccessListEnvelope<T> {
    access_list: Vec<T>,
}

#[derive(Deserialize)]
struct AccessEnvelope {
    access: AccessRight,
}

#[derive(Serialize)]
struct GrantEnvelope<'a> {
    allow_access: &'a GrantAccess,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum ShareAction {
    AccessList(()),
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum ReplicaAction {
    Resync(()),
    Promote(()),
}

#[derive(Deserialize)]
struct VersionsEnvelope {
    versions: Vec<ApiVersion>,
}

#[derive(Deserialize)]
struct ApiVersion {
    id: String,
    #[serde(default)]
    version: String,
}

/// Manila client implementing [`ShareApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManilaClient {
    service: ServiceClient,
}

impl ManilaClient {
    /// Wraps a service client pointed at a Manila v2 endpoint and pins the
    /// minimum supported microversion.
    #[must_use]
    pub fn new(service: ServiceClient) -> Self {
        Self {
            service: service.with_header(MICROVERSION_HEADER, Microversion::MINIMUM.to_string()),
        }
    }

    /// Returns the underlying service client.
    #[must_use]
    pub const fn service(&self) -> &ServiceClient {
        &self.service
    }

    fn experimental(&self) -> ServiceClient {
        self.service.clone().with_header(EXPERIMENTAL_HEADER, "True")
    }
}

/// Strips the versioned path suffix from an endpoint, leaving the service
/// root.
fn version_root(endpoint: &str) -> String {
    let Ok(mut url) = Url::parse(endpoint) else {
        return endpoint.trim_end_matches('/').to_owned();
    };
    let root: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .take_while(|segment| !segment.starts_with("v2"))
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    url.set_path(&root.join("/"));
    url.set_query(None);
    url.as_str().trim_end_matches('/').to_owned()
}

fn select_v2_version(url: &str, versions: Vec<ApiVersion>) -> Result<String, ApiError> {
    versions
        .into_iter()
        .find(|version| version.id.starts_with("v2"))
        .map(|version| version.version)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| ApiError::Decode {
            url: url.to_owned(),
            message: String::from("no v2 entry with a microversion in the version document"),
        })
}

impl ShareApi for ManilaClient {
    fn max_microversion(&self) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let url = format!("{}/v2/", version_root(self.service.endpoint()));
            let envelope: VersionsEnvelope = self.service.get_url_json(&url).await?;
            select_v2_version(&url, envelope.versions)
        })
    }

    fn set_microversion(&mut self, version: Microversion) {
        self.service
            .set_header(MICROVERSION_HEADER, version.to_string());
    }

    fn create_snapshot<'a>(
        &'a self,
        request: &'a CreateShareSnapshot,
    ) -> ApiFuture<'a, ShareSnapshot> {
        Box::pin(async move {
            let envelope: SnapshotEnvelope<ShareSnapshot> = self
                .service
                .post_json("snapshots", &SnapshotEnvelope { snapshot: request })
                .await?;
            Ok(envelope.snapshot)
        })
    }

    fn get_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ShareSnapshot> {
        Box::pin(async move {
            let envelope: SnapshotEnvelope<ShareSnapshot> = self
                .service
                .get_json(&format!("snapshots/{snapshot_id}"))
                .await?;
            Ok(envelope.snapshot)
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move { self.service.delete(&format!("snapshots/{snapshot_id}")).await })
    }

    fn create_share<'a>(&'a self, request: &'a CreateShare) -> ApiFuture<'a, Share> {
        Box::pin(async move {
            let envelope: ShareEnvelope<Share> = self
                .service
                .post_json("shares", &ShareEnvelope { share: request })
                .await?;
            Ok(envelope.share)
        })
    }

    fn get_share<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Share> {
        Box::pin(async move {
            let envelope: ShareEnvelope<Share> =
                self.service.get_json(&format!("shares/{share_id}")).await?;
            Ok(envelope.share)
        })
    }

    fn delete_share<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move { self.service.delete(&format!("shares/{share_id}")).await })
    }

    fn list_access_rights<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Vec<AccessRight>> {
        Box::pin(async move {
            let envelope: AccessListEnvelope<AccessRight> = self
                .service
                .post_json(
                    &format!("shares/{share_id}/action"),
                    &ShareAction::AccessList(()),
                )
                .await?;
            Ok(envelope.access_list)
        })
    }

    fn list_share_access_rules<'a>(
        &'a self,
        share_id: &'a str,
    ) -> ApiFuture<'a, Vec<ShareAccess>> {
        Box::pin(async move {
            let envelope: AccessListEnvelope<ShareAccess> = self
                .service
                .get_json(&format!("share-access-rules?share_id={share_id}"))
                .await?;
            Ok(envelope.access_list)
        })
    }

    fn grant_access<'a>(
        &'a self,
        share_id: &'a str,
        request: &'a GrantAccess,
    ) -> ApiFuture<'a, AccessRight> {
        Box::pin(async move {
            let envelope: AccessEnvelope = self
                .service
                .post_json(
                    &format!("shares/{share_id}/action"),
                    &GrantEnvelope {
                        allow_access: request,
                    },
                )
                .await?;
            Ok(envelope.access)
        })
    }

    fn create_replica<'a>(
        &'a self,
        request: &'a CreateShareReplica,
    ) -> ApiFuture<'a, ShareReplica> {
        Box::pin(async move {
            let envelope: ReplicaEnvelope<ShareReplica> = self
                .experimental()
                .post_json(
                    "share-replicas",
                    &ReplicaEnvelope {
                        share_replica: request,
                    },
                )
                .await?;
            Ok(envelope.share_replica)
        })
    }

    fn get_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ShareReplica> {
        Box::pin(async move {
            let envelope: ReplicaEnvelope<ShareReplica> = self
                .experimental()
                .get_json(&format!("share-replicas/{replica_id}"))
                .await?;
            Ok(envelope.share_replica)
        })
    }

    fn list_replicas<'a>(&'a self, share_id: &'a str) -> ApiFuture<'a, Vec<ShareReplica>> {
        Box::pin(async move {
            let envelope: ReplicaListEnvelope = self
                .experimental()
                .get_json(&format!("share-replicas/detail?share_id={share_id}"))
                .await?;
            Ok(envelope.share_replicas)
        })
    }

    fn resync_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.experimental()
                .post_action(
                    &format!("share-replicas/{replica_id}/action"),
                    &ReplicaAction::Resync(()),
                )
                .await
        })
    }

    fn promote_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.experimental()
                .post_action(
                    &format!("share-replicas/{replica_id}/action"),
                    &ReplicaAction::Promote(()),
                )
                .await
        })
    }

    fn delete_replica<'a>(&'a self, replica_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.experimental()
                .delete(&format!("share-replicas/{replica_id}"))
                .await
        })
    }
}
