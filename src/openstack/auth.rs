//! Keystone v3 authentication and service catalog lookup.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::backend::{ApiError, ApiFuture, Connect};
use crate::config::OpenStackConfig;

use super::client::{ServiceClient, decode};
use super::{CinderClient, ManilaClient};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const DEFAULT_REGION: &str = "RegionOne";

/// Catalog service types accepted for the block storage service.
pub const BLOCK_STORAGE_SERVICE_TYPES: &[&str] = &["volumev3", "block-storage"];
/// Catalog service types accepted for the shared filesystem service.
pub const SHARED_FILESYSTEM_SERVICE_TYPES: &[&str] = &["sharev2", "shared-file-system"];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Token,
}

#[derive(Debug, Deserialize)]
struct Token {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

/// Token and catalog obtained from Keystone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Session {
    token: String,
    catalog: Vec<CatalogEntry>,
}

impl Session {
    /// Finds the endpoint URL for the first matching service type.
    pub(crate) fn endpoint(
        &self,
        service_types: &[&str],
        region: &str,
        interface: &str,
    ) -> Result<String, ApiError> {
        service_types
            .iter()
            .find_map(|wanted| {
                self.catalog
                    .iter()
                    .filter(|entry| entry.service_type == *wanted)
                    .flat_map(|entry| entry.endpoints.iter())
                    .find(|endpoint| {
                        endpoint.interface == interface
                            && (endpoint.region.as_deref() == Some(region)
                                || endpoint.region_id.as_deref() == Some(region))
                    })
                    .map(|endpoint| endpoint.url.clone())
            })
            .ok_or_else(|| ApiError::MissingEndpoint {
                service: service_types.join("|"),
                region: region.to_owned(),
                interface: interface.to_owned(),
            })
    }
}

/// Authenticates against Keystone and hands out service clients.
#[derive(Clone, Debug)]
pub struct KeystoneConnector {
    config: OpenStackConfig,
}

impl KeystoneConnector {
    /// Creates a connector for the given credentials.
    #[must_use]
    pub const fn new(config: OpenStackConfig) -> Self {
        Self { config }
    }

    /// Resolves the region: the configured region wins, then the store's
    /// hint, then `RegionOne`.
    #[must_use]
    pub fn resolve_region(&self, hint: Option<&str>) -> String {
        let usable = |region: &&str| !region.trim().is_empty();
        self.config
            .region_name
            .as_deref()
            .filter(usable)
            .or_else(|| hint.filter(usable))
            .unwrap_or(DEFAULT_REGION)
            .to_owned()
    }

    fn tokens_url(&self) -> Result<String, ApiError> {
        let base = self
            .config
            .auth_url
            .as_deref()
            .ok_or_else(|| ApiError::Auth(String::from("auth_url is not configured")))?
            .trim_end_matches('/');
        if base.ends_with("/v3") {
            Ok(format!("{base}/auth/tokens"))
        } else {
            Ok(format!("{base}/v3/auth/tokens"))
        }
    }

    fn auth_body(&self) -> Result<Value, ApiError> {
        let config = &self.config;
        if config.uses_application_credential() {
            let id = config.application_credential_id.as_deref().unwrap_or_default();
            let secret = config
                .application_credential_secret
                .as_deref()
                .unwrap_or_default();
            return Ok(json!({
                "auth": {
                    "identity": {
                        "methods": ["application_credential"],
                        "application_credential": { "id": id, "secret": secret }
                    }
                }
            }));
        }

        let (Some(username), Some(password)) =
            (config.username.as_deref(), config.password.as_deref())
        else {
            return Err(ApiError::Auth(String::from(
                "neither application credentials nor username and password are configured",
            )));
        };
        let project = match (config.project_id.as_deref(), config.project_name.as_deref()) {
            (Some(id), _) => json!({ "id": id }),
            (None, Some(name)) => json!({
                "name": name,
                "domain": { "name": config.project_domain_name }
            }),
            (None, None) => {
                return Err(ApiError::Auth(String::from(
                    "a project name or project id is required for password authentication",
                )));
            }
        };
        Ok(json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": username,
                            "domain": { "name": config.user_domain_name },
                            "password": password
                        }
                    }
                },
                "scope": { "project": project }
            }
        }))
    }

    pub(crate) async fn authenticate(&self) -> Result<Session, ApiError> {
        let url = self.tokens_url()?;
        let body = self.auth_body()?;
        let response = super::HTTP_CLIENT
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ApiError::Transport {
                url: url.clone(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let subject_token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await.map_err(|err| ApiError::Transport {
            url: url.clone(),
            message: err.to_string(),
        })?;

        if !status.is_success() {
            return Err(ApiError::Auth(format!(
                "keystone returned HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&bytes)
            )));
        }
        let token = subject_token.ok_or_else(|| {
            ApiError::Auth(format!("keystone response lacks the {SUBJECT_TOKEN_HEADER} header"))
        })?;
        let parsed: TokenResponse = decode(&url, &bytes)?;
        debug!(services = parsed.token.catalog.len(), "authenticated against keystone");
        Ok(Session {
            token,
            catalog: parsed.token.catalog,
        })
    }

    async fn service_client(
        &self,
        service_types: &[&str],
        region: Option<&str>,
    ) -> Result<ServiceClient, ApiError> {
        let session = self.authenticate().await?;
        let region = self.resolve_region(region);
        let endpoint = session.endpoint(service_types, &region, &self.config.interface)?;
        debug!(%endpoint, %region, "resolved service endpoint");
        Ok(ServiceClient::new(endpoint, session.token))
    }
}

impl Connect<CinderClient> for KeystoneConnector {
    fn connect<'a>(&'a self, region: Option<&'a str>) -> ApiFuture<'a, CinderClient> {
        Box::pin(async move {
            let service = self
                .service_client(BLOCK_STORAGE_SERVICE_TYPES, region)
                .await?;
            Ok(CinderClient::new(service))
        })
    }
}

impl Connect<ManilaClient> for KeystoneConnector {
    fn connect<'a>(&'a self, region: Option<&'a str>) -> ApiFuture<'a, ManilaClient> {
        Box::pin(async move {
            let service = self
                .service_client(SHARED_FILESYSTEM_SERVICE_TYPES, region)
                .await?;
            Ok(ManilaClient::new(service))
        })
    }
}
