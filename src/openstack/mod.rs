//! OpenStack REST transport backing the block and shared filesystem stores.
//!
//! [`KeystoneConnector`] authenticates once per connect call and builds a
//! [`CinderClient`] or [`ManilaClient`] around a [`ServiceClient`] pointed at
//! the catalog endpoint for the resolved region.

use std::sync::LazyLock;
use std::time::Duration;

mod auth;
mod cinder;
mod client;
mod manila;

pub use auth::{
    BLOCK_STORAGE_SERVICE_TYPES, KeystoneConnector, SHARED_FILESYSTEM_SERVICE_TYPES,
};
pub use cinder::CinderClient;
pub use client::ServiceClient;
pub use manila::{EXPERIMENTAL_HEADER, MICROVERSION_HEADER, ManilaClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});
