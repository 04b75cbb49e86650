//! Core library for the `stackclone` storage lifecycle exerciser.
//!
//! The crate snapshots an OpenStack block volume or shared filesystem, clones
//! it, and drives the clone through further snapshots and, for shares, a
//! replica that can be resynchronised and promoted. Every asynchronous step is
//! awaited through a bounded status poller, and everything a run creates is
//! deleted again before it returns.

pub mod backend;
pub mod cleanup;
pub mod config;
pub mod driver;
pub mod microversion;
pub mod openstack;
pub mod orchestrator;
pub mod store;
pub mod test_support;
pub mod wait;

use std::error::Error;

pub use backend::{ApiError, BlockApi, Connect, ShareApi};
pub use cleanup::{CleanupLedger, CleanupReport, ResourceKind, TrackedResource};
pub use config::{ConfigError, OpenStackConfig};
pub use driver::{CREATED_BY_TAG, Driver, DriverError, RunOutcome, RunRequest, select_store};
pub use microversion::{Microversion, MicroversionError};
pub use openstack::{CinderClient, KeystoneConnector, ManilaClient};
pub use orchestrator::{CloneError, CloneOrchestrator, ClonePlan, CloneReport, CloneStage};
pub use store::{
    BlockStore, CloneMethod, ResourceStore, ShareStore, StorageKind, StoreError, StoreSettings,
};
pub use wait::{StatusWaiter, WaitError};

/// Renders an error followed by each of its sources, separated by `: `.
#[must_use]
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_joins_sources() {
        let err = StoreError::Operation {
            action: "delete snapshot",
            id: String::from("snap-1"),
            source: ApiError::NotFound {
                url: String::from("https://cinder/snapshots/snap-1"),
            },
        };
        assert_eq!(
            error_chain(&err),
            "failed to delete snapshot snap-1: resource not found at https://cinder/snapshots/snap-1"
        );
    }
}
