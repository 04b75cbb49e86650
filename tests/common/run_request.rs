//! Shared run request fixture for driver integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`), so the fixture lives under `tests/common/` and is pulled in via
//! `#[path = "common/run_request.rs"]`.

use stackclone::{RunRequest, StorageKind};

pub fn run_request(storage: StorageKind, volume_id: &str) -> RunRequest {
    RunRequest {
        storage,
        volume_id: volume_id.to_owned(),
        snapshots: 1,
        sync: false,
        region: None,
        zone: Some(String::from("zone-b")),
        method: String::from("clone"),
    }
}
