//! Command-line interface definitions for the `stackclone` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, ValueEnum};

/// Storage service exercised by a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum StorageType {
    /// Shared filesystems (Manila).
    Manila,
    /// Block storage (Cinder).
    Cinder,
}

/// Top-level CLI for the `stackclone` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stackclone",
    about = "Exercise OpenStack snapshot, clone, and replica lifecycles",
    version
)]
pub(crate) struct Cli {
    /// Storage service to exercise.
    #[arg(short = 't', long = "storage-type", value_enum, default_value_t = StorageType::Manila)]
    pub(crate) storage_type: StorageType,
    /// Source volume or share identifier.
    #[arg(short = 'v', long = "volume-id", value_name = "ID")]
    pub(crate) volume_id: Option<String>,
    /// Number of test snapshots taken of the clone before it is deleted.
    #[arg(short = 'n', long = "snapshots", default_value_t = 1, value_name = "COUNT")]
    pub(crate) snapshots: usize,
    /// Resynchronise and promote the test replica.
    #[arg(short = 's', long)]
    pub(crate) sync: bool,
    /// Region to connect to; `OS_REGION_NAME` takes precedence.
    #[arg(short = 'r', long, value_name = "REGION")]
    pub(crate) region: Option<String>,
    /// Availability zone for the clone and the replica.
    #[arg(short = 'z', long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// Enable debug logs.
    #[arg(short = 'd', long)]
    pub(crate) debug: bool,
    /// Snapshot method; only `clone` runs the clone flows.
    #[arg(short = 'm', long, default_value = "clone", value_name = "METHOD")]
    pub(crate) method: String,
}
