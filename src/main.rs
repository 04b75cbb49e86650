//! Binary entry point for the `stackclone` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stackclone::{
    ConfigError, Driver, DriverError, KeystoneConnector, OpenStackConfig, RunRequest, StorageKind,
    error_chain, select_store,
};

mod cli;

use cli::{Cli, StorageType};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] DriverError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(debug: bool) {
    let fallback_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

const fn storage_kind(storage: StorageType) -> StorageKind {
    match storage {
        StorageType::Manila => StorageKind::Share,
        StorageType::Cinder => StorageKind::Block,
    }
}

fn run_request(cli: Cli) -> RunRequest {
    RunRequest {
        storage: storage_kind(cli.storage_type),
        volume_id: cli.volume_id.unwrap_or_default(),
        snapshots: cli.snapshots,
        sync: cli.sync,
        region: cli.region,
        zone: cli.zone,
        method: cli.method,
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let request = run_request(cli);
    request.validate()?;

    let config = OpenStackConfig::load_without_cli_args()?;
    config.validate()?;
    let connector = KeystoneConnector::new(config);
    let mut driver = Driver::new(select_store(request.storage, connector));
    let outcome = driver.run(&request).await?;
    info!(
        snapshot_id = %outcome.snapshot_id,
        volume_id = %outcome.volume_id,
        deleted = outcome.cleanup.deleted.len(),
        failed = outcome.cleanup.failed.len(),
        "run finished"
    );
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{}", error_chain(err)).ok();
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(StorageType::Manila, StorageKind::Share)]
    #[case(StorageType::Cinder, StorageKind::Block)]
    fn maps_storage_types(#[case] storage: StorageType, #[case] expected: StorageKind) {
        assert_eq!(storage_kind(storage), expected);
    }

    #[test]
    fn cli_defaults_match_the_documented_flags() {
        let cli = Cli::try_parse_from(["stackclone", "-v", "share-1"]).expect("parse");
        let request = run_request(cli);
        assert_eq!(request.storage, StorageKind::Share);
        assert_eq!(request.snapshots, 1);
        assert_eq!(request.method, "clone");
        assert!(!request.sync);
        assert_eq!(request.region, None);
    }

    #[test]
    fn errors_render_their_chain() {
        let err = CliError::Run(DriverError::Config(String::from(
            "source volume id must be set",
        )));
        let mut buffer = Vec::new();
        write_error(&mut buffer, &err);
        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "source volume id must be set\n"
        );
    }
}
