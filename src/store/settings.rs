//! Typed view of the flat string map a store is initialised with.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::wait::StatusWaiter;

/// Timeout applied to every wait when the map does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Delay between existence checks while confirming a deletion.
pub const DEFAULT_ENSURE_DELETED_DELAY: Duration = Duration::from_secs(10);

/// Snapshot method requested by the caller. Only [`CloneMethod::Clone`]
/// drives the clone flows; any other value stops after the initial clone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum CloneMethod {
    /// Run the full clone flow.
    #[default]
    Clone,
    /// Any other method name, kept verbatim.
    Other(String),
}

impl From<&str> for CloneMethod {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" | "clone" => Self::Clone,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for CloneMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clone => f.write_str("clone"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Errors raised while parsing store settings.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SettingsError {
    /// Raised when a duration key holds an unparseable value.
    #[error("invalid duration {value:?} for {key}")]
    InvalidDuration {
        /// Configuration key.
        key: String,
        /// Offending value.
        value: String,
    },
    /// Raised when a boolean key holds something other than `true`/`false`.
    #[error("invalid boolean {value:?} for {key}")]
    InvalidBool {
        /// Configuration key.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Immutable settings shared by both store variants.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreSettings {
    /// Region hint passed to the connector (`region`).
    pub region: Option<String>,
    /// Cloud name; when set, every `init` re-establishes the client (`cloud`).
    pub cloud: Option<String>,
    /// Requested snapshot method (`method`).
    pub method: CloneMethod,
    /// Timeout for block volume waits (`volumeTimeout`).
    pub volume_timeout: Duration,
    /// Timeout for snapshot waits (`snapshotTimeout`).
    pub snapshot_timeout: Duration,
    /// Timeout for replica waits (`replicaTimeout`).
    pub replica_timeout: Duration,
    /// Timeout for share waits (`shareTimeout`).
    pub share_timeout: Duration,
    /// Delete block volumes together with their snapshots (`cascadeDelete`).
    pub cascade_delete: bool,
    /// Send the requested zone when cloning block volumes (`enforceAZ`).
    pub enforce_az: bool,
    /// Confirm deletions by polling until the resource is gone (`ensureDeleted`).
    pub ensure_deleted: bool,
    /// Poll interval while confirming deletions (`ensureDeletedDelay`).
    pub ensure_deleted_delay: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            region: None,
            cloud: None,
            method: CloneMethod::Clone,
            volume_timeout: DEFAULT_TIMEOUT,
            snapshot_timeout: DEFAULT_TIMEOUT,
            replica_timeout: DEFAULT_TIMEOUT,
            share_timeout: DEFAULT_TIMEOUT,
            cascade_delete: false,
            enforce_az: false,
            ensure_deleted: false,
            ensure_deleted_delay: DEFAULT_ENSURE_DELETED_DELAY,
        }
    }
}

fn lookup<'a>(config: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn duration_or(
    config: &BTreeMap<String, String>,
    key: &str,
    fallback: Duration,
) -> Result<Duration, SettingsError> {
    lookup(config, key).map_or(Ok(fallback), |raw| {
        parse_duration(raw).ok_or_else(|| SettingsError::InvalidDuration {
            key: key.to_owned(),
            value: raw.to_owned(),
        })
    })
}

fn bool_or(config: &BTreeMap<String, String>, key: &str) -> Result<bool, SettingsError> {
    lookup(config, key).map_or(Ok(false), |raw| match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(SettingsError::InvalidBool {
            key: key.to_owned(),
            value: raw.to_owned(),
        }),
    })
}

impl StoreSettings {
    /// Parses the store configuration map. Missing or blank keys fall back to
    /// defaults; unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a duration or boolean value is invalid.
    pub fn from_map(config: &BTreeMap<String, String>) -> Result<Self, SettingsError> {
        Ok(Self {
            region: lookup(config, "region").map(str::to_owned),
            cloud: lookup(config, "cloud").map(str::to_owned),
            method: lookup(config, "method").map_or(CloneMethod::Clone, CloneMethod::from),
            volume_timeout: duration_or(config, "volumeTimeout", DEFAULT_TIMEOUT)?,
            snapshot_timeout: duration_or(config, "snapshotTimeout", DEFAULT_TIMEOUT)?,
            replica_timeout: duration_or(config, "replicaTimeout", DEFAULT_TIMEOUT)?,
            share_timeout: duration_or(config, "shareTimeout", DEFAULT_TIMEOUT)?,
            cascade_delete: bool_or(config, "cascadeDelete")?,
            enforce_az: bool_or(config, "enforceAZ")?,
            ensure_deleted: bool_or(config, "ensureDeleted")?,
            ensure_deleted_delay: duration_or(
                config,
                "ensureDeletedDelay",
                DEFAULT_ENSURE_DELETED_DELAY,
            )?,
        })
    }

    /// Returns a waiter for confirming a deletion within `timeout`, polling
    /// every `ensureDeletedDelay`.
    #[must_use]
    pub const fn deletion_waiter(&self, timeout: Duration) -> StatusWaiter {
        StatusWaiter::new(timeout).with_poll_interval(self.ensure_deleted_delay)
    }
}

/// Parses a duration written either as bare seconds (`300`) or in the
/// humantime grammar (`20m`, `1h30m`, `500ms`).
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if text.bytes().all(|byte| byte.is_ascii_digit()) {
        return text.parse().ok().map(Duration::from_secs);
    }
    humantime::parse_duration(text).ok()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[rstest]
    #[case("300", Duration::from_secs(300))]
    #[case("20m", Duration::from_secs(1200))]
    #[case("10s", Duration::from_secs(10))]
    #[case("1h30m", Duration::from_secs(5400))]
    #[case("500ms", Duration::from_millis(500))]
    #[case("0", Duration::ZERO)]
    #[case("2h 30min", Duration::from_secs(9000))]
    fn parses_durations(#[case] raw: &str, #[case] expected: Duration) {
        assert_eq!(parse_duration(raw), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("ten")]
    #[case("5x")]
    #[case("m5")]
    #[case("1.5h")]
    fn rejects_invalid_durations(#[case] raw: &str) {
        assert_eq!(parse_duration(raw), None);
    }

    #[test]
    fn empty_map_yields_defaults() {
        let settings = StoreSettings::from_map(&BTreeMap::new()).expect("defaults parse");
        assert_eq!(settings, StoreSettings::default());
        assert_eq!(settings.snapshot_timeout, DEFAULT_TIMEOUT);
        assert_eq!(settings.ensure_deleted_delay, Duration::from_secs(10));
    }

    #[test]
    fn parses_the_driver_configuration() {
        let settings = StoreSettings::from_map(&map(&[
            ("cascadeDelete", "true"),
            ("cloneTimeout", "20m"),
            ("enforceAZ", "true"),
            ("ensureDeleted", "true"),
            ("ensureDeletedDelay", "10s"),
            ("method", "clone"),
            ("region", ""),
            ("replicaTimeout", "20m"),
            ("shareTimeout", "20m"),
            ("snapshotTimeout", "20m"),
        ]))
        .expect("configuration parses");
        assert!(settings.cascade_delete && settings.enforce_az && settings.ensure_deleted);
        assert_eq!(settings.region, None);
        assert_eq!(settings.method, CloneMethod::Clone);
        assert_eq!(settings.replica_timeout, Duration::from_secs(1200));
        assert_eq!(settings.volume_timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = StoreSettings::from_map(&map(&[("snapshotTimeout", "soon")]))
            .expect_err("invalid duration");
        assert!(err.to_string().contains("snapshotTimeout"));
        let bool_err = StoreSettings::from_map(&map(&[("ensureDeleted", "maybe")]))
            .expect_err("invalid boolean");
        assert_eq!(
            bool_err,
            SettingsError::InvalidBool {
                key: String::from("ensureDeleted"),
                value: String::from("maybe"),
            }
        );
    }

    #[rstest]
    #[case("clone", CloneMethod::Clone)]
    #[case("", CloneMethod::Clone)]
    #[case("snapshot", CloneMethod::Other(String::from("snapshot")))]
    fn parses_methods(#[case] raw: &str, #[case] expected: CloneMethod) {
        assert_eq!(CloneMethod::from(raw), expected);
    }
}
