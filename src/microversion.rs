//! Shared filesystem API microversions.
//!
//! Microversions are `major.minor` pairs compared numerically, so `2.10`
//! sorts after `2.9`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A `major.minor` API microversion.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Microversion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
}

impl Microversion {
    /// Oldest microversion the share store can operate with.
    pub const MINIMUM: Self = Self::new(2, 7);
    /// First microversion exposing the `share-access-rules` collection.
    pub const ACCESS_RULES: Self = Self::new(2, 45);

    /// Builds a microversion from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Microversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Microversion {
    type Err = MicroversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MicroversionError::Invalid(value.to_owned());
        let (major, minor) = value.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Comparison operator accepted by [`compare`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparison {
    /// Holds when the wanted version is less than or equal to the held one.
    Lte,
    /// Holds when the wanted version is greater than or equal to the held one.
    Gte,
}

impl FromStr for Comparison {
    type Err = MicroversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "lte" => Ok(Self::Lte),
            "gte" => Ok(Self::Gte),
            other => Err(MicroversionError::InvalidOperator(other.to_owned())),
        }
    }
}

/// Errors raised while parsing or comparing microversions.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MicroversionError {
    /// Raised when a version string is not of the form `major.minor`.
    #[error("invalid microversion: {0:?}")]
    Invalid(String),
    /// Raised when the comparison operator is neither `lte` nor `gte`.
    #[error("invalid microversion comparison operator {0:?}, expected lte or gte")]
    InvalidOperator(String),
}

/// Compares two microversion strings with a textual operator.
///
/// `compare("lte", "2.45", have)` answers whether `have` is at least 2.45.
///
/// # Errors
///
/// Returns [`MicroversionError`] when the operator is unknown or either
/// version fails to parse.
pub fn compare(op: &str, want: &str, have: &str) -> Result<bool, MicroversionError> {
    let comparison: Comparison = op.parse()?;
    let wanted: Microversion = want.parse()?;
    let held: Microversion = have.parse()?;
    Ok(match comparison {
        Comparison::Lte => wanted <= held,
        Comparison::Gte => wanted >= held,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("lte", "2.7", "2.7", true)]
    #[case("lte", "2.7", "2.45", true)]
    #[case("lte", "2.45", "2.7", false)]
    #[case("lte", "2.9", "2.10", true)]
    #[case("gte", "2.7", "2.7", true)]
    #[case("gte", "2.45", "2.7", true)]
    #[case("gte", "2.7", "2.45", false)]
    #[case("gte", "3.0", "2.99", true)]
    #[case("lte", "2.7", "2.50", true)]
    #[case("lte", "3.7", "2.50", false)]
    #[case("gte", "2.50", "2.50", true)]
    fn compares_numerically(
        #[case] op: &str,
        #[case] want: &str,
        #[case] have: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(compare(op, want, have), Ok(expected));
    }

    #[rstest]
    #[case("eq", "2.7", "2.7")]
    #[case("", "2.7", "2.7")]
    fn rejects_unknown_operators(#[case] op: &str, #[case] want: &str, #[case] have: &str) {
        assert_eq!(
            compare(op, want, have),
            Err(MicroversionError::InvalidOperator(op.to_owned()))
        );
    }

    #[rstest]
    #[case("2")]
    #[case("2.x")]
    #[case("latest")]
    fn rejects_malformed_versions(#[case] raw: &str) {
        assert_eq!(
            raw.parse::<Microversion>(),
            Err(MicroversionError::Invalid(raw.to_owned()))
        );
    }

    #[test]
    fn displays_as_major_dot_minor() {
        assert_eq!(Microversion::ACCESS_RULES.to_string(), "2.45");
        assert_eq!(" 2.51 ".parse(), Ok(Microversion::new(2, 51)));
    }
}
