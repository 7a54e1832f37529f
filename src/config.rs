// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Envkeep deals with two flavors of configuration file that share the same
//! flat `KEY=VALUE` format:
//!
//! - The __primary__ configuration is the single canonical settings file of
//!   envkeep itself. It must carry a `PRIMARY_VERSION` marker.
//! - An __environment__ configuration is a named, per-environment settings
//!   file. It must carry an `ENVIRONMENT_VERSION` marker.
//!
//! A file is only valid for a given flavor when it carries the matching marker
//! and not the other one.

use crate::store::{KeyValueStore, StoreError};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Version marker key of primary configuration files.
pub const PRIMARY_VERSION: &str = "PRIMARY_VERSION";

/// Version marker key of environment configuration files.
pub const ENVIRONMENT_VERSION: &str = "ENVIRONMENT_VERSION";

/// Toggle for automatic snapshot garbage collection.
pub const GC_AUTO: &str = "GC_AUTO";

/// Snapshot retention period in days.
pub const GC_PERIOD: &str = "GC_PERIOD";

/// Git URL of the remote that stores the configuration tree.
pub const REMOTE_STORAGE: &str = "REMOTE_STORAGE";

/// Optional override for the private key used with SSH remotes.
pub const SSH_KEY_PATH: &str = "SSH_KEY_PATH";

/// Default content of a freshly created primary configuration file.
pub const DEFAULT_PRIMARY_VERSION: &str = "1";

/// Flavor of a configuration file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// The canonical running configuration.
    #[default]
    Primary,

    /// A named environment configuration.
    Environment,
}

impl Flavor {
    /// Construct flavor from the usual "is secondary" switch.
    pub fn from_secondary(is_secondary: bool) -> Self {
        if is_secondary {
            Self::Environment
        } else {
            Self::Primary
        }
    }

    /// Marker key that files of this flavor must carry.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Primary => PRIMARY_VERSION,
            Self::Environment => ENVIRONMENT_VERSION,
        }
    }

    /// Check if this is the environment flavor.
    pub fn is_secondary(self) -> bool {
        matches!(self, Self::Environment)
    }
}

impl Display for Flavor {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Primary => fmt.write_str("primary"),
            Self::Environment => fmt.write_str("environment"),
        }
    }
}

/// Check configuration content against the markers expected of a flavor.
///
/// # Errors
///
/// - Return [`ValidationError::NoMarker`] if neither marker is set.
/// - Return [`ValidationError::PrimaryForEnvironment`] if an environment
///   flavor was expected but the primary marker is set.
/// - Return [`ValidationError::EnvironmentForPrimary`] if a primary flavor was
///   expected but the environment marker is set.
pub fn check_markers(store: &KeyValueStore, flavor: Flavor) -> Result<(), ValidationError> {
    let has_primary = store.contains_key(PRIMARY_VERSION);
    let has_environment = store.contains_key(ENVIRONMENT_VERSION);

    match flavor {
        _ if !has_primary && !has_environment => Err(ValidationError::NoMarker),
        Flavor::Environment if has_primary => Err(ValidationError::PrimaryForEnvironment),
        Flavor::Primary if has_environment => Err(ValidationError::EnvironmentForPrimary),
        _ => Ok(()),
    }
}

/// Load configuration file, and check it against the markers of a flavor.
///
/// # Errors
///
/// - Return [`ConfigError::Store`] if file cannot be loaded.
/// - Return [`ConfigError::Invalid`] if marker check fails.
pub fn validate(path: impl AsRef<Path>, flavor: Flavor) -> Result<KeyValueStore> {
    let path = path.as_ref();
    let store = KeyValueStore::read(path)?;
    check_markers(&store, flavor).map_err(|err| ConfigError::Invalid {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(store)
}

/// Rule broken by a configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Neither version marker is present.
    #[error("no valid versions (PRIMARY_VERSION or ENVIRONMENT_VERSION) found in the config file")]
    NoMarker,

    /// Environment update was invoked with a primary configuration file.
    #[error("environment config update invoked with primary config file")]
    PrimaryForEnvironment,

    /// Primary update was invoked with an environment configuration file.
    #[error("primary config update invoked with environment config file")]
    EnvironmentForPrimary,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file cannot be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration file carries the wrong version marker.
    #[error("invalid configuration file at {:?}", path.display())]
    Invalid {
        #[source]
        source: ValidationError,
        path: PathBuf,
    },
}

impl ConfigError {
    /// Rule that failed, if this was a validation failure.
    pub fn validation(&self) -> Option<ValidationError> {
        match self {
            Self::Invalid { source, .. } => Some(*source),
            Self::Store(_) => None,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[test_case("KEY=1", Flavor::Primary, Err(ValidationError::NoMarker); "no marker primary")]
    #[test_case("KEY=1", Flavor::Environment, Err(ValidationError::NoMarker); "no marker environment")]
    #[test_case("PRIMARY_VERSION=1", Flavor::Primary, Ok(()); "primary only primary")]
    #[test_case("PRIMARY_VERSION=1", Flavor::Environment, Err(ValidationError::PrimaryForEnvironment); "primary only environment")]
    #[test_case("ENVIRONMENT_VERSION=1", Flavor::Primary, Err(ValidationError::EnvironmentForPrimary); "environment only primary")]
    #[test_case("ENVIRONMENT_VERSION=1", Flavor::Environment, Ok(()); "environment only environment")]
    #[test_case("PRIMARY_VERSION=1\nENVIRONMENT_VERSION=1", Flavor::Primary, Err(ValidationError::EnvironmentForPrimary); "both primary")]
    #[test_case("PRIMARY_VERSION=1\nENVIRONMENT_VERSION=1", Flavor::Environment, Err(ValidationError::PrimaryForEnvironment); "both environment")]
    #[test]
    fn marker_matrix(content: &str, flavor: Flavor, expect: Result<(), ValidationError>) {
        let store: KeyValueStore = content.parse().unwrap();
        assert_eq!(check_markers(&store, flavor), expect);
    }

    #[test]
    fn marker_is_not_matched_by_substring() {
        let store: KeyValueStore = "KEY=1\n11ENVIRONMENT_VERSION=1".parse().unwrap();
        assert_eq!(
            check_markers(&store, Flavor::Environment),
            Err(ValidationError::NoMarker)
        );
    }

    #[test]
    fn validation_messages_name_the_failed_rule() {
        assert_eq!(
            ValidationError::NoMarker.to_string(),
            "no valid versions (PRIMARY_VERSION or ENVIRONMENT_VERSION) found in the config file"
        );
        assert_eq!(
            ValidationError::EnvironmentForPrimary.to_string(),
            "primary config update invoked with environment config file"
        );
        assert_eq!(
            ValidationError::PrimaryForEnvironment.to_string(),
            "environment config update invoked with primary config file"
        );
    }

    #[sealed_test]
    fn validate_reads_file_from_disk() -> anyhow::Result<()> {
        std::fs::write("dev.env", "ENVIRONMENT_VERSION=2\nDB_HOST=localhost\n")?;
        let store = validate("dev.env", Flavor::Environment)?;
        assert_eq!(store.get("db_host"), Some("localhost"));

        let error = validate("dev.env", Flavor::Primary).unwrap_err();
        assert_eq!(error.validation(), Some(ValidationError::EnvironmentForPrimary));

        let error = validate("missing.env", Flavor::Primary).unwrap_err();
        assert_eq!(error.validation(), None);

        Ok(())
    }
}
