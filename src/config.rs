//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// OpenStack credentials and endpoint selection derived from `OS_*`
/// environment variables and configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OS",
    discovery(
        app_name = "stackclone",
        env_var = "STACKCLONE_CONFIG_PATH",
        config_file_name = "stackclone.toml",
        dotfile_name = ".stackclone.toml",
        project_file_name = "stackclone.toml"
    )
)]
pub struct OpenStackConfig {
    /// Keystone identity endpoint, with or without the `/v3` suffix.
    pub auth_url: Option<String>,
    /// User name for password authentication.
    pub username: Option<String>,
    /// Password for password authentication.
    pub password: Option<String>,
    /// Domain owning the user. Defaults to `Default`.
    #[ortho_config(default = "Default".to_owned())]
    pub user_domain_name: String,
    /// Project to scope the token to, by name.
    pub project_name: Option<String>,
    /// Project to scope the token to, by identifier. Wins over the name.
    pub project_id: Option<String>,
    /// Domain owning the project. Defaults to `Default`.
    #[ortho_config(default = "Default".to_owned())]
    pub project_domain_name: String,
    /// Application credential identifier; takes precedence over passwords.
    pub application_credential_id: Option<String>,
    /// Application credential secret.
    pub application_credential_secret: Option<String>,
    /// Region whose endpoints are used. Overrides the `-r` flag when set.
    pub region_name: Option<String>,
    /// Catalog interface to use. Defaults to `public`.
    #[ortho_config(default = "public".to_owned())]
    pub interface: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to stackclone.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|inner| inner.trim().is_empty())
}

impl OpenStackConfig {
    fn require_field(value: Option<&str>, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if is_blank(value) {
            return Err(metadata.missing());
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stackclone")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns `true` when both application credential fields are present.
    #[must_use]
    pub fn uses_application_credential(&self) -> bool {
        !is_blank(self.application_credential_id.as_deref())
            && !is_blank(self.application_credential_secret.as_deref())
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable that supplies the missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the identity endpoint or
    /// the credentials for the selected authentication method are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            self.auth_url.as_deref(),
            &FieldMetadata::new("Keystone endpoint", "OS_AUTH_URL", "auth_url"),
        )?;
        if self.uses_application_credential() {
            return Ok(());
        }

        Self::require_field(
            self.username.as_deref(),
            &FieldMetadata::new("OpenStack user name", "OS_USERNAME", "username"),
        )?;
        Self::require_field(
            self.password.as_deref(),
            &FieldMetadata::new("OpenStack password", "OS_PASSWORD", "password"),
        )?;
        if is_blank(self.project_id.as_deref()) {
            Self::require_field(
                self.project_name.as_deref(),
                &FieldMetadata::new("OpenStack project", "OS_PROJECT_NAME", "project_name"),
            )?;
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
