//! Upload configuration.
//!
//! Settings come from an optional TOML file, overlaid by command-line flags
//! and environment variables, and are then validated into an [`UploadConfig`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming a config file to use when none is given explicitly.
pub const CONFIG_ENV: &str = "SQUAD_UPLOAD_CONFIG";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing mandatory setting `{0}`")]
    Missing(&'static str),
}

// ---------------------------------------------------------------------------
// Raw settings
// ---------------------------------------------------------------------------

/// Unvalidated settings as found in a config file or on the command line.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSettings {
    /// Jira REST API base, e.g. `https://jira.example.com/rest/api/2`.
    pub jira_endpoint: Option<String>,
    /// Zephyr Squad REST API base, e.g. `https://jira.example.com/rest/zapi/latest`.
    pub zephyr_endpoint: Option<String>,
    pub project: Option<String>,
    /// Without a version the cycle goes under "Unscheduled".
    pub version: Option<String>,
    pub components: Option<BTreeSet<String>>,
    /// Takes precedence over `components` when both are set.
    pub epics: Option<BTreeSet<String>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for UploadSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSettings")
            .field("jira_endpoint", &self.jira_endpoint)
            .field("zephyr_endpoint", &self.zephyr_endpoint)
            .field("project", &self.project)
            .field("version", &self.version)
            .field("components", &self.components)
            .field("epics", &self.epics)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl UploadSettings {
    /// Load settings from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded upload configuration");
        Ok(settings)
    }

    /// Find the file settings, in order:
    /// 1. `explicit`, which must load.
    /// 2. The path in `SQUAD_UPLOAD_CONFIG`; a broken file there is only warned about.
    /// 3. Nothing, leaving every setting to the command line.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(settings) => return Ok(settings),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{CONFIG_ENV} set but file could not be loaded, ignoring it"
                    );
                }
            }
        }

        debug!("no config file, using command-line settings only");
        Ok(Self::default())
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merge(self, other: UploadSettings) -> Self {
        Self {
            jira_endpoint: other.jira_endpoint.or(self.jira_endpoint),
            zephyr_endpoint: other.zephyr_endpoint.or(self.zephyr_endpoint),
            project: other.project.or(self.project),
            version: other.version.or(self.version),
            components: other.components.or(self.components),
            epics: other.epics.or(self.epics),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
        }
    }

    /// Check that every mandatory setting is present.
    pub fn validate(self) -> Result<UploadConfig, ConfigError> {
        fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        }

        Ok(UploadConfig {
            jira_endpoint: required(self.jira_endpoint, "jira_endpoint")?,
            zephyr_endpoint: required(self.zephyr_endpoint, "zephyr_endpoint")?,
            project: required(self.project, "project")?,
            username: required(self.username, "username")?,
            password: required(self.password, "password")?,
            version: self.version.filter(|v| !v.is_empty()),
            components: self.components.unwrap_or_default(),
            epics: self.epics.unwrap_or_default(),
            request_timeout: Duration::from_secs(
                self.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Validated config
// ---------------------------------------------------------------------------

/// Everything one upload run needs.
#[derive(Clone, PartialEq)]
pub struct UploadConfig {
    pub jira_endpoint: String,
    pub zephyr_endpoint: String,
    pub project: String,
    pub version: Option<String>,
    pub components: BTreeSet<String>,
    pub epics: BTreeSet<String>,
    pub username: String,
    pub password: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("jira_endpoint", &self.jira_endpoint)
            .field("zephyr_endpoint", &self.zephyr_endpoint)
            .field("project", &self.project)
            .field("version", &self.version)
            .field("components", &self.components)
            .field("epics", &self.epics)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl UploadConfig {
    pub fn new(
        jira_endpoint: impl Into<String>,
        zephyr_endpoint: impl Into<String>,
        project: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            jira_endpoint: jira_endpoint.into(),
            zephyr_endpoint: zephyr_endpoint.into(),
            project: project.into(),
            version: None,
            components: BTreeSet::new(),
            epics: BTreeSet::new(),
            username: username.into(),
            password: password.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_epics<I, S>(mut self, epics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.epics = epics.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Configured components, `None` when the set is empty.
    pub fn components(&self) -> Option<&BTreeSet<String>> {
        (!self.components.is_empty()).then_some(&self.components)
    }

    /// Configured epics, `None` when the set is empty.
    pub fn epics(&self) -> Option<&BTreeSet<String>> {
        (!self.epics.is_empty()).then_some(&self.epics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn complete() -> UploadSettings {
        UploadSettings {
            jira_endpoint: Some("https://jira/rest/api/2".into()),
            zephyr_endpoint: Some("https://jira/rest/zapi/latest".into()),
            project: Some("Project".into()),
            username: Some("ci".into()),
            password: Some("secret".into()),
            ..UploadSettings::default()
        }
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
jira_endpoint = "https://jira/rest/api/2"
zephyr_endpoint = "https://jira/rest/zapi/latest"
project = "Project"
version = "1.0"
components = ["auth", "billing"]
username = "ci"
password = "secret"
request_timeout_secs = 5
"#
        )
        .unwrap();

        let config = UploadSettings::load(file.path()).unwrap().validate().unwrap();
        assert_eq!(config.project, "Project");
        assert_eq!(config.version.as_deref(), Some("1.0"));
        assert_eq!(config.components().map(|c| c.len()), Some(2));
        assert_eq!(config.epics(), None);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "projekt = \"typo\"").unwrap();
        assert!(matches!(
            UploadSettings::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_reported() {
        let err = UploadSettings::discover(Some(Path::new("/nonexistent/upload.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let overlay = UploadSettings {
            project: Some("Other".into()),
            epics: Some(BTreeSet::from(["E-1".to_string()])),
            ..UploadSettings::default()
        };
        let merged = complete().merge(overlay);
        assert_eq!(merged.project.as_deref(), Some("Other"));
        assert_eq!(merged.username.as_deref(), Some("ci"));
        assert!(merged.epics.is_some());
    }

    #[test]
    fn test_validate_reports_missing_field() {
        let settings = UploadSettings {
            password: None,
            ..complete()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Missing("password"))
        ));

        let settings = UploadSettings {
            project: Some("  ".into()),
            ..complete()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Missing("project"))
        ));
    }

    #[test]
    fn test_empty_filters_are_unset() {
        let config = UploadSettings {
            components: Some(BTreeSet::new()),
            ..complete()
        }
        .validate()
        .unwrap();
        assert_eq!(config.components(), None);
        assert_eq!(config.version, None);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = complete().validate().unwrap();
        assert!(!format!("{config:?}").contains("secret"));
        assert!(!format!("{:?}", complete()).contains("secret"));
    }
}
