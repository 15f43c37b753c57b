//! TOML-based configuration for anonymization runs.
//!
//! Every section is optional: a run can be configured from environment
//! variables alone (`REPO_PATH`, `STORAGE_PATH`, `TARGET_PATH`, ...). Values
//! from the environment override the file, and are applied by
//! [`AnonymizeConfig::resolve_env_vars`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::identity::DEFAULT_MARKER_PREFIX;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnonymizeConfig {
    /// Source, destination, and repository paths.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Storage sub-path -> local Git repository, for batch runs.
    #[serde(default)]
    pub repositories: BTreeMap<String, PathBuf>,

    /// File name -> columns eligible for substitution.
    #[serde(default = "default_columns")]
    pub columns: BTreeMap<String, Vec<String>>,

    /// Mapping behaviour.
    #[serde(default)]
    pub mapping: MappingConfig,

    /// File name -> columns used to restrict output rows in custom-mapping
    /// runs.
    #[serde(default)]
    pub filter: BTreeMap<String, Vec<String>>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The built-in column allowlist.
pub fn default_columns() -> BTreeMap<String, Vec<String>> {
    let owned = |cols: &[&str]| cols.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        ("branches.csv".to_string(), owned(&["created_by", "last_author"])),
        ("commits.csv".to_string(), owned(&["author"])),
        (
            "pull_requests.csv".to_string(),
            owned(&["author", "merged_by", "requested_reviewers", "assignees"]),
        ),
        ("releases.csv".to_string(), owned(&["author"])),
    ])
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    /// Local Git repository used for identity harvesting (single-repo runs).
    #[serde(default)]
    pub repo_path: Option<PathBuf>,

    /// Root of the extracted data.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,

    /// Root of the anonymized copy.
    #[serde(default)]
    pub target_path: Option<PathBuf>,

    /// Where audit mappings are written. Unset means no mapping is persisted.
    #[serde(default)]
    pub mapping_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Identity mapping behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Overlay a manually curated mapping on the automated one.
    #[serde(default)]
    pub use_custom_mapping: bool,

    /// TOML or JSON file holding the manual mapping.
    #[serde(default)]
    pub custom_mapping_file: Option<PathBuf>,

    /// Prefix for automated tokens in custom-mapping runs.
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,

    /// Harvest committer identities as well as authors.
    #[serde(default)]
    pub include_committers: bool,
}

fn default_marker_prefix() -> String {
    DEFAULT_MARKER_PREFIX.into()
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            use_custom_mapping: false,
            custom_mapping_file: None,
            marker_prefix: default_marker_prefix(),
            include_committers: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; logs go to stderr otherwise.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AnonymizeConfig {
    /// Load an [`AnonymizeConfig`] from a TOML file at the given path.
    ///
    /// This does **not** apply environment overrides -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AnonymizeConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// A configuration with built-in defaults, for environment-only runs.
    pub fn from_defaults() -> Self {
        Self {
            columns: default_columns(),
            ..Default::default()
        }
    }

    /// Apply environment overrides on top of file values.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production).
    pub fn resolve_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("resolving environment overrides");
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REPO_PATH") {
            self.paths.repo_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("STORAGE_PATH") {
            self.paths.storage_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("TARGET_PATH") {
            self.paths.target_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("MAPPING_DIR") {
            self.paths.mapping_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CUSTOM_MAPPING_FILE") {
            self.mapping.custom_mapping_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("USE_CUSTOM_MAPPING") {
            self.mapping.use_custom_mapping = parse_bool(&v).ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: "USE_CUSTOM_MAPPING".into(),
                    detail: format!("expected a boolean, got {:?}", v),
                }
            })?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }

        debug!("environment override resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let storage = self.storage_path()?;
        let target = self.target_path()?;
        if storage == target {
            return Err(ConfigError::InvalidValue {
                field: "paths.target_path".into(),
                detail: "target must differ from storage".into(),
            });
        }
        if target.starts_with(storage) {
            return Err(ConfigError::InvalidValue {
                field: "paths.target_path".into(),
                detail: "target must not be inside the storage tree".into(),
            });
        }
        if let Some(mapping_dir) = &self.paths.mapping_dir {
            if mapping_dir.starts_with(target) {
                warn!(
                    path = %mapping_dir.display(),
                    "mapping_dir is inside the target tree; audit mappings would ship with the output"
                );
            }
        }
        if self.mapping.use_custom_mapping {
            if self.mapping.custom_mapping_file.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "mapping.custom_mapping_file".into(),
                    detail: "required when use_custom_mapping is enabled".into(),
                });
            }
            if self.mapping.marker_prefix.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "mapping.marker_prefix".into(),
                    detail: "must not be empty when use_custom_mapping is enabled".into(),
                });
            }
        }
        for (section, table) in [("columns", &self.columns), ("filter", &self.filter)] {
            for (file, columns) in table {
                if columns.iter().any(|c| c.trim().is_empty()) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("{}.\"{}\"", section, file),
                        detail: "column names must not be empty".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    pub fn storage_path(&self) -> Result<&Path, ConfigError> {
        required(&self.paths.storage_path, "paths.storage_path (STORAGE_PATH)")
    }

    pub fn target_path(&self) -> Result<&Path, ConfigError> {
        required(&self.paths.target_path, "paths.target_path (TARGET_PATH)")
    }

    pub fn repo_path(&self) -> Result<&Path, ConfigError> {
        required(&self.paths.repo_path, "paths.repo_path (REPO_PATH)")
    }
}

fn required<'a>(value: &'a Option<PathBuf>, field: &str) -> Result<&'a Path, ConfigError> {
    value.as_deref().ok_or_else(|| ConfigError::InvalidValue {
        field: field.into(),
        detail: "must be set".into(),
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
