//! Manually curated override mapping reader.
//!
//! Two formats are accepted, chosen by file extension. TOML:
//!
//! ```toml
//! [mappings]
//! jdoe = "CUSTOM_1"
//! "Jane Doe" = "CUSTOM_1"
//! ```
//!
//! or a flat JSON object (`.json`), the same shape as the audit mapping:
//!
//! ```json
//! { "jdoe": "CUSTOM_1", "Jane Doe": "CUSTOM_1" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::mapping::{IdentityMapping, MatchSource};
use crate::errors::MappingLoadError;

/// Wrapper around the TOML manual mapping structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManualMappingData {
    /// The `[mappings]` table: variant -> custom token.
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

/// Utilities for loading the manual override mapping.
pub struct ManualMapping;

impl ManualMapping {
    /// Load the manual mapping from disk. All entries are tagged
    /// [`MatchSource::Manual`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<IdentityMapping, MappingLoadError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading manual identity mapping");

        if !path.exists() {
            return Err(MappingLoadError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let entries: BTreeMap<String, String> = if is_json {
            serde_json::from_str(&contents).map_err(|e| MappingLoadError::ParseError {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?
        } else {
            let data: ManualMappingData =
                toml::from_str(&contents).map_err(|e| MappingLoadError::ParseError {
                    path: path.display().to_string(),
                    detail: e.to_string(),
                })?;
            data.mappings
        };

        let mut mapping = IdentityMapping::new();
        for (variant, token) in entries {
            if variant.trim().is_empty() {
                return Err(MappingLoadError::InvalidEntry {
                    path: path.display().to_string(),
                    detail: "empty variant".into(),
                });
            }
            if token.trim().is_empty() {
                return Err(MappingLoadError::InvalidEntry {
                    path: path.display().to_string(),
                    detail: format!("empty token for variant {:?}", variant),
                });
            }
            mapping.insert(variant, token, MatchSource::Manual);
        }

        debug!(count = mapping.len(), "loaded manual mappings");
        Ok(mapping)
    }
}
