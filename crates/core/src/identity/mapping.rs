//! The variant → token mapping for one repository.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Where a mapping entry came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    /// Derived from Git history and hashed.
    Automated,
    /// Supplied by the manually curated override mapping.
    Manual,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSource::Automated => write!(f, "automated"),
            MatchSource::Manual => write!(f, "manual"),
        }
    }
}

/// A single variant string and the token that replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingEntry {
    pub variant: String,
    pub token: String,
    pub source: MatchSource,
}

/// Ordered variant → token pairs.
///
/// Keys are unique case-insensitively. Iteration order is variant length
/// (in characters) descending, ties broken case-insensitively ascending, so
/// the longest candidate is always tried first.
#[derive(Debug, Clone, Default)]
pub struct IdentityMapping {
    entries: Vec<MappingEntry>,
    index: HashMap<String, usize>,
}

impl IdentityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `variant` (case-insensitive key).
    ///
    /// Returns the previous entry when the key was already claimed. A
    /// collision between two different tokens is logged; the new entry wins.
    pub fn insert(
        &mut self,
        variant: impl Into<String>,
        token: impl Into<String>,
        source: MatchSource,
    ) -> Option<MappingEntry> {
        let entry = MappingEntry {
            variant: variant.into(),
            token: token.into(),
            source,
        };
        let key = entry.variant.to_lowercase();
        match self.index.get(&key) {
            Some(&pos) => {
                let previous = std::mem::replace(&mut self.entries[pos], entry);
                if previous.token != self.entries[pos].token {
                    warn!(
                        variant = %self.entries[pos].variant,
                        "variant claimed by two identities, last one wins"
                    );
                }
                Some(previous)
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, variant: &str) -> Option<&MappingEntry> {
        self.index
            .get(&variant.to_lowercase())
            .map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, variant: &str) -> bool {
        self.index.contains_key(&variant.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in longest-first order.
    pub fn entries(&self) -> Vec<&MappingEntry> {
        let mut sorted: Vec<&MappingEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| {
            b.variant
                .chars()
                .count()
                .cmp(&a.variant.chars().count())
                .then_with(|| a.variant.to_lowercase().cmp(&b.variant.to_lowercase()))
        });
        sorted
    }

    /// Entries contributed by a given source.
    pub fn by_source(&self, source: MatchSource) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(move |e| e.source == source)
    }

    /// Restrict to entries of a single source.
    pub fn only(&self, source: MatchSource) -> IdentityMapping {
        let mut mapping = IdentityMapping::new();
        for entry in self.by_source(source) {
            mapping.insert(entry.variant.clone(), entry.token.clone(), entry.source);
        }
        mapping
    }

    /// Write the mapping as a JSON object (variant → token) for auditing.
    ///
    /// The file reverses the anonymization and must never be distributed
    /// with anonymized output.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        let mut object = serde_json::Map::new();
        for entry in self.entries() {
            object.insert(
                entry.variant.clone(),
                serde_json::Value::String(entry.token.clone()),
            );
        }
        let json = serde_json::to_string_pretty(&serde_json::Value::Object(object))
            .map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        info!(path = %path.display(), entries = self.len(), "saved identity mapping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_first_order() {
        let mut mapping = IdentityMapping::new();
        mapping.insert("Mario", "t1", MatchSource::Automated);
        mapping.insert("Mario Mauer", "t1", MatchSource::Automated);
        mapping.insert("bob", "t2", MatchSource::Automated);
        mapping.insert("Anna", "t3", MatchSource::Automated);

        let order: Vec<&str> = mapping.entries().iter().map(|e| e.variant.as_str()).collect();
        assert_eq!(order, vec!["Mario Mauer", "Mario", "Anna", "bob"]);
    }

    #[test]
    fn test_case_insensitive_keys_last_wins() {
        let mut mapping = IdentityMapping::new();
        mapping.insert("mmauer", "t1", MatchSource::Automated);
        let previous = mapping.insert("MMauer", "t2", MatchSource::Automated);

        assert_eq!(previous.unwrap().token, "t1");
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("MMAUER").unwrap().token, "t2");
    }

    #[test]
    fn test_save_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("mapping.json");
        let mut mapping = IdentityMapping::new();
        mapping.insert("jdoe", "abc", MatchSource::Automated);
        mapping.save_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["jdoe"], "abc");
    }
}
