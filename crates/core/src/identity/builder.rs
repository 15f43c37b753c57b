//! Builds the variant → token mapping from harvested signatures.
//!
//! Each contributor is keyed by lowercased email and pseudonymized as the
//! SHA-256 hex digest of that key. Every variant (display name, short
//! username, email, email local-part) points at the contributor's token.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::harvester::AuthorSignature;
use super::mapping::{IdentityMapping, MatchSource};

/// Default marker prepended to automated tokens when a manual mapping is
/// merged in.
pub const DEFAULT_MARKER_PREFIX: &str = "EX_";

/// SHA-256 hex digest of the lowercased email.
pub fn pseudonym_token(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// Assembles an [`IdentityMapping`] for a single repository pass.
#[derive(Debug, Default)]
pub struct MappingBuilder {
    mapping: IdentityMapping,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every variant of `signature` under its contributor token.
    pub fn add_signature(&mut self, signature: &AuthorSignature) -> &mut Self {
        let token = pseudonym_token(&signature.canonical_key());
        for variant in signature.variants() {
            self.mapping.insert(variant, token.clone(), MatchSource::Automated);
        }
        self
    }

    /// Build from a sorted slice of signatures. Later signatures win variant
    /// collisions, so the input order must be deterministic.
    pub fn from_signatures(signatures: &[AuthorSignature]) -> IdentityMapping {
        let mut builder = Self::new();
        for signature in signatures {
            builder.add_signature(signature);
        }
        let mapping = builder.build();
        info!(
            contributors = count_contributors(signatures),
            variants = mapping.len(),
            "built identity mapping"
        );
        mapping
    }

    pub fn build(self) -> IdentityMapping {
        self.mapping
    }
}

fn count_contributors(signatures: &[AuthorSignature]) -> usize {
    signatures
        .iter()
        .map(|sig| sig.canonical_key())
        .collect::<HashSet<_>>()
        .len()
}

/// Overlay a manual mapping on an automated one.
///
/// Manual entries always win (case-insensitive key match) and are never
/// dropped. Automated entries whose token is not already used by any manual
/// entry get `marker_prefix` prepended, so every substituted value can be
/// traced to either the manual mapping or automated resolution.
pub fn merge_manual(
    automated: &IdentityMapping,
    manual: &IdentityMapping,
    marker_prefix: &str,
) -> IdentityMapping {
    let manual_tokens: HashSet<&str> = manual.entries().iter().map(|e| e.token.as_str()).collect();

    let mut merged = IdentityMapping::new();
    let mut overridden = 0usize;
    for entry in automated.entries() {
        if manual.contains(&entry.variant) {
            overridden += 1;
            continue;
        }
        let token = if manual_tokens.contains(entry.token.as_str()) {
            entry.token.clone()
        } else {
            format!("{}{}", marker_prefix, entry.token)
        };
        merged.insert(entry.variant.clone(), token, MatchSource::Automated);
    }
    for entry in manual.entries() {
        merged.insert(entry.variant.clone(), entry.token.clone(), MatchSource::Manual);
    }

    debug!(
        manual = manual.len(),
        overridden,
        total = merged.len(),
        "merged manual mapping"
    );
    merged
}
