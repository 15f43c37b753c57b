//! Identity resolution: from raw Git history to pseudonymous tokens.
//!
//! The pipeline is:
//! 1. Harvest distinct author/committer signatures from every ref
//! 2. Hash each contributor's lowercased email into a token and register
//!    every variant string under it
//! 3. Optionally overlay a manually curated mapping (highest priority)

pub mod builder;
pub mod harvester;
pub mod mapping;
pub mod mapping_file;

pub use builder::{merge_manual, pseudonym_token, MappingBuilder, DEFAULT_MARKER_PREFIX};
pub use harvester::{harvest_identities, short_username, AuthorSignature, IdentityHarvester};
pub use mapping::{IdentityMapping, MappingEntry, MatchSource};
pub use mapping_file::ManualMapping;
