//! repocrawl core library.
//!
//! This crate provides the anonymization side of repocrawl: harvesting
//! contributor identities from local Git history, building pseudonymous
//! identity mappings, substituting identities in extracted tabular data, and
//! orchestrating runs over whole storage trees.

pub mod config;
pub mod dataset;
pub mod errors;
pub mod identity;
pub mod orchestrator;
pub mod report;
pub mod substitute;

#[cfg(test)]
mod test_support;

// Re-exports for convenience.
pub use config::AnonymizeConfig;
pub use dataset::TabularDataset;
pub use errors::CoreError;
pub use identity::{harvest_identities, IdentityMapping};
pub use orchestrator::Anonymizer;
pub use report::{FileOutcome, RunSummary};
pub use substitute::{anonymize, IdentityMatcher};
