//! Identity harvesting from local Git history via `git2`.
//!
//! Every commit reachable from any ref (branches, tags, remotes, HEAD) is
//! visited once. Author (and optionally committer) signatures are resolved
//! through the repository's `.mailmap`, the same way `git log --format=%aN`
//! reports them.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use git2::{Mailmap, Repository, Signature};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::RepositoryAccessError;

/// A distinct name/email pair recorded in Git history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AuthorSignature {
    /// Display name exactly as recorded.
    pub name: String,
    /// Email address exactly as recorded.
    pub email: String,
}

impl AuthorSignature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Lowercased email, the key that groups all variants of a contributor.
    pub fn canonical_key(&self) -> String {
        self.email.trim().to_lowercase()
    }

    /// The part of the email before `@`, if non-empty.
    pub fn email_local_part(&self) -> Option<&str> {
        self.email
            .trim()
            .split('@')
            .next()
            .filter(|local| !local.is_empty())
    }

    /// Every string form under which this contributor may appear.
    pub fn variants(&self) -> Vec<String> {
        let mut variants = Vec::with_capacity(4);
        let name = self.name.trim();
        if !name.is_empty() {
            variants.push(name.to_string());
        }
        if let Some(short) = short_username(name) {
            variants.push(short);
        }
        let email = self.email.trim();
        if !email.is_empty() {
            variants.push(email.to_string());
        }
        if let Some(local) = self.email_local_part() {
            variants.push(local.to_string());
        }
        variants
    }
}

/// Derive the formatted short username from a display name.
///
/// "Mario Mauer" becomes "mmauer": first character of the first name part
/// plus the whole last name part, lowercased. A single-part name is used
/// lowercased as-is.
pub fn short_username(name: &str) -> Option<String> {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => None,
        [single] => Some(single.to_lowercase()),
        [first, .., last] => {
            let initial = first.chars().next()?;
            Some(format!("{}{}", initial, last).to_lowercase())
        }
    }
}

/// Reads contributor signatures out of a local Git repository.
pub struct IdentityHarvester {
    repo: Repository,
    repo_path: PathBuf,
    include_committers: bool,
}

impl IdentityHarvester {
    /// Open the repository at `repo_path`.
    pub fn open<P: AsRef<Path>>(repo_path: P) -> Result<Self, RepositoryAccessError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository for identity harvesting");
        let repo = Repository::open(path)
            .map_err(|_| RepositoryAccessError::NotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            include_committers: false,
        })
    }

    /// Whether committer signatures are harvested in addition to authors.
    pub fn include_committers(mut self, include: bool) -> Self {
        self.include_committers = include;
        self
    }

    /// Collect distinct signatures across the whole reachable commit graph,
    /// sorted case-insensitively by email, then name.
    pub fn signatures(&self) -> Result<Vec<AuthorSignature>, RepositoryAccessError> {
        let mailmap = self.repo.mailmap().ok();
        let mut revwalk = self.repo.revwalk().map_err(|e| self.history_error(e))?;

        // Empty repositories have no HEAD; the glob still picks up any refs.
        if let Err(e) = revwalk.push_head() {
            debug!(error = %e, "HEAD not resolvable, walking refs only");
        }
        revwalk
            .push_glob("*")
            .map_err(|e| self.history_error(e))?;

        let mut seen = HashSet::new();
        let mut commits = 0usize;
        for oid in revwalk {
            let oid = oid.map_err(|e| self.history_error(e))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| self.history_error(e))?;
            commits += 1;

            let author = resolve(&mailmap, commit.author(), |mm| commit.author_with_mailmap(mm));
            seen.insert(author);
            if self.include_committers {
                let committer = resolve(&mailmap, commit.committer(), |mm| {
                    commit.committer_with_mailmap(mm)
                });
                seen.insert(committer);
            }
        }

        if commits == 0 {
            warn!(path = %self.repo_path.display(), "repository has no commits, no identities harvested");
        }

        let mut signatures: Vec<AuthorSignature> = seen
            .into_iter()
            .filter(|sig| {
                if sig.email.trim().is_empty() {
                    debug!(name = %sig.name, "skipping signature without email");
                    false
                } else {
                    true
                }
            })
            .collect();
        signatures.sort_by(|a, b| {
            a.email
                .to_lowercase()
                .cmp(&b.email.to_lowercase())
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.email.cmp(&b.email))
        });

        info!(commits, signatures = signatures.len(), "harvested git identities");
        Ok(signatures)
    }

    fn history_error(&self, err: git2::Error) -> RepositoryAccessError {
        RepositoryAccessError::History {
            path: self.repo_path.display().to_string(),
            detail: err.message().to_string(),
        }
    }
}

fn resolve<F>(mailmap: &Option<Mailmap>, raw: Signature<'_>, with_mailmap: F) -> AuthorSignature
where
    F: FnOnce(&Mailmap) -> Result<Signature<'static>, git2::Error>,
{
    match mailmap.as_ref().and_then(|mm| with_mailmap(mm).ok()) {
        Some(mapped) => to_author(&mapped),
        None => to_author(&raw),
    }
}

fn to_author(sig: &Signature<'_>) -> AuthorSignature {
    AuthorSignature::new(
        String::from_utf8_lossy(sig.name_bytes()).into_owned(),
        String::from_utf8_lossy(sig.email_bytes()).into_owned(),
    )
}

/// Harvest every distinct identity string of the repository at `repo_path`:
/// display names, short usernames, emails, and email local-parts, sorted
/// case-insensitively.
pub fn harvest_identities<P: AsRef<Path>>(repo_path: P) -> Result<Vec<String>, RepositoryAccessError> {
    let harvester = IdentityHarvester::open(repo_path)?;
    let signatures = harvester.signatures()?;
    Ok(identity_strings(&signatures))
}

/// Flatten signatures into their distinct variant strings.
pub fn identity_strings(signatures: &[AuthorSignature]) -> Vec<String> {
    let set: BTreeSet<String> = signatures.iter().flat_map(|sig| sig.variants()).collect();
    let mut strings: Vec<String> = set.into_iter().collect();
    strings.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    strings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_as, commit_with};

    #[test]
    fn test_short_username() {
        assert_eq!(short_username("Mario Mauer").as_deref(), Some("mmauer"));
        assert_eq!(short_username("Anna Maria Schmidt").as_deref(), Some("aschmidt"));
        assert_eq!(short_username("Linus").as_deref(), Some("linus"));
        assert_eq!(short_username("  Jürgen   Groß ").as_deref(), Some("jgroß"));
        assert_eq!(short_username("   "), None);
    }

    #[test]
    fn test_variants() {
        let sig = AuthorSignature::new("Mario Mauer", "Mario@X.com");
        assert_eq!(
            sig.variants(),
            vec!["Mario Mauer", "mmauer", "Mario@X.com", "Mario"]
        );
        assert_eq!(sig.canonical_key(), "mario@x.com");
    }

    #[test]
    fn test_harvest_all_branches() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_as(&repo, "Mario Mauer", "mario@x.com", "a.txt", "HEAD");
        repo.branch("feature", &repo.find_commit(first).unwrap(), false)
            .unwrap();
        commit_as(&repo, "Jane Doe", "jane@y.org", "b.txt", "refs/heads/feature");

        let identities = harvest_identities(dir.path()).unwrap();
        assert!(identities.contains(&"Mario Mauer".to_string()));
        assert!(identities.contains(&"mmauer".to_string()));
        assert!(identities.contains(&"jane@y.org".to_string()));
        assert!(identities.contains(&"jdoe".to_string()));
        assert!(identities.contains(&"jane".to_string()));
    }

    #[test]
    fn test_harvest_sorted_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_as(&repo, "zed", "Zed@z.io", "a.txt", "HEAD");
        commit_as(&repo, "Alice", "alice@a.io", "b.txt", "HEAD");

        let identities = harvest_identities(dir.path()).unwrap();
        let lowered: Vec<String> = identities.iter().map(|s| s.to_lowercase()).collect();
        let mut sorted = lowered.clone();
        sorted.sort();
        assert_eq!(lowered, sorted);
    }

    #[test]
    fn test_committers_are_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_with(
            &repo,
            ("Mario Mauer", "mario@x.com"),
            ("GitHub", "noreply@github.com"),
            "a.txt",
            "HEAD",
        );

        let identities = harvest_identities(dir.path()).unwrap();
        assert!(identities.contains(&"Mario Mauer".to_string()));
        assert!(!identities.iter().any(|i| i.eq_ignore_ascii_case("github")));

        let signatures = IdentityHarvester::open(dir.path())
            .unwrap()
            .include_committers(true)
            .signatures()
            .unwrap();
        assert_eq!(
            signatures,
            vec![
                AuthorSignature::new("Mario Mauer", "mario@x.com"),
                AuthorSignature::new("GitHub", "noreply@github.com"),
            ]
        );
    }

    #[test]
    fn test_mailmap_rewrites_author() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(
            dir.path().join(".mailmap"),
            "Mario Mauer <mario@x.com> <mm@old-laptop.local>\n",
        )
        .unwrap();
        commit_as(&repo, "mm", "mm@old-laptop.local", "a.txt", "HEAD");
        commit_as(&repo, "Mario Mauer", "mario@x.com", "b.txt", "HEAD");

        let signatures = IdentityHarvester::open(dir.path())
            .unwrap()
            .signatures()
            .unwrap();
        assert_eq!(signatures, vec![AuthorSignature::new("Mario Mauer", "mario@x.com")]);

        let identities = harvest_identities(dir.path()).unwrap();
        assert!(!identities.contains(&"mm@old-laptop.local".to_string()));
    }

    #[test]
    fn test_empty_repository() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let harvester = IdentityHarvester::open(dir.path()).unwrap();
        assert!(harvester.signatures().unwrap().is_empty());
    }

    #[test]
    fn test_repo_not_found() {
        assert!(matches!(
            harvest_identities("/nonexistent/repo"),
            Err(RepositoryAccessError::NotFound(_))
        ));
    }
}
