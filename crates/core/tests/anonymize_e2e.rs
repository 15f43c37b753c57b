//! End-to-end tests for anonymization runs.
//!
//! These tests exercise the real `Anonymizer` with:
//! - Local Git repositories built with `git2` (no `git` binary needed)
//! - Extracted CSV/JSON trees on disk
//! - Real manual mapping files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::{Commit, Repository, Signature};
use tempfile::TempDir;

use repocrawl_core::config::AnonymizeConfig;
use repocrawl_core::identity::pseudonym_token;
use repocrawl_core::orchestrator::Anonymizer;
use repocrawl_core::report::FileOutcome;
use repocrawl_core::TabularDataset;

// ===========================================================================
// Helpers
// ===========================================================================

fn init_repo(dir: &Path, authors: &[(&str, &str)]) {
    init_repo_committed_by(dir, authors, None);
}

/// Like `init_repo`, with every commit recorded by `committer` when given.
fn init_repo_committed_by(dir: &Path, authors: &[(&str, &str)], committer: Option<(&str, &str)>) {
    let repo = Repository::init(dir).unwrap();
    for (i, (name, email)) in authors.iter().enumerate() {
        let file = format!("file{i}.txt");
        std::fs::write(dir.join(&file), name).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(&file)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now(name, email).unwrap();
        let committer_sig = match committer {
            Some((c_name, c_email)) => Signature::now(c_name, c_email).unwrap(),
            None => sig.clone(),
        };
        let parent = repo
            .refname_to_id("HEAD")
            .ok()
            .and_then(|oid| repo.find_commit(oid).ok());
        let parents: Vec<&Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &committer_sig, "work", &tree, &parents)
            .unwrap();
    }
}

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        Self { _tmp: tmp, root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }
}

fn cell(path: &Path, row: usize, column: &str) -> String {
    let dataset = TabularDataset::load(path).unwrap();
    dataset
        .cell(row, column)
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string()
}

// ===========================================================================
// Single repository
// ===========================================================================

#[test]
fn test_pull_requests_only_allowlisted_columns() {
    let fx = Fixture::new();
    init_repo(&fx.path("repo"), &[("Mario Mauer", "mario@x.com")]);
    let original = "number,title,author,assignees\n\
                    7,Mario Mauer fixes login,mmauer,\"['mario', 'Mario Mauer']\"\n";
    fx.write("store/pull_requests.csv", original);

    let anonymizer = Anonymizer::new(&AnonymizeConfig::from_defaults()).unwrap();
    let summary = anonymizer
        .anonymize_repository(&fx.path("repo"), &fx.path("store"), &fx.path("out"))
        .unwrap();
    assert!(summary.is_complete());

    let t1 = pseudonym_token("mario@x.com");
    let out = fx.path("out/pull_requests.csv");
    assert_eq!(cell(&out, 0, "author"), t1);
    assert_eq!(cell(&out, 0, "assignees"), format!("['{t1}', '{t1}']"));
    // title is not allowlisted and stays byte-identical
    assert_eq!(cell(&out, 0, "title"), "Mario Mauer fixes login");
    assert_eq!(cell(&out, 0, "number"), "7");
}

#[test]
fn test_rerun_on_output_is_noop() {
    let fx = Fixture::new();
    init_repo(&fx.path("repo"), &[("Mario Mauer", "mario@x.com")]);
    fx.write("store/commits.csv", "sha,author\na1,Mario Mauer\n");

    let anonymizer = Anonymizer::new(&AnonymizeConfig::from_defaults()).unwrap();
    anonymizer
        .anonymize_repository(&fx.path("repo"), &fx.path("store"), &fx.path("out1"))
        .unwrap();
    anonymizer
        .anonymize_repository(&fx.path("repo"), &fx.path("out1"), &fx.path("out2"))
        .unwrap();

    assert_eq!(fx.read("out1/commits.csv"), fx.read("out2/commits.csv"));
}

#[test]
fn test_hosting_committer_does_not_touch_bot_names() {
    let fx = Fixture::new();
    init_repo_committed_by(
        &fx.path("repo"),
        &[("Mario Mauer", "mario@x.com")],
        Some(("GitHub", "noreply@github.com")),
    );
    let original = "author\ngithub-actions[bot]\nMario Mauer\n";
    fx.write("store/commits.csv", original);

    let anonymizer = Anonymizer::new(&AnonymizeConfig::from_defaults()).unwrap();
    anonymizer
        .anonymize_repository(&fx.path("repo"), &fx.path("store"), &fx.path("out"))
        .unwrap();

    let out = fx.path("out/commits.csv");
    assert_eq!(cell(&out, 0, "author"), "github-actions[bot]");
    assert_eq!(cell(&out, 1, "author"), pseudonym_token("mario@x.com"));
}

#[test]
fn test_custom_mapping_overrides_and_marks() {
    let fx = Fixture::new();
    init_repo(
        &fx.path("repo"),
        &[("John Doe", "jdoe@corp.com"), ("Ann Lee", "ann@corp.com")],
    );
    fx.write("manual.toml", "[mappings]\njdoe = \"CUSTOM_1\"\n");
    fx.write(
        "store/commits.csv",
        "sha,author\na1,jdoe\na2,Ann Lee\na3,someone else\n",
    );

    let mut config = AnonymizeConfig::from_defaults();
    config.mapping.use_custom_mapping = true;
    config.mapping.custom_mapping_file = Some(fx.path("manual.toml"));

    let anonymizer = Anonymizer::new(&config).unwrap();
    anonymizer
        .anonymize_repository(&fx.path("repo"), &fx.path("store"), &fx.path("out"))
        .unwrap();

    let out = fx.path("out/commits.csv");
    assert_eq!(cell(&out, 0, "author"), "CUSTOM_1");
    assert_eq!(
        cell(&out, 1, "author"),
        format!("EX_{}", pseudonym_token("ann@corp.com"))
    );
    assert_eq!(cell(&out, 2, "author"), "someone else");
}

#[test]
fn test_custom_mapping_row_filter() {
    let fx = Fixture::new();
    init_repo(&fx.path("repo"), &[("John Doe", "jdoe@corp.com")]);
    fx.write("manual.json", r#"{ "jdoe": "CUSTOM_1" }"#);
    fx.write(
        "store/branches.csv",
        "name,created_by,last_author\nmain,jdoe,other\nfeat,other,other\n",
    );

    let mut config = AnonymizeConfig::from_defaults();
    config.mapping.use_custom_mapping = true;
    config.mapping.custom_mapping_file = Some(fx.path("manual.json"));
    config.filter = BTreeMap::from([(
        "branches.csv".to_string(),
        vec!["created_by".to_string(), "last_author".to_string()],
    )]);

    let anonymizer = Anonymizer::new(&config).unwrap();
    let summary = anonymizer
        .anonymize_repository(&fx.path("repo"), &fx.path("store"), &fx.path("out"))
        .unwrap();

    assert_eq!(fx.read("out/branches.csv"), "name,created_by,last_author\nmain,CUSTOM_1,other\n");
    assert!(matches!(
        summary.files[0].outcome,
        FileOutcome::Anonymized { rows: 1, rows_filtered: 1, .. }
    ));
}

#[test]
fn test_mapping_persisted_for_audit() {
    let fx = Fixture::new();
    init_repo(&fx.path("repo"), &[("Mario Mauer", "mario@x.com")]);
    fx.write("store/commits.csv", "author\nmario\n");

    let mut config = AnonymizeConfig::from_defaults();
    config.paths.mapping_dir = Some(fx.path("audit"));
    let anonymizer = Anonymizer::new(&config).unwrap();
    anonymizer
        .anonymize_repository(&fx.path("repo"), &fx.path("store"), &fx.path("out"))
        .unwrap();

    let mapping: serde_json::Value = serde_json::from_str(&fx.read("audit/mapping.json")).unwrap();
    assert_eq!(mapping["mmauer"], pseudonym_token("mario@x.com"));
    assert!(!fx.path("out/mapping.json").exists());
}

// ===========================================================================
// Batch
// ===========================================================================

#[test]
fn test_batch_resolves_each_repository_independently() {
    let fx = Fixture::new();
    init_repo(&fx.path("git/alpha"), &[("Mario Mauer", "mario@x.com")]);
    init_repo(&fx.path("git/beta"), &[("Jane Roe", "jane@y.org")]);
    fx.write("store/alpha/commits.csv", "author\nmario and jroe\n");
    fx.write("store/beta/commits.csv", "author\nmario and jroe\n");
    fx.write("store/beta/runs.json", "[]");
    fx.write("store/gamma/commits.csv", "author\nmario\n");
    fx.write("store/broken/commits.csv", "author\nmario\n");

    let repositories = BTreeMap::from([
        ("alpha".to_string(), fx.path("git/alpha")),
        ("beta".to_string(), fx.path("git/beta")),
        ("broken".to_string(), fx.path("git/missing")),
    ]);
    let anonymizer = Anonymizer::new(&AnonymizeConfig::from_defaults()).unwrap();
    let summary = anonymizer
        .anonymize_batch(&fx.path("store"), &fx.path("out"), &repositories)
        .unwrap();

    let mario = pseudonym_token("mario@x.com");
    let jane = pseudonym_token("jane@y.org");
    assert_eq!(fx.read("out/alpha/commits.csv"), format!("author\n{mario} and jroe\n"));
    assert_eq!(fx.read("out/beta/commits.csv"), format!("author\nmario and {jane}\n"));
    assert_eq!(fx.read("out/beta/runs.json"), "[]");

    // no git path, or unreadable history: nothing written, reported as skipped
    assert!(!fx.path("out/gamma").exists());
    assert!(!fx.path("out/broken").exists());
    assert_eq!(summary.anonymized(), 2);
    assert_eq!(summary.copied(), 1);
    assert_eq!(summary.skipped(), 2);
    assert!(summary
        .files
        .iter()
        .any(|f| f.repository == "gamma" && matches!(f.outcome, FileOutcome::Skipped { .. })));
}

#[test]
fn test_batch_nested_keys_own_their_files() {
    let fx = Fixture::new();
    init_repo(&fx.path("git/org"), &[("Mario Mauer", "mario@x.com")]);
    init_repo(&fx.path("git/w"), &[("Jane Roe", "jane@y.org")]);
    fx.write("store/org/commits.csv", "author\nmario\n");
    fx.write("store/org/w/commits.csv", "author\njane\n");

    let repositories = BTreeMap::from([
        ("org".to_string(), fx.path("git/org")),
        ("org/w".to_string(), fx.path("git/w")),
    ]);
    let anonymizer = Anonymizer::new(&AnonymizeConfig::from_defaults()).unwrap();
    let summary = anonymizer
        .anonymize_batch(&fx.path("store"), &fx.path("out"), &repositories)
        .unwrap();

    assert_eq!(summary.files.len(), 2);
    let owners: Vec<(&str, PathBuf)> = summary
        .files
        .iter()
        .map(|f| (f.repository.as_str(), f.file.clone()))
        .collect();
    assert_eq!(
        owners,
        vec![
            ("org", PathBuf::from("commits.csv")),
            ("org/w", PathBuf::from("commits.csv")),
        ]
    );
    assert!(summary.files.iter().all(|f| matches!(
        f.outcome,
        FileOutcome::Anonymized { cells_changed: 1, .. }
    )));
    assert_eq!(
        fx.read("out/org/w/commits.csv"),
        format!("author\n{}\n", pseudonym_token("jane@y.org"))
    );
}
