//! Fixture helpers shared by unit tests.

use std::path::Path;

use git2::{Commit, Oid, Repository, Signature};

/// Write `file`, stage it, and commit as `name <email>` onto `update_ref`.
pub(crate) fn commit_as(
    repo: &Repository,
    name: &str,
    email: &str,
    file: &str,
    update_ref: &str,
) -> Oid {
    commit_with(repo, (name, email), (name, email), file, update_ref)
}

/// Like [`commit_as`] with distinct author and committer identities.
pub(crate) fn commit_with(
    repo: &Repository,
    author: (&str, &str),
    committer: (&str, &str),
    file: &str,
    update_ref: &str,
) -> Oid {
    let workdir = repo.workdir().expect("non-bare repository");
    std::fs::write(workdir.join(file), format!("{}\n", author.0)).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let author = Signature::now(author.0, author.1).unwrap();
    let committer = Signature::now(committer.0, committer.1).unwrap();
    let parent = repo
        .refname_to_id(update_ref)
        .ok()
        .and_then(|oid| repo.find_commit(oid).ok());
    let parents: Vec<&Commit> = parent.iter().collect();
    repo.commit(Some(update_ref), &author, &committer, "commit", &tree, &parents)
        .unwrap()
}
