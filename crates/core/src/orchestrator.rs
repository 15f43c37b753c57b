//! Anonymization of extracted data trees.
//!
//! For each repository the identity mapping is built once from its Git
//! history and compiled once; every file of the repository's storage
//! directory is then either anonymized (allowlisted file names), copied
//! byte-for-byte (everything else), or skipped with a reason (unparseable
//! tabular files, repositories without readable history).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::config::AnonymizeConfig;
use crate::dataset::TabularDataset;
use crate::errors::{ConfigError, CoreError};
use crate::identity::{
    merge_manual, IdentityHarvester, IdentityMapping, ManualMapping, MappingBuilder, MatchSource,
};
use crate::report::{FileOutcome, RunSummary};
use crate::substitute::{anonymize_columns, retain_matching_rows, IdentityMatcher};

/// Compiled matchers for a single repository pass.
struct RepositoryPass {
    matcher: IdentityMatcher,
    /// Manual-only matcher used to restrict rows, when a manual mapping is
    /// active.
    filter_matcher: Option<IdentityMatcher>,
}

/// Drives harvesting, mapping, and substitution over storage trees.
pub struct Anonymizer {
    columns: BTreeMap<String, Vec<String>>,
    filter: BTreeMap<String, Vec<String>>,
    manual: Option<IdentityMapping>,
    marker_prefix: String,
    include_committers: bool,
    mapping_dir: Option<PathBuf>,
}

impl Anonymizer {
    /// Create an anonymizer from configuration. The manual mapping, if
    /// enabled, is loaded here so a malformed file fails before any output
    /// is written.
    pub fn new(config: &AnonymizeConfig) -> Result<Self, CoreError> {
        let manual = if config.mapping.use_custom_mapping {
            let path = config.mapping.custom_mapping_file.as_ref().ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: "mapping.custom_mapping_file".into(),
                    detail: "required when use_custom_mapping is enabled".into(),
                }
            })?;
            Some(ManualMapping::load(path)?)
        } else {
            if !config.filter.is_empty() {
                warn!("row filter configured without use_custom_mapping, it will be ignored");
            }
            None
        };

        Ok(Self {
            columns: config.columns.clone(),
            filter: config.filter.clone(),
            manual,
            marker_prefix: config.mapping.marker_prefix.clone(),
            include_committers: config.mapping.include_committers,
            mapping_dir: config.paths.mapping_dir.clone(),
        })
    }

    /// Harvest the repository at `repo_path` and build its mapping, merged
    /// with the manual mapping when one is loaded.
    pub fn build_mapping(&self, repo_path: &Path) -> Result<IdentityMapping, CoreError> {
        let signatures = {
            let harvester =
                IdentityHarvester::open(repo_path)?.include_committers(self.include_committers);
            harvester.signatures()?
        };
        let automated = MappingBuilder::from_signatures(&signatures);
        Ok(match &self.manual {
            Some(manual) => merge_manual(&automated, manual, &self.marker_prefix),
            None => automated,
        })
    }

    /// Anonymize one repository's storage directory into `target_dir`.
    ///
    /// Fails without writing anything if the Git history cannot be read or
    /// the mapping is degenerate.
    #[instrument(skip(self), fields(repo = %repo_path.display()))]
    pub fn anonymize_repository(
        &self,
        repo_path: &Path,
        source_dir: &Path,
        target_dir: &Path,
    ) -> Result<RunSummary, CoreError> {
        ensure_disjoint(source_dir, target_dir)?;
        let mut summary = RunSummary::new();
        self.run_repository("", repo_path, source_dir, target_dir, &[], &mut summary)?;
        summary.finish();
        info!(
            anonymized = summary.anonymized(),
            copied = summary.copied(),
            skipped = summary.skipped(),
            "repository anonymization finished"
        );
        Ok(summary)
    }

    /// Anonymize every repository under `storage_root`.
    ///
    /// `repositories` maps a storage sub-path to its local Git repository.
    /// Repositories without an entry, or whose history cannot be read, are
    /// skipped entirely and their files reported as skipped. A file belongs
    /// to the longest key that contains it, so nested keys never share files.
    #[instrument(skip(self, repositories))]
    pub fn anonymize_batch(
        &self,
        storage_root: &Path,
        target_root: &Path,
        repositories: &BTreeMap<String, PathBuf>,
    ) -> Result<RunSummary, CoreError> {
        self.anonymize_batch_with(storage_root, target_root, repositories, |_| {})
    }

    /// Like [`anonymize_batch`](Self::anonymize_batch), calling `on_repository`
    /// with each repository identifier before it is processed.
    pub fn anonymize_batch_with<F>(
        &self,
        storage_root: &Path,
        target_root: &Path,
        repositories: &BTreeMap<String, PathBuf>,
        mut on_repository: F,
    ) -> Result<RunSummary, CoreError>
    where
        F: FnMut(&str),
    {
        ensure_disjoint(storage_root, target_root)?;
        let mut summary = RunSummary::new();

        for (id, repo_path) in repositories {
            on_repository(id);
            let source_dir = storage_root.join(id);
            if !source_dir.is_dir() {
                warn!(repository = %id, path = %source_dir.display(), "no stored data for repository");
                continue;
            }
            let target_dir = target_root.join(id);
            let nested = nested_keys(id, repositories);
            match self.run_repository(id, repo_path, &source_dir, &target_dir, &nested, &mut summary) {
                Ok(()) => {}
                Err(CoreError::RepositoryAccess(e)) => {
                    warn!(repository = %id, error = %e, "git history unreadable, skipping repository");
                    skip_tree(id, &source_dir, &nested, &e.to_string(), &mut summary)?;
                }
                Err(e) => return Err(e),
            }
        }

        // Anything not under a configured repository is left alone.
        for file in files_under(storage_root)? {
            let relative = file.strip_prefix(storage_root).unwrap_or(&file);
            let covered = repositories
                .keys()
                .any(|id| relative.starts_with(Path::new(id)));
            if !covered {
                let repository = relative
                    .components()
                    .next()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .unwrap_or_default();
                warn!(file = %relative.display(), "no git repository configured, skipping");
                summary.record(
                    &repository,
                    relative,
                    FileOutcome::Skipped {
                        reason: "no git repository configured for this path".into(),
                    },
                );
            }
        }

        summary.finish();
        info!(
            anonymized = summary.anonymized(),
            copied = summary.copied(),
            skipped = summary.skipped(),
            "batch anonymization finished"
        );
        Ok(summary)
    }

    fn run_repository(
        &self,
        repository: &str,
        repo_path: &Path,
        source_dir: &Path,
        target_dir: &Path,
        excluded: &[PathBuf],
        summary: &mut RunSummary,
    ) -> Result<(), CoreError> {
        let mapping = self.build_mapping(repo_path)?;
        let pass = self.prepare(&mapping)?;
        self.persist_mapping(repository, &mapping)?;

        for source in files_under(source_dir)? {
            let relative = source.strip_prefix(source_dir).unwrap_or(&source).to_path_buf();
            if is_excluded(&relative, excluded) {
                continue;
            }
            let target = target_dir.join(&relative);
            let outcome = self.process_file(&pass, &source, &target)?;
            summary.record(repository, relative, outcome);
        }
        Ok(())
    }

    fn prepare(&self, mapping: &IdentityMapping) -> Result<RepositoryPass, CoreError> {
        let matcher = IdentityMatcher::compile(mapping)?;
        let filter_matcher = match &self.manual {
            Some(_) => Some(IdentityMatcher::compile(&mapping.only(MatchSource::Manual))?),
            None => None,
        };
        Ok(RepositoryPass {
            matcher,
            filter_matcher,
        })
    }

    fn process_file(
        &self,
        pass: &RepositoryPass,
        source: &Path,
        target: &Path,
    ) -> Result<FileOutcome, CoreError> {
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let Some(columns) = self.columns.get(file_name) else {
            debug!(file = %source.display(), "not allowlisted, copying verbatim");
            ensure_parent(target)?;
            std::fs::copy(source, target).map_err(|e| CoreError::io(source, e))?;
            return Ok(FileOutcome::Copied);
        };

        let mut dataset = match TabularDataset::load(source) {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(file = %source.display(), error = %e, "skipping unreadable tabular file");
                return Ok(FileOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        let rows_filtered = match (&pass.filter_matcher, self.filter.get(file_name)) {
            (Some(matcher), Some(filter_columns)) => {
                retain_matching_rows(&mut dataset, matcher, filter_columns)
            }
            _ => 0,
        };
        let stats = anonymize_columns(&mut dataset, &pass.matcher, columns);

        ensure_parent(target)?;
        dataset.save(target)?;
        info!(
            file = %source.display(),
            rows = dataset.len(),
            cells = stats.cells_changed,
            "anonymized"
        );
        Ok(FileOutcome::Anonymized {
            rows: dataset.len(),
            rows_filtered,
            cells_changed: stats.cells_changed,
            missing_columns: stats.missing_columns,
        })
    }

    fn persist_mapping(&self, repository: &str, mapping: &IdentityMapping) -> Result<(), CoreError> {
        let Some(dir) = &self.mapping_dir else {
            return Ok(());
        };
        let path = if repository.is_empty() {
            dir.join("mapping.json")
        } else {
            dir.join(repository).join("mapping.json")
        };
        mapping.save_json(&path).map_err(|e| CoreError::io(&path, e))?;
        warn!(path = %path.display(), "identity mapping persisted; never distribute it with anonymized output");
        Ok(())
    }
}

/// Record every file under `source_dir` as skipped.
fn skip_tree(
    repository: &str,
    source_dir: &Path,
    excluded: &[PathBuf],
    reason: &str,
    summary: &mut RunSummary,
) -> Result<(), CoreError> {
    for file in files_under(source_dir)? {
        let relative = file.strip_prefix(source_dir).unwrap_or(&file).to_path_buf();
        if is_excluded(&relative, excluded) {
            continue;
        }
        summary.record(
            repository,
            relative,
            FileOutcome::Skipped {
                reason: reason.to_string(),
            },
        );
    }
    Ok(())
}

/// Other keys below `id`, relative to `id`'s directory. Their files are
/// handled by their own repository.
fn nested_keys(id: &str, repositories: &BTreeMap<String, PathBuf>) -> Vec<PathBuf> {
    let own = Path::new(id);
    repositories
        .keys()
        .map(Path::new)
        .filter(|key| *key != own)
        .filter_map(|key| key.strip_prefix(own).ok())
        .map(Path::to_path_buf)
        .collect()
}

fn is_excluded(relative: &Path, excluded: &[PathBuf]) -> bool {
    excluded.iter().any(|prefix| relative.starts_with(prefix))
}

/// Regular files under `dir`, in a stable order.
fn files_under(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            CoreError::io(&path, source)
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn ensure_parent(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    Ok(())
}

fn ensure_disjoint(source: &Path, target: &Path) -> Result<(), CoreError> {
    if target.starts_with(source) {
        return Err(ConfigError::InvalidValue {
            field: "target".into(),
            detail: format!(
                "'{}' is inside the source tree '{}'",
                target.display(),
                source.display()
            ),
        }
        .into());
    }
    Ok(())
}
