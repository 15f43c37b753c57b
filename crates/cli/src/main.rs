//! repocrawl command-line tool.
//!
//! Provides subcommands for anonymizing extracted repository data (one
//! repository or a whole storage tree), inspecting harvested identities,
//! exporting audit mappings, and generating / validating configuration
//! files.

mod style;
mod summary;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use repocrawl_core::config::AnonymizeConfig;
use repocrawl_core::identity::harvester::identity_strings;
use repocrawl_core::identity::IdentityHarvester;
use repocrawl_core::orchestrator::Anonymizer;
use repocrawl_core::report::RunSummary;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// repocrawl command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "repocrawl",
    version,
    about = "Anonymize contributor identities in extracted repository data"
)]
struct Cli {
    /// Path to the TOML configuration file
    /// [default: ~/.config/repocrawl/repocrawl.toml when present].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override: trace, debug, info, warn, error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Anonymize the extracted data of a single repository.
    Anonymize {
        /// Local Git repository to harvest identities from.
        #[arg(long)]
        repo_path: Option<PathBuf>,

        /// Directory holding the extracted data.
        #[arg(long)]
        storage: Option<PathBuf>,

        /// Directory receiving the anonymized copy.
        #[arg(long)]
        target: Option<PathBuf>,

        /// Do not ask before writing into a non-empty target.
        #[arg(short, long)]
        yes: bool,
    },

    /// Anonymize every repository listed under [repositories].
    Batch {
        /// Root of the extracted data.
        #[arg(long)]
        storage: Option<PathBuf>,

        /// Root of the anonymized copy.
        #[arg(long)]
        target: Option<PathBuf>,

        /// Do not ask before writing into a non-empty target.
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the identity strings harvested from a repository.
    Harvest {
        /// Local Git repository.
        #[arg(long)]
        repo_path: Option<PathBuf>,
    },

    /// Inspect identity mappings.
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./repocrawl.toml")]
        output: PathBuf,
    },

    /// Validate the configuration.
    Validate,
}

#[derive(Subcommand, Debug)]
enum MappingAction {
    /// Write a repository's full identity mapping as JSON.
    Export {
        /// Output path for the mapping file.
        #[arg(short, long)]
        output: PathBuf,

        /// Local Git repository.
        #[arg(long)]
        repo_path: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Init { output } = &cli.command {
        cmd_init(output)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config_with_logging(
        cli.config.as_deref(),
        &bootstrap_level(cli.log_level.as_deref()),
        std::io::stderr,
    )?;
    let _guard = init_logging(cli.log_level.as_deref(), &config)?;

    match cli.command {
        Commands::Anonymize {
            repo_path,
            storage,
            target,
            yes,
        } => cmd_anonymize(config, repo_path, storage, target, yes),
        Commands::Batch {
            storage,
            target,
            yes,
        } => cmd_batch(config, storage, target, yes),
        Commands::Harvest { repo_path } => {
            cmd_harvest(&config, repo_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mapping { action } => {
            cmd_mapping(&config, action)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate => {
            cmd_validate(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { .. } => Ok(ExitCode::SUCCESS),
    }
}

// ---------------------------------------------------------------------------
// Config & logging helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("repocrawl").join("repocrawl.toml"))
}

/// Load the config file (explicit, or the default location when present),
/// falling back to built-in defaults, then apply environment overrides.
fn load_config(explicit: Option<&Path>) -> Result<AnonymizeConfig> {
    let path = match explicit {
        Some(path) => Some(expand_tilde(path)),
        None => default_config_path().filter(|p| p.exists()),
    };

    let mut config = match path {
        Some(path) => AnonymizeConfig::load_from_file(&path)
            .with_context(|| format!("failed to load configuration file {}", path.display()))?,
        None => AnonymizeConfig::from_defaults(),
    };
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    Ok(config)
}

/// Level used while loading the config, before the configured level is known.
fn bootstrap_level(cli_level: Option<&str>) -> String {
    cli_level
        .map(str::to_string)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string())
}

/// Run [`load_config`] under a scoped subscriber writing to `writer`, so
/// config load events are not dropped before the global one is installed.
fn load_config_with_logging<W>(
    explicit: Option<&Path>,
    level: &str,
    writer: W,
) -> Result<AnonymizeConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("invalid log level '{}'", level))?;
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(bootstrap, || load_config(explicit))
}

/// Install the global subscriber. The returned guard flushes the log file
/// writer and must live until the process exits.
fn init_logging(cli_level: Option<&str>, config: &AnonymizeConfig) -> Result<Option<WorkerGuard>> {
    let level = cli_level.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("invalid log level '{}'", level))?;

    match &config.logging.file {
        Some(file) => {
            let dir = file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = file
                .file_name()
                .with_context(|| format!("log file path has no file name: {}", file.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Ask before writing into a target directory that already has content.
fn confirm_target(target: &Path, yes: bool) -> Result<bool> {
    let non_empty = std::fs::read_dir(target)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if !non_empty || yes {
        return Ok(true);
    }

    debug!(path = %target.display(), "target directory is not empty");
    let proceed = Confirm::new()
        .with_prompt(format!(
            "{} is not empty. Existing files may be overwritten. Continue?",
            target.display()
        ))
        .default(false)
        .interact()
        .context("failed to read confirmation")?;

    if !proceed {
        println!("{}", style::warn("Cancelled. Nothing was written."));
    }
    Ok(proceed)
}

fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_anonymize(
    mut config: AnonymizeConfig,
    repo_path: Option<PathBuf>,
    storage: Option<PathBuf>,
    target: Option<PathBuf>,
    yes: bool,
) -> Result<ExitCode> {
    if repo_path.is_some() {
        config.paths.repo_path = repo_path;
    }
    if storage.is_some() {
        config.paths.storage_path = storage;
    }
    if target.is_some() {
        config.paths.target_path = target;
    }
    config.validate().context("invalid configuration")?;

    let repo_path = config.repo_path()?.to_path_buf();
    let storage = config.storage_path()?.to_path_buf();
    let target = config.target_path()?.to_path_buf();

    if !confirm_target(&target, yes)? {
        return Ok(ExitCode::SUCCESS);
    }

    let anonymizer = Anonymizer::new(&config).context("failed to prepare anonymizer")?;
    info!(
        repo = %repo_path.display(),
        storage = %storage.display(),
        target = %target.display(),
        "starting anonymization"
    );

    println!();
    println!(
        "{}",
        style::header(&format!("Anonymizing {}", storage.display()))
    );
    println!();

    let summary = anonymizer
        .anonymize_repository(&repo_path, &storage, &target)
        .with_context(|| format!("failed to anonymize {}", storage.display()))?;

    summary::print_summary(&summary);
    Ok(exit_code(&summary))
}

fn cmd_batch(
    mut config: AnonymizeConfig,
    storage: Option<PathBuf>,
    target: Option<PathBuf>,
    yes: bool,
) -> Result<ExitCode> {
    if storage.is_some() {
        config.paths.storage_path = storage;
    }
    if target.is_some() {
        config.paths.target_path = target;
    }
    config.validate().context("invalid configuration")?;

    if config.repositories.is_empty() {
        anyhow::bail!("no repositories configured: add a [repositories] table to the config file");
    }

    let storage = config.storage_path()?.to_path_buf();
    let target = config.target_path()?.to_path_buf();

    if !confirm_target(&target, yes)? {
        return Ok(ExitCode::SUCCESS);
    }

    let anonymizer = Anonymizer::new(&config).context("failed to prepare anonymizer")?;
    info!(
        repositories = config.repositories.len(),
        storage = %storage.display(),
        target = %target.display(),
        "starting batch anonymization"
    );

    let progress = ProgressBar::new(config.repositories.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );

    let mut started = 0u64;
    let result = anonymizer.anonymize_batch_with(
        &storage,
        &target,
        &config.repositories,
        |repository| {
            progress.set_position(started);
            progress.set_message(repository.to_string());
            started += 1;
        },
    );
    progress.finish_and_clear();

    let summary = result.context("batch anonymization failed")?;

    println!();
    println!(
        "{}",
        style::header(&format!(
            "Anonymized {} repositories from {}",
            config.repositories.len(),
            storage.display()
        ))
    );
    println!();
    summary::print_summary(&summary);
    Ok(exit_code(&summary))
}

fn cmd_harvest(config: &AnonymizeConfig, repo_path: Option<PathBuf>) -> Result<()> {
    let repo_path = match repo_path {
        Some(path) => path,
        None => config.repo_path()?.to_path_buf(),
    };

    let signatures = IdentityHarvester::open(&repo_path)
        .context("failed to open repository")?
        .include_committers(config.mapping.include_committers)
        .signatures()
        .context("failed to read history")?;

    for identity in identity_strings(&signatures) {
        println!("{}", identity);
    }
    Ok(())
}

fn cmd_mapping(config: &AnonymizeConfig, action: MappingAction) -> Result<()> {
    match action {
        MappingAction::Export { output, repo_path } => {
            let repo_path = match repo_path {
                Some(path) => path,
                None => config.repo_path()?.to_path_buf(),
            };

            let anonymizer = Anonymizer::new(config).context("failed to prepare anonymizer")?;
            let mapping = anonymizer
                .build_mapping(&repo_path)
                .context("failed to build identity mapping")?;
            mapping
                .save_json(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;

            println!(
                "{}",
                style::success(&format!(
                    "{} mapping entries written to {}",
                    mapping.len(),
                    output.display()
                ))
            );
            println!(
                "{}",
                style::warn("This file links tokens to real identities. Do not distribute it.")
            );
            Ok(())
        }
    }
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# repocrawl configuration
# Environment variables override the [paths] and [mapping] values:
# REPO_PATH, STORAGE_PATH, TARGET_PATH, MAPPING_DIR,
# USE_CUSTOM_MAPPING, CUSTOM_MAPPING_FILE, LOG_LEVEL.

[paths]
# repo_path = "/srv/git/widgets"
storage_path = "./data"
target_path = "./data-anonymized"
# mapping_dir = "./audit"

# Storage sub-path -> local Git repository, used by `repocrawl batch`.
[repositories]
# "acme/widgets" = "/srv/git/widgets"

# File name -> columns eligible for substitution.
[columns]
"branches.csv" = ["created_by", "last_author"]
"commits.csv" = ["author"]
"pull_requests.csv" = ["author", "merged_by", "requested_reviewers", "assignees"]
"releases.csv" = ["author"]

[mapping]
use_custom_mapping = false
# custom_mapping_file = "./manual-mapping.toml"
marker_prefix = "EX_"
include_committers = false

# File name -> columns used to keep only rows mentioning a manually mapped
# identity. Only applied when use_custom_mapping is enabled.
[filter]
# "commits.csv" = ["author"]

[logging]
level = "info"
# file = "./repocrawl.log"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Set storage_path and target_path, and list your repositories");
    println!(
        "  2. Validate with: repocrawl validate --config {}",
        output.display()
    );
    println!(
        "  3. Run: repocrawl batch --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config: &AnonymizeConfig) -> Result<()> {
    println!("{}", style::header("Validating configuration"));
    println!();

    match config.validate() {
        Ok(()) => println!("  {}", style::success("All required fields are valid")),
        Err(e) => {
            println!("  {}", style::error(&format!("Validation error: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    }

    if config.mapping.use_custom_mapping {
        let path = config
            .mapping
            .custom_mapping_file
            .as_deref()
            .context("custom mapping file not set")?;
        match repocrawl_core::identity::ManualMapping::load(path) {
            Ok(mapping) => println!(
                "  {}",
                style::success(&format!("Manual mapping loaded ({} entries)", mapping.len()))
            ),
            Err(e) => {
                println!("  {}", style::error(&format!("Manual mapping: {}", e)));
                anyhow::bail!("configuration validation failed");
            }
        }
    }

    for (id, path) in &config.repositories {
        if !path.exists() {
            println!(
                "  {}",
                style::warn(&format!(
                    "repository '{}' not found at {}; it will be skipped",
                    id,
                    path.display()
                ))
            );
        }
    }

    let show = |p: Option<&Path>| {
        p.map(|p| p.display().to_string())
            .unwrap_or_else(|| "not set".to_string())
    };

    println!();
    println!("Configuration summary:");
    println!("  Storage path   : {}", show(config.paths.storage_path.as_deref()));
    println!("  Target path    : {}", show(config.paths.target_path.as_deref()));
    println!("  Repository     : {}", show(config.paths.repo_path.as_deref()));
    println!("  Mapping dir    : {}", show(config.paths.mapping_dir.as_deref()));
    println!("  Repositories   : {}", config.repositories.len());
    println!("  Allowlisted    : {} file(s)", config.columns.len());
    println!(
        "  Custom mapping : {}",
        if config.mapping.use_custom_mapping {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Log level      : {}", config.logging.level);
    println!();
    println!("{}", style::dim("Configuration is valid."));

    Ok(())
}
