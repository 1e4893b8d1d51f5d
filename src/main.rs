use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use file_tx::config::{load_from_path, EngineConfig, CONFIG_FILE_NAME};
use file_tx::{
    EditRequest, FileError, Transaction, TransactionManager, TransactionOverrides,
    ValidationReport,
};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "file-tx")]
#[command(about = "Atomic multi-file search/replace transactions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a JSON list of edits as one transaction
    Apply {
        /// JSON file with [{filePath, searchBlock, replaceBlock}, ...] ("-" for stdin)
        #[arg(short, long)]
        edits: PathBuf,

        /// Directory relative paths resolve against
        #[arg(short, long)]
        base_dir: Option<PathBuf>,

        /// Config file (defaults to .file-tx.toml in the base directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dry run - validate and show what would change without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Skip backups of modified files
        #[arg(long)]
        no_backups: bool,

        /// Delete backups after a successful commit
        #[arg(long)]
        cleanup: bool,
    },

    /// Validate edits and print the validation report as JSON
    Check {
        #[arg(short, long)]
        edits: PathBuf,

        #[arg(short, long)]
        base_dir: Option<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Restore files left behind by interrupted commits
    Recover {
        #[arg(short, long)]
        base_dir: Option<PathBuf>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            edits,
            base_dir,
            config,
            dry_run,
            diff,
            no_backups,
            cleanup,
        } => {
            let mut config = load_config(base_dir, config)?;
            config.cleanup_backups_on_success |= cleanup;
            let overrides = TransactionOverrides {
                create_backups: no_backups.then_some(false),
                ..TransactionOverrides::default()
            };
            cmd_apply(config, &edits, overrides, dry_run, diff)
        }

        Commands::Check {
            edits,
            base_dir,
            config,
        } => cmd_check(load_config(base_dir, config)?, &edits),

        Commands::Recover { base_dir, config } => cmd_recover(load_config(base_dir, config)?),
    }
}

/// Resolve the engine configuration.
///
/// Base directory priority:
/// 1. Explicit --base-dir flag
/// 2. FILE_TX_BASE_DIR environment variable
/// 3. `base_dir` from an explicit --config file
/// 4. Current directory
fn load_config(base_dir: Option<PathBuf>, config: Option<PathBuf>) -> Result<EngineConfig> {
    let explicit = match base_dir {
        Some(path) => Some(path),
        None => env::var_os("FILE_TX_BASE_DIR").map(PathBuf::from),
    };

    let lookup_dir = match &explicit {
        Some(path) => path.clone(),
        None => env::current_dir()?,
    };

    let config_path = config.or_else(|| {
        let candidate = lookup_dir.join(CONFIG_FILE_NAME);
        candidate.is_file().then_some(candidate)
    });

    let mut config = match config_path {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            load_from_path(&path)?
        }
        None => EngineConfig::new(&lookup_dir),
    };

    if let Some(path) = explicit {
        config.base_dir = path;
    }
    config.base_dir = config
        .base_dir
        .canonicalize()
        .with_context(|| format!("base directory {}", config.base_dir.display()))?;
    Ok(config)
}

fn read_edits(path: &Path) -> Result<Vec<EditRequest>> {
    let json = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    EditRequest::parse_list(&json).with_context(|| format!("parsing edits from {}", path.display()))
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (modified)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", line);
    }
}

fn print_file_error(error: &FileError) {
    eprintln!("{} {}", "✗".red(), error.file_path.display());
    for line in error.error.lines() {
        eprintln!("    {}", line);
    }
}

/// Stage every request, collecting staging failures instead of stopping.
fn stage_all(tx: &mut Transaction, edits: &[EditRequest]) -> Vec<FileError> {
    edits
        .iter()
        .filter_map(|request| {
            tx.stage_request(request).err().map(|err| {
                let path = request.file_path.as_deref().unwrap_or_default();
                FileError::from_tx_error(Path::new(path), &err)
            })
        })
        .collect()
}

fn show_diffs(tx: &Transaction, show_diff: bool) {
    let files: Vec<PathBuf> = tx.staged_files().map(Path::to_path_buf).collect();
    for file in files {
        println!("{} {}", "✓".green(), file.display());
        if show_diff {
            if let (Some(before), Some(after)) = (tx.original(&file), tx.preview(&file)) {
                display_diff(&file, before, after);
            }
        }
    }
}

fn cmd_apply(
    config: EngineConfig,
    edits_path: &Path,
    overrides: TransactionOverrides,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let edits = read_edits(edits_path)?;
    println!("Base directory: {}", config.base_dir.display());
    println!("Edits: {}", edits.len());
    println!();

    let mut manager = TransactionManager::new(config)?;

    if dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
        let tx = manager.create(overrides)?;
        let mut errors = stage_all(tx, &edits);
        let validation = tx.validate()?;
        errors.extend(validation.errors);

        if errors.is_empty() {
            show_diffs(tx, show_diff);
        } else {
            errors.iter().for_each(print_file_error);
        }
        tx.abort()?;

        println!();
        if errors.is_empty() {
            println!("{}", "All edits would apply.".green());
            return Ok(());
        }
        println!("{}", format!("{} errors", errors.len()).red());
        std::process::exit(1);
    }

    let report = manager.execute(&edits, overrides)?;

    if report.success {
        if let Some(tx) = manager.get(&report.transaction_id) {
            show_diffs(tx, show_diff);
        }
    } else {
        report.errors.iter().for_each(print_file_error);
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  transaction {}", report.transaction_id);
    println!(
        "  {} files committed",
        format!("{}", report.files_committed).green()
    );
    println!("  {} edits applied", report.edits_applied);
    println!("  {} backups created", report.backups_created);
    println!("  {} errors", format!("{}", report.errors.len()).red());
    if report.rollback_performed {
        println!("  {}", "rollback performed".yellow());
    }

    if !report.success {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(config: EngineConfig, edits_path: &Path) -> Result<()> {
    let edits = read_edits(edits_path)?;
    let mut manager = TransactionManager::new(config)?;
    let tx = manager.create(TransactionOverrides::none())?;

    let mut errors = stage_all(tx, &edits);
    let mut report: ValidationReport = tx.validate()?;
    if !errors.is_empty() {
        errors.append(&mut report.errors);
        report.valid = false;
        report.errors = errors;
    }
    tx.abort()?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_recover(config: EngineConfig) -> Result<()> {
    let manager = TransactionManager::new(config)?;
    let report = manager.recover();

    if !report.had_work() {
        println!("{}", "No interrupted transactions found".dimmed());
        return Ok(());
    }

    println!("{}", "Recovery:".bold());
    println!("  {} journals", report.journals);
    println!("  {} resolved", format!("{}", report.journals_resolved).green());
    println!("  {} files restored", report.files_restored);
    println!("  {} files unchanged", report.files_unchanged);

    if !report.is_clean() {
        report.errors.iter().for_each(print_file_error);
        std::process::exit(1);
    }
    Ok(())
}
