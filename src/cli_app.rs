//! Top-level CLI definition and dispatch.

#![allow(clippy::cast_precision_loss)]

use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::json;
use thiserror::Error;

use retention_sweeper::cleaner::{self, CleanOptions, CleanRunSummary};
use retention_sweeper::core::config::Config;
use retention_sweeper::core::errors::RswError;
use retention_sweeper::core::job::Job;
use retention_sweeper::indexer::{self, IndexOptions, IndexRunSummary};
use retention_sweeper::lock::{Role, RunLock};
use retention_sweeper::scanner::protection::ProtectedPaths;
use retention_sweeper::store::{IndexStore, RunStatus};

/// Retention Sweeper — unattended disk housekeeping.
#[derive(Debug, Parser)]
#[command(
    name = "rsw",
    author,
    version,
    about = "Retention Sweeper - index and clean watched directories",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the indexer role once: rebuild every job's file snapshot.
    Index(IndexArgs),
    /// Run the cleaner role once: enforce retention against the index.
    Clean(CleanArgs),
    /// Show per-job indexed totals.
    Status(StatusArgs),
    /// Show recent run history.
    History(HistoryArgs),
    /// List configured jobs and their validation verdicts.
    Jobs(JobsArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct IndexArgs {
    /// Override scan parallelism for this run.
    #[arg(long, value_name = "N")]
    parallelism: Option<usize>,
}

#[derive(Debug, Clone, Args, Default)]
struct CleanArgs {
    /// Report what would be deleted without deleting anything.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct StatusArgs {}

#[derive(Debug, Clone, Args)]
struct HistoryArgs {
    /// Number of runs to show, newest first.
    #[arg(long, default_value_t = 20, value_name = "N")]
    limit: u32,
}

#[derive(Debug, Clone, Args, Default)]
struct JobsArgs {}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

/// CLI-level failures (config, store, lock infrastructure).
#[derive(Debug, Error)]
pub enum CliError {
    /// Core engine failure, rendered with its RSW error code.
    #[error(transparent)]
    Core(#[from] RswError),
    /// JSON output could not be rendered.
    #[error("output serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dispatch a parsed CLI invocation; the `Ok` value is the process exit code.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Index(args) => cmd_index(cli, args),
        Command::Clean(args) => cmd_clean(cli, args),
        Command::Status(_) => cmd_status(cli),
        Command::History(args) => cmd_history(cli, args),
        Command::Jobs(_) => cmd_jobs(cli),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "rsw", &mut io::stdout());
            Ok(0)
        }
    }
}

// ──────────────────── role commands ────────────────────

fn cmd_index(cli: &Cli, args: &IndexArgs) -> Result<i32, CliError> {
    let config = Config::load(cli.config.as_deref())?;

    let Some(_lock) = RunLock::try_acquire(&config.paths.lock_dir, Role::Indexer)? else {
        return Ok(skip_contended(cli, Role::Indexer));
    };

    let mut store = IndexStore::open(&config.paths.db_path)?;
    let jobs = config.load_jobs();
    let protected =
        ProtectedPaths::new(&config.protection.extra_paths, &config.protection.patterns)?;
    let options = IndexOptions {
        parallelism: args.parallelism.unwrap_or(config.scanner.parallelism),
    };

    let summary = indexer::run_and_record(&jobs, &mut store, protected, options)?;
    print_index_summary(cli, &summary);
    Ok(summary.status.exit_code())
}

fn cmd_clean(cli: &Cli, args: &CleanArgs) -> Result<i32, CliError> {
    let config = Config::load(cli.config.as_deref())?;

    let Some(_lock) = RunLock::try_acquire(&config.paths.lock_dir, Role::Cleaner)? else {
        return Ok(skip_contended(cli, Role::Cleaner));
    };

    let store = IndexStore::open(&config.paths.db_path)?;
    let jobs = config.load_jobs();
    let protected =
        ProtectedPaths::new(&config.protection.extra_paths, &config.protection.patterns)?;
    let options = CleanOptions {
        dry_run: args.dry_run || config.scanner.dry_run,
    };

    let summary = cleaner::run_and_record(&jobs, &store, &protected, options)?;
    print_clean_summary(cli, &summary);
    Ok(summary.status.exit_code())
}

fn skip_contended(cli: &Cli, role: Role) -> i32 {
    // Expected overlap of periodic schedules: a no-op skip, not an error,
    // and no history row.
    if !cli.quiet {
        eprintln!("rsw: another {role} run is active, skipping");
    }
    0
}

// ──────────────────── reporting commands ────────────────────

fn cmd_status(cli: &Cli) -> Result<i32, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let store = IndexStore::open(&config.paths.db_path)?;
    let stats = store.job_index_stats()?;

    if cli.json {
        let rows: Vec<_> = stats
            .iter()
            .map(|s| {
                json!({
                    "job_id": s.job_id.as_str(),
                    "file_count": s.file_count,
                    "total_bytes": s.total_bytes,
                    "last_seen_at": s.last_seen_at.map(|t| t.to_rfc3339()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({"jobs": rows}))?);
        return Ok(0);
    }

    if stats.is_empty() {
        println!("index is empty — run `rsw index` first");
        return Ok(0);
    }
    println!("{:<24} {:>10} {:>12}  {}", "JOB", "FILES", "SIZE", "LAST INDEXED");
    for s in &stats {
        println!(
            "{:<24} {:>10} {:>12}  {}",
            s.job_id.as_str(),
            s.file_count,
            format_bytes(s.total_bytes),
            s.last_seen_at
                .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
        );
    }
    Ok(0)
}

fn cmd_history(cli: &Cli, args: &HistoryArgs) -> Result<i32, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let store = IndexStore::open(&config.paths.db_path)?;
    let runs = store.recent_runs(args.limit)?;

    if cli.json {
        let rows: Vec<_> = runs
            .iter()
            .map(|r| {
                json!({
                    "run_id": r.run_id,
                    "role": r.role.as_str(),
                    "started_at": r.started_at.to_rfc3339(),
                    "duration_ms": r.duration_ms,
                    "jobs_processed": r.jobs_processed,
                    "files_affected": r.files_affected,
                    "bytes_freed": r.bytes_freed,
                    "error_count": r.error_count,
                    "status": r.status.as_str(),
                    "dry_run": r.dry_run,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({"runs": rows}))?);
        return Ok(0);
    }

    if runs.is_empty() {
        println!("no runs recorded yet");
        return Ok(0);
    }
    println!(
        "{:<6} {:<8} {:<26} {:>6} {:>8} {:>10} {:>6}  STATUS",
        "RUN", "ROLE", "STARTED", "JOBS", "FILES", "FREED", "ERRS"
    );
    for r in &runs {
        let status = colorize_status(r.status, r.dry_run);
        println!(
            "{:<6} {:<8} {:<26} {:>6} {:>8} {:>10} {:>6}  {status}",
            r.run_id,
            r.role.as_str(),
            r.started_at.to_rfc3339(),
            r.jobs_processed,
            r.files_affected,
            format_bytes(r.bytes_freed),
            r.error_count,
        );
    }
    Ok(0)
}

fn cmd_jobs(cli: &Cli) -> Result<i32, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let jobs = config.load_jobs();
    let protected =
        ProtectedPaths::new(&config.protection.extra_paths, &config.protection.patterns)?;

    if cli.json {
        let rows: Vec<_> = jobs
            .iter()
            .map(|job| {
                json!({
                    "job_id": job.id.as_str(),
                    "path": job.path.display().to_string(),
                    "rule": job.rule.summary(),
                    "recurse": job.recurse,
                    "dry_run": job.dry_run,
                    "verdict": job_verdict(&protected, job),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({"jobs": rows}))?);
        return Ok(0);
    }

    if jobs.is_empty() {
        println!(
            "no jobs configured under {}",
            config.paths.jobs_dir.display()
        );
        return Ok(0);
    }
    for job in &jobs {
        let verdict = if protected.is_denied(&job.path) {
            "VETOED".red().bold().to_string()
        } else {
            "ok".green().to_string()
        };
        println!(
            "{:<24} {:<40} {:<24} {verdict}",
            job.id.as_str(),
            job.path.display(),
            job.rule.summary(),
        );
    }
    Ok(0)
}

fn job_verdict(protected: &ProtectedPaths, job: &Job) -> String {
    match protected.check_job_root(&job.path) {
        Ok(()) => "ok".to_string(),
        Err(err) => err.to_string(),
    }
}

// ──────────────────── output helpers ────────────────────

fn print_index_summary(cli: &Cli, summary: &IndexRunSummary) {
    if cli.json {
        let jobs: Vec<_> = summary
            .job_reports
            .iter()
            .map(|r| {
                json!({
                    "job_id": r.job_id.as_str(),
                    "files_indexed": r.files_indexed,
                    "file_errors": r.file_errors,
                    "dirs_pruned": r.dirs_pruned,
                    "failure": r.failure,
                })
            })
            .collect();
        let payload = json!({
            "role": "indexer",
            "status": summary.status.as_str(),
            "jobs_processed": summary.jobs_processed,
            "jobs_failed": summary.jobs_failed,
            "files_indexed": summary.files_indexed,
            "error_count": summary.error_count,
            "duration_ms": summary.duration_ms,
            "jobs": jobs,
        });
        if let Ok(rendered) = serde_json::to_string_pretty(&payload) {
            println!("{rendered}");
        }
        return;
    }
    if cli.quiet {
        return;
    }
    println!(
        "index {}: {} job(s), {} file(s), {} error(s) in {}ms",
        colorize_status(summary.status, false),
        summary.jobs_processed,
        summary.files_indexed,
        summary.error_count,
        summary.duration_ms,
    );
    for report in summary.job_reports.iter().filter(|r| r.failure.is_some()) {
        if let Some(reason) = &report.failure {
            eprintln!("  {} {}: {reason}", "failed".red(), report.job_id.as_str());
        }
    }
}

fn print_clean_summary(cli: &Cli, summary: &CleanRunSummary) {
    if cli.json {
        let jobs: Vec<_> = summary
            .job_reports
            .iter()
            .map(|r| {
                json!({
                    "job_id": r.job_id.as_str(),
                    "files_deleted": r.files_deleted,
                    "bytes_freed": r.bytes_freed,
                    "file_errors": r.file_errors,
                    "dry_run": r.dry_run,
                    "failure": r.failure,
                })
            })
            .collect();
        let payload = json!({
            "role": "cleaner",
            "status": summary.status.as_str(),
            "dry_run": summary.dry_run,
            "jobs_processed": summary.jobs_processed,
            "jobs_failed": summary.jobs_failed,
            "files_deleted": summary.files_deleted,
            "bytes_freed": summary.bytes_freed,
            "error_count": summary.error_count,
            "duration_ms": summary.duration_ms,
            "jobs": jobs,
        });
        if let Ok(rendered) = serde_json::to_string_pretty(&payload) {
            println!("{rendered}");
        }
        return;
    }
    if cli.quiet {
        return;
    }
    println!(
        "clean {}: {} file(s), {} freed, {} error(s) in {}ms",
        colorize_status(summary.status, summary.dry_run),
        summary.files_deleted,
        format_bytes(summary.bytes_freed),
        summary.error_count,
        summary.duration_ms,
    );
    for report in summary.job_reports.iter().filter(|r| r.failure.is_some()) {
        if let Some(reason) = &report.failure {
            eprintln!("  {} {}: {reason}", "failed".red(), report.job_id.as_str());
        }
    }
}

fn colorize_status(status: RunStatus, dry_run: bool) -> String {
    let rendered = match status {
        RunStatus::Success => "success".green().to_string(),
        RunStatus::Partial => "partial".yellow().to_string(),
        RunStatus::Failed => "failed".red().bold().to_string(),
    };
    if dry_run {
        format!("{rendered} (dry-run)")
    } else {
        rendered
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}{}", UNITS[0])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}
