/*!
 * Anemone - SMB folder synchronization CLI
 *
 * Thin front-end over the sync engine: list jobs, run one job or all
 * enabled jobs, optionally as a dry run. Scheduling, the tray UI, and
 * credential storage live elsewhere; credentials come from the
 * environment keystore.
 */

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Table};

use anemone::cli_progress::CliProgress;
use anemone::engine::{SyncEngine, SyncRequest, SyncResult};
use anemone::model::{HistoryStatus, Job};
use anemone::remote::local::MountedShareFactory;
use anemone::{AppConfig, Database, EnvKeystore};

#[derive(Parser, Debug)]
#[command(
    name = "anemone",
    version,
    about = "Keep local folders and SMB shares in sync"
)]
struct Cli {
    /// List configured sync jobs
    #[arg(long)]
    list_jobs: bool,

    /// Sync one job by id
    #[arg(long, value_name = "JOB_ID")]
    sync: Option<i64>,

    /// Sync every enabled job
    #[arg(long)]
    sync_all: bool,

    /// Plan actions without transferring or deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Configuration file (defaults to the platform config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// State database location (overrides configuration)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Directory where UNC shares are mounted (e.g. /mnt); on Windows UNC
    /// paths are used directly
    #[arg(long, value_name = "DIR")]
    mount_base: Option<PathBuf>,

    /// Verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Write JSON logs to a file instead of the terminal
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    anemone::logging::init_logging(cli.verbose, cli.log_file.as_deref())
        .context("failed to initialize logging")?;

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    if let Some(db) = &cli.db {
        config.database.path = Some(db.clone());
    }

    let db_path = config.db_path();
    let encryption_key = std::env::var("ANEMONE_DB_KEY").ok();
    let db = Arc::new(
        Database::open(&db_path, encryption_key.as_deref())
            .with_context(|| format!("failed to open {}", db_path.display()))?,
    );

    let engine = SyncEngine::new(
        db.clone(),
        config,
        Arc::new(EnvKeystore::new()),
        Arc::new(MountedShareFactory::new(cli.mount_base.clone())),
    );

    if cli.list_jobs {
        list_jobs(&db)?;
        return Ok(0);
    }

    if let Some(job_id) = cli.sync {
        let job = db.get_job(job_id)?;
        let result = run_sync(&engine, &job, cli.dry_run)?;
        return Ok(exit_code(&result.status));
    }

    if cli.sync_all {
        let jobs = db.list_jobs()?;
        let mut worst = 0;
        for job in jobs.iter().filter(|j| j.enabled) {
            let result = run_sync(&engine, job, cli.dry_run)?;
            worst = worst.max(exit_code(&result.status));
        }
        return Ok(worst);
    }

    println!("Nothing to do. Try --list-jobs, --sync <id>, or --sync-all.");
    Ok(0)
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("anemone")
        .join("config.toml")
}

fn list_jobs(db: &Database) -> Result<()> {
    let jobs = db.list_jobs()?;
    if jobs.is_empty() {
        println!("No sync jobs configured.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "ID", "Name", "Local", "Remote", "Mode", "Conflicts", "Enabled", "Status", "Last run",
    ]);
    for job in jobs {
        table.add_row(vec![
            job.id.to_string(),
            job.name.clone(),
            job.local_path.clone(),
            job.remote_path.clone(),
            job.sync_mode.as_str().to_string(),
            job.conflict_resolution.as_str().to_string(),
            if job.enabled { "yes" } else { "no" }.to_string(),
            job.status.as_str().to_string(),
            job.last_run
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn run_sync(engine: &SyncEngine, job: &Job, dry_run: bool) -> Result<SyncResult> {
    let progress = CliProgress::new(&job.name);
    let mut request = SyncRequest::new(job.id);
    request.dry_run = dry_run;
    request.progress = Some(progress.callback());

    let result = engine
        .sync(request)
        .with_context(|| format!("sync of job '{}' failed", job.name))?;

    progress.finish(&format!("{}: {}", job.name, result.status.as_str()));
    print_result(job, &result);
    Ok(result)
}

fn print_result(job: &Job, result: &SyncResult) {
    if result.dry_run {
        println!("Planned actions for '{}':", job.name);
        if result.planned.is_empty() {
            println!("  nothing to do");
        }
        for decision in &result.planned {
            println!("  {:?} {}", decision.action, decision.path);
        }
        for conflict in &result.unresolved_conflicts {
            println!("  conflict (unresolved) {}", conflict.path);
        }
        return;
    }

    println!(
        "{}: {} | up {} down {} deleted {} failed {} | {} bytes in {:.1}s",
        job.name,
        result.status.as_str(),
        result.files_uploaded,
        result.files_downloaded,
        result.files_deleted_local + result.files_deleted_remote,
        result.files_failed,
        result.bytes_transferred,
        result.duration.as_secs_f64(),
    );
    if let Some(summary) = result.error_summary() {
        println!("  errors: {summary}");
    }
    if !result.unresolved_conflicts.is_empty() {
        println!(
            "  {} conflict(s) need attention",
            result.unresolved_conflicts.len()
        );
        for conflict in &result.unresolved_conflicts {
            println!("    {}", conflict.path);
        }
    }
}

fn exit_code(status: &HistoryStatus) -> i32 {
    match status {
        HistoryStatus::Success => 0,
        HistoryStatus::Partial => 2,
        HistoryStatus::Failed => 1,
    }
}
