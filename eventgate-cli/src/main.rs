use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use eventgate_core::{Classifier, ClassifierConfig, ProcessClassifier};
use eventgate_server::config::{parse_args, DATABASE_FILE_NAME};
use eventgate_server::dispatch::{run_job, ClassificationQueue, RetryPolicy};
use eventgate_server::state_machine::repository::SqliteRepository;
use eventgate_server::state_machine::state::{EventId, ModerationStatus, ReportsState};
use eventgate_server::{ModerationStore, SystemClock};
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Eventgate: administer the event moderation database
#[derive(Parser, Debug)]
#[command(name = "eventgate")]
#[command(about = "Administer the eventgate moderation database", long_about = None)]
struct Cli {
    /// Directory holding the state database
    #[arg(long, env = "STATE_DIR", default_value = ".", global = true)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mark every event whose end time has passed as inactive
    Sweep(SweepArgs),
    /// Set an event's reports state, overriding the report count
    SetReportsState(SetReportsStateArgs),
    /// Classify an event's current content again and record the verdict
    Reclassify(ReclassifyArgs),
    /// List events held for review after reports
    Pending,
    /// Run the classifier on text read from stdin
    Classify(ClassifyArgs),
}

#[derive(Parser, Debug)]
struct SweepArgs {
    /// Treat this RFC 3339 instant as "now" instead of the current time
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Parser, Debug)]
struct SetReportsStateArgs {
    /// Event id
    event_id: i64,

    /// New reports state
    #[arg(value_parser = ["normal", "pending", "blocked"])]
    state: String,
}

#[derive(Parser, Debug)]
struct ReclassifyArgs {
    /// Event id
    event_id: i64,

    #[command(flatten)]
    classifier: ClassifierArgs,

    /// Total classifier attempts per text fragment
    #[arg(long, env = "CLASSIFIER_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,
}

#[derive(Parser, Debug)]
struct ClassifyArgs {
    #[command(flatten)]
    classifier: ClassifierArgs,
}

#[derive(Parser, Debug)]
struct ClassifierArgs {
    /// Classifier executable
    #[arg(long, env = "CLASSIFIER_PROGRAM", default_value = "python3")]
    classifier_program: String,

    /// Classifier arguments: a JSON array of strings, or a whitespace-separated list
    #[arg(
        long,
        env = "CLASSIFIER_ARGS",
        default_value = "-u scripts/spam_check_single.py",
        allow_hyphen_values = true
    )]
    classifier_args: String,

    /// Seconds allowed for one classifier call
    #[arg(long, env = "CLASSIFIER_TIMEOUT_SECS", default_value_t = 1800)]
    classifier_timeout_secs: u64,
}

impl ClassifierArgs {
    fn build(&self) -> Result<ProcessClassifier> {
        let args = parse_args(&self.classifier_args).context("Invalid --classifier-args")?;
        debug!(
            "Classifier: {} {:?} (timeout {}s)",
            self.classifier_program, args, self.classifier_timeout_secs
        );
        Ok(ProcessClassifier::new(
            ClassifierConfig::new(self.classifier_program.clone(), args)
                .with_timeout(Duration::from_secs(self.classifier_timeout_secs)),
        ))
    }
}

/// Open the store over the database in `state_dir`.
fn open_store(state_dir: &std::path::Path, queue: ClassificationQueue) -> Result<ModerationStore> {
    let db_path = state_dir.join(DATABASE_FILE_NAME);
    if !db_path.exists() {
        return Err(anyhow!("No state database at {}", db_path.display()));
    }

    debug!("Opening state database {}", db_path.display());
    let repo = SqliteRepository::new(&db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    Ok(ModerationStore::new(
        Arc::new(repo),
        Arc::new(SystemClock),
        queue,
    ))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to render JSON")?
    );
    Ok(())
}

async fn run_sweep(cli_state_dir: &std::path::Path, args: SweepArgs) -> Result<()> {
    let (queue, _jobs) = ClassificationQueue::new();
    let store = open_store(cli_state_dir, queue)?;

    let now = args.now.unwrap_or_else(|| store.now());
    let expired = store
        .sweep_expired(now)
        .await
        .context("Expiry sweep failed")?;
    info!("Expiry sweep at {} marked {} event(s) inactive", now, expired);

    print_json(&json!({ "now": now, "expired": expired }))
}

async fn run_set_reports_state(
    cli_state_dir: &std::path::Path,
    args: SetReportsStateArgs,
) -> Result<()> {
    let state: ReportsState = args
        .state
        .parse()
        .map_err(|e| anyhow!("Invalid reports state: {}", e))?;

    let (queue, _jobs) = ClassificationQueue::new();
    let store = open_store(cli_state_dir, queue)?;

    let event = store
        .admin_set_reports_state(EventId(args.event_id), state)
        .await
        .with_context(|| format!("Failed to set reports state of event {}", args.event_id))?;
    info!(
        "Event {} reports state is now {} ({} active report(s))",
        event.id, event.reports_state, event.reports_count
    );
    print_json(&event)
}

async fn run_reclassify(cli_state_dir: &std::path::Path, args: ReclassifyArgs) -> Result<()> {
    let (queue, mut jobs) = ClassificationQueue::new();
    let store = open_store(cli_state_dir, queue)?;
    let classifier = args.classifier.build()?;
    let policy = RetryPolicy {
        max_attempts: args.max_attempts.max(1),
        ..RetryPolicy::default()
    };

    let id = EventId(args.event_id);
    store
        .reclassify(id)
        .await
        .with_context(|| format!("Failed to reclassify event {}", id))?;

    // No daemon worker here: run the queued job in-process.
    while let Ok(job) = jobs.try_recv() {
        info!("Classifying event {} (revision {})", job.event_id, job.revision);
        run_job(&store, &classifier, &policy, job).await;
    }

    let event = store
        .get_event(id)
        .await
        .with_context(|| format!("Failed to reload event {}", id))?;
    if event.status == ModerationStatus::Pending {
        warn!("Event {} is still pending; the classifier did not settle it", id);
    }
    print_json(&event)
}

async fn run_pending(cli_state_dir: &std::path::Path) -> Result<()> {
    let (queue, _jobs) = ClassificationQueue::new();
    let store = open_store(cli_state_dir, queue)?;

    let held = store
        .list_pending_moderation()
        .await
        .context("Failed to list events held for review")?;
    info!("{} event(s) held for review", held.len());

    let entries: Vec<_> = held
        .into_iter()
        .map(|(event, reports)| json!({ "event": event, "reports": reports }))
        .collect();
    print_json(&entries)
}

async fn run_classify(args: ClassifyArgs) -> Result<()> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read text from stdin")?;

    let classifier = args.classifier.build()?;
    let is_spam = classifier
        .classify(&text)
        .await
        .context("Classifier failed")?;

    print_json(&json!({ "is_spam": is_spam }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep(args) => run_sweep(&cli.state_dir, args).await,
        Commands::SetReportsState(args) => run_set_reports_state(&cli.state_dir, args).await,
        Commands::Reclassify(args) => run_reclassify(&cli.state_dir, args).await,
        Commands::Pending => run_pending(&cli.state_dir).await,
        Commands::Classify(args) => run_classify(args).await,
    }
}
