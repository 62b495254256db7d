//! nudge - reminder scheduler and push delivery.
//!
//! Usage:
//!   nudge run                         # scheduler loop until Ctrl-C
//!   nudge tick                        # one tick, then exit
//!   nudge due                         # list reminders due right now
//!   nudge set-user --token <TOKEN>    # register a user / device token
//!   nudge add-reminder --user <ID> --title ... --message ... --at 2024-05-01T09:00:00Z
//!   nudge test-push --token <TOKEN>

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nudge_core::app::{DeliveryAdapter, ReminderScheduler, SchedulerService, TickReport};
use nudge_core::config::{GatewayConfig, GatewayKind, NudgeConfig};
use nudge_core::domain::{DueWindow, Frequency, NewReminder, ReminderType, UserId, UserProfile};
use nudge_core::impls::{FcmGateway, LogGateway, SqliteStore};
use nudge_core::ports::{
    Clock, IdGenerator, IntervalTicker, PushGateway, ReminderStore, SystemClock, UlidGenerator,
};

const DEFAULT_CONFIG_PATH: &str = "nudge.toml";

#[derive(Parser)]
#[command(name = "nudge", version, about = "Reminder scheduler and push delivery")]
struct Cli {
    /// Config file (default: ./nudge.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides store.database_path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log notifications instead of sending them (reminders still advance)
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until interrupted
    Run,

    /// Run a single tick and print what it did
    ///
    /// Claims left behind by a crashed `run` are not released here, since a
    /// live `run` may own them; restart `run` to recover them.
    Tick {
        /// Print the tick report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List reminders inside the current due window
    Due {
        /// Print reminders as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create or update a user
    SetUser {
        /// User id (a new one is generated when omitted)
        #[arg(long)]
        id: Option<UserId>,

        /// Push device token
        #[arg(long)]
        token: Option<String>,

        /// Mark the user inactive
        #[arg(long)]
        inactive: bool,
    },

    /// Create a pending reminder
    AddReminder {
        #[arg(long)]
        user: UserId,

        #[arg(long = "type", default_value = "custom")]
        reminder_type: ReminderType,

        #[arg(long)]
        title: String,

        #[arg(long)]
        message: String,

        /// Trigger time, RFC 3339 (UTC)
        #[arg(long)]
        at: DateTime<Utc>,

        #[arg(long, default_value = "one-time")]
        frequency: Frequency,
    },

    /// Send one notification straight through the configured gateway
    TestPush {
        #[arg(long)]
        token: String,

        #[arg(long, default_value = "Test notification")]
        title: String,

        #[arg(long, default_value = "Push delivery is working.")]
        body: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "nudge=debug,nudge_core=debug"
    } else {
        "nudge=info,nudge_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(&cli)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dry_run = cli.dry_run;

    match cli.command {
        Command::Run => run(&config, clock, dry_run).await,
        Command::Tick { json } => {
            let scheduler = build_scheduler(&config, clock, dry_run)?;
            let report = scheduler.tick().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Command::Due { json } => {
            let store = open_store(&config, clock.clone())?;
            let window = DueWindow::ending_at(clock.now(), config.scheduler.window_slack());
            let due = store.find_due(&window).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&due)?);
                return Ok(());
            }
            println!("due window ({}, {}]: {} reminder(s)", window.start, window.end, due.len());
            for r in due {
                println!(
                    "  {}  {}  {:<14} {:<9} {}",
                    r.id,
                    r.trigger_time,
                    r.reminder_type.as_str(),
                    r.frequency.as_str(),
                    r.title
                );
            }
            Ok(())
        }
        Command::SetUser { id, token, inactive } => {
            let store = open_store(&config, clock.clone())?;
            let id = id.unwrap_or_else(|| UlidGenerator::new(clock).generate_user_id());
            store
                .upsert_user(UserProfile {
                    id,
                    is_active: !inactive,
                    device_token: token,
                })
                .await?;
            println!("{id}");
            Ok(())
        }
        Command::AddReminder {
            user,
            reminder_type,
            title,
            message,
            at,
            frequency,
        } => {
            let store = open_store(&config, clock)?;
            let reminder = store
                .insert(NewReminder {
                    user_id: user,
                    reminder_type,
                    title,
                    message,
                    trigger_time: at,
                    frequency,
                })
                .await?;
            println!("{} pending at {}", reminder.id, reminder.trigger_time);
            Ok(())
        }
        Command::TestPush { token, title, body } => {
            let adapter = DeliveryAdapter::new(
                build_gateway(&config.gateway, dry_run)?,
                config.scheduler.send_timeout(),
            );
            let data = BTreeMap::from([("notification_type".to_string(), "test".to_string())]);
            let outcome = adapter.send(&token, &title, &body, data).await;
            println!("{outcome}");
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<NudgeConfig> {
    let mut config = match &cli.config {
        Some(path) => NudgeConfig::load_from(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => NudgeConfig::load_from(DEFAULT_CONFIG_PATH)?,
        None => NudgeConfig::default(),
    };
    config.apply_env();
    if let Some(db) = &cli.database {
        config.store.database_path = db.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_store(config: &NudgeConfig, clock: Arc<dyn Clock>) -> Result<SqliteStore> {
    let path = &config.store.database_path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteStore::open(path, clock).with_context(|| format!("opening database {}", path.display()))
}

fn build_gateway(config: &GatewayConfig, dry_run: bool) -> Result<Arc<dyn PushGateway>> {
    match config.resolve_kind(dry_run)? {
        GatewayKind::Log => {
            tracing::warn!("dry run: notifications are logged, not sent");
            Ok(Arc::new(LogGateway::new()))
        }
        GatewayKind::Fcm => {
            let (Some(project_id), Some(access_token)) = (&config.project_id, &config.access_token)
            else {
                bail!("gateway.kind = \"fcm\" needs project_id and access_token");
            };
            Ok(Arc::new(FcmGateway::new(
                &config.endpoint,
                project_id,
                access_token.clone(),
            )))
        }
    }
}

fn build_scheduler(
    config: &NudgeConfig,
    clock: Arc<dyn Clock>,
    dry_run: bool,
) -> Result<ReminderScheduler> {
    let gateway = build_gateway(&config.gateway, dry_run)?;
    let store = Arc::new(open_store(config, clock.clone())?);
    tracing::info!(
        gateway = gateway.name(),
        database = %config.store.database_path.display(),
        "scheduler configured"
    );
    Ok(ReminderScheduler::new(
        store.clone(),
        store,
        DeliveryAdapter::new(gateway, config.scheduler.send_timeout()),
        clock,
        &config.scheduler,
    ))
}

async fn run(config: &NudgeConfig, clock: Arc<dyn Clock>, dry_run: bool) -> Result<()> {
    let scheduler = Arc::new(build_scheduler(config, clock, dry_run)?);
    let ticker = IntervalTicker::new(config.scheduler.tick_interval());
    tracing::info!(
        tick_interval_secs = config.scheduler.tick_interval_secs,
        window_slack_secs = config.scheduler.window_slack_secs,
        "starting scheduler"
    );
    let handle = SchedulerService::start(scheduler, ticker);

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutdown requested, finishing current tick");
    let status = handle.stop().await;

    println!(
        "ticks: {} (failed: {}), sent: {}, skipped: {}, failed: {}, errors: {}",
        status.ticks,
        status.failed_ticks,
        status.totals.sent,
        status.totals.skipped_no_token + status.totals.skipped_inactive_user,
        status.totals.failed_transient + status.totals.failed_permanent,
        status.totals.errors,
    );
    Ok(())
}

fn print_report(report: &TickReport) {
    let c = &report.counts;
    println!(
        "tick at {}: {} due, {} processed",
        report.ran_at,
        report.due,
        c.total()
    );
    println!("  sent:                  {}", c.sent);
    println!("  skipped-no-token:      {}", c.skipped_no_token);
    println!("  skipped-inactive-user: {}", c.skipped_inactive_user);
    println!("  failed-transient:      {}", c.failed_transient);
    println!("  failed-permanent:      {}", c.failed_permanent);
    println!("  errors:                {}", c.errors);
}
