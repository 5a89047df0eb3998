use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use matchday_sync::backfill::{self, BackfillOptions, DEFAULT_BACKFILL_LIMIT};
use matchday_sync::config::{SyncConfig, load_dotenv};
use matchday_sync::driver::{PollingDriver, cancellable_pacer, window_around};
use matchday_sync::fake_feed::ScriptedFeed;
use matchday_sync::feed::{FootballDataClient, MatchFeed};
use matchday_sync::reconcile::{ReconcileSummary, Reconciler};
use matchday_sync::report::render_duplicates;
use matchday_sync::resolver::TeamResolver;
use matchday_sync::standings::sync_teams;
use matchday_sync::store::Store;
use matchday_sync::sweep::LiveSweeper;

#[derive(Parser)]
#[command(name = "matchday_sync")]
#[command(about = "Keeps local football matches in step with football-data.org", long_about = None)]
struct Cli {
    /// SQLite database path (overrides MATCHDAY_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Serve feed calls from a JSON file instead of the network
    #[arg(long, global = true)]
    replay: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh live matches periodically until interrupted
    Poll {
        /// Seconds between ticks (default SYNC_INTERVAL_SECS or 120)
        #[arg(long)]
        interval: Option<u64>,
        /// Also sync yesterday..tomorrow every N ticks
        #[arg(long)]
        window_every: Option<u32>,
    },
    /// Reconcile all matches in a date range once
    Sync {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Sync the last N days up to today
        #[arg(long, conflicts_with_all = ["from", "to"])]
        days: Option<u64>,
    },
    /// Reconcile the live feed once
    SyncLive,
    /// Finish local live matches the feed no longer reports
    Sweep,
    /// Reconcile every match of one competition
    Import {
        #[arg(long)]
        competition: u32,
    },
    /// Create or refresh teams from competition standings
    SyncTeams,
    /// Fetch scores for finished matches stored without one
    BackfillScores {
        #[arg(long, default_value_t = DEFAULT_BACKFILL_LIMIT)]
        limit: usize,
        #[arg(long)]
        dry_run: bool,
    },
    /// Resolve matches still scheduled hours after kickoff
    SettlePast {
        #[arg(long)]
        dry_run: bool,
    },
    /// List teams that look like the same club
    Duplicates,
}

fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SyncConfig::from_env()?;
    let db_path = cli
        .db
        .clone()
        .or_else(|| config.resolved_db_path())
        .context("unable to resolve sqlite path")?;
    let store = Store::open(&db_path)?;
    store.seed_leagues(&config.leagues)?;
    info!(db = %db_path.display(), "store ready");

    let feed = build_feed(&cli, &config)?;
    let reconciler = Reconciler::new(
        config.leagues.clone(),
        TeamResolver::new(config.strictness),
    );

    match cli.command {
        Commands::Poll {
            interval,
            window_every,
        } => {
            let interval = interval
                .map(|secs| Duration::from_secs(secs.max(5)))
                .unwrap_or(config.interval);
            let (mut pacer, _cancel) = cancellable_pacer();
            PollingDriver::new(&store, feed.as_ref(), &reconciler, interval)
                .with_window_every(window_every)
                .run(&mut pacer);
        }
        Commands::Sync { from, to, days } => {
            let today = Utc::now().date_naive();
            let (from, to) = match (days, from, to) {
                (Some(days), _, _) => (
                    today.checked_sub_days(Days::new(days)).unwrap_or(today),
                    today,
                ),
                (None, Some(from), Some(to)) => (from, to),
                (None, Some(from), None) => (from, from),
                (None, None, Some(to)) => (to, to),
                (None, None, None) => window_around(today),
            };
            if from > to {
                return Err(anyhow!("--from {from} is after --to {to}"));
            }
            let summary = reconciler.sync_range(&store, feed.as_ref(), from, to)?;
            print_summary(&summary);
        }
        Commands::SyncLive => {
            let summary = reconciler.sync_live(&store, feed.as_ref())?;
            print_summary(&summary);
        }
        Commands::Sweep => {
            let live = feed.fetch_live_matches();
            if let Err(err) = &live {
                return Err(anyhow!("live feed unavailable: {err}"));
            }
            match LiveSweeper::new().guarded_sweep(&store, &live)? {
                Some(summary) => println!(
                    "checked {} live matches, finished {}",
                    summary.checked, summary.finished_count
                ),
                None => println!("sweep not needed"),
            }
        }
        Commands::Import { competition } => {
            if config.leagues.slug_for(competition).is_none() {
                return Err(anyhow!(
                    "competition {competition} is not in the league mapping"
                ));
            }
            let summary = reconciler.sync_competition(&store, feed.as_ref(), competition)?;
            print_summary(&summary);
        }
        Commands::SyncTeams => {
            let summary =
                sync_teams(&store, feed.as_ref(), &config.leagues, config.request_pause)?;
            println!(
                "competitions {} created {} refreshed {} skipped {} feed errors {}",
                summary.competitions,
                summary.created,
                summary.refreshed,
                summary.skipped,
                summary.feed_errors
            );
        }
        Commands::BackfillScores { limit, dry_run } => {
            let opts = BackfillOptions {
                limit,
                dry_run,
                pause: config.request_pause,
            };
            let summary = backfill::backfill_scores(&store, feed.as_ref(), &opts)?;
            println!(
                "candidates {} updated {} no data {} errors {}",
                summary.candidates, summary.updated, summary.no_data, summary.errors
            );
        }
        Commands::SettlePast { dry_run } => {
            let summary = backfill::settle_past(
                &store,
                feed.as_ref(),
                Utc::now(),
                dry_run,
                config.request_pause,
            )?;
            println!(
                "candidates {} from feed {} finished {} postponed {}",
                summary.candidates, summary.from_feed, summary.finished, summary.postponed
            );
        }
        Commands::Duplicates => {
            print!("{}", render_duplicates(&store.duplicate_team_groups()?));
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn build_feed(cli: &Cli, config: &SyncConfig) -> Result<Box<dyn MatchFeed>> {
    if let Some(path) = &cli.replay {
        info!(file = %path.display(), "replaying feed from file");
        return Ok(Box::new(ScriptedFeed::from_json_file(path)?));
    }
    if config.api_key.trim().is_empty() {
        warn!("FOOTBALL_DATA_API_KEY is not set, requests will be rejected");
    }
    Ok(Box::new(FootballDataClient::new(
        config.base_url.clone(),
        config.api_key.clone(),
    )))
}

fn print_summary(summary: &ReconcileSummary) {
    println!(
        "created {} updated {} skipped {} failed {} (conflicts {})",
        summary.created, summary.updated, summary.skipped, summary.failed, summary.conflicts
    );
}
