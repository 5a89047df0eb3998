use std::time::Duration;

use serde_json::{Value, json};

use matchday_sync::config::LeagueMapping;
use matchday_sync::driver::{Pacer, PollingDriver};
use matchday_sync::error::FeedError;
use matchday_sync::fake_feed::{FeedCall, ScriptedFeed};
use matchday_sync::feed::MatchBatch;
use matchday_sync::models::MatchStatus;
use matchday_sync::reconcile::Reconciler;
use matchday_sync::resolver::TeamResolver;
use matchday_sync::store::Store;

const INTERVAL: Duration = Duration::from_secs(120);

/// Lets a fixed number of waits through without sleeping.
struct CountingPacer {
    remaining: usize,
    waits: Vec<Duration>,
}

impl CountingPacer {
    fn new(remaining: usize) -> Self {
        Self {
            remaining,
            waits: Vec::new(),
        }
    }
}

impl Pacer for CountingPacer {
    fn wait(&mut self, interval: Duration) -> bool {
        self.waits.push(interval);
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

fn record(id: u64, home: &str, away: &str, status: &str, score: (i32, i32)) -> Value {
    json!({
        "id": id,
        "competition": {"id": 2021},
        "utcDate": "2025-01-18T15:00:00Z",
        "status": status,
        "homeTeam": {"name": home},
        "awayTeam": {"name": away},
        "score": {"fullTime": {"home": score.0, "away": score.1}}
    })
}

fn setup() -> (Store, Reconciler) {
    let store = Store::open_in_memory().unwrap();
    let leagues = LeagueMapping::new([(2021, "premier-league")]);
    store.seed_leagues(&leagues).unwrap();
    (store, Reconciler::new(leagues, TeamResolver::default()))
}

#[test]
fn idle_tick_does_not_touch_the_feed() {
    let (store, reconciler) = setup();
    let feed = ScriptedFeed::new();
    let mut driver = PollingDriver::new(&store, &feed, &reconciler, INTERVAL);

    let report = driver.tick().unwrap();
    assert!(report.idle());
    assert_eq!(report.sweep, None);
    assert!(feed.calls().is_empty());
}

#[test]
fn ticks_refresh_scores_then_sweep_ended_matches() {
    let (store, reconciler) = setup();
    reconciler.reconcile(
        &store,
        &MatchBatch::new(vec![
            record(1, "Arsenal FC", "Aston Villa FC", "IN_PLAY", (0, 0)),
            record(2, "Chelsea FC", "Everton FC", "IN_PLAY", (0, 0)),
        ]),
    );

    let feed = ScriptedFeed::new();
    feed.push_live(Ok(MatchBatch::new(vec![
        record(1, "Arsenal FC", "Aston Villa FC", "IN_PLAY", (1, 0)),
        record(2, "Chelsea FC", "Everton FC", "PAUSED", (2, 2)),
    ])));
    feed.push_live(Ok(MatchBatch::new(vec![record(
        1,
        "Arsenal FC",
        "Aston Villa FC",
        "IN_PLAY",
        (2, 0),
    )])));

    let mut driver = PollingDriver::new(&store, &feed, &reconciler, INTERVAL);
    let mut pacer = CountingPacer::new(2);
    let ticks = driver.run(&mut pacer);

    assert_eq!(ticks, 3);
    assert_eq!(pacer.waits, vec![INTERVAL; 3]);
    assert_eq!(feed.live_call_count(), 3);

    let arsenal = store.match_by_api_id(1).unwrap().unwrap();
    assert_eq!(arsenal.status, MatchStatus::Live);
    assert_eq!(arsenal.home_score, Some(2));

    let chelsea = store.match_by_api_id(2).unwrap().unwrap();
    assert_eq!(chelsea.status, MatchStatus::Finished);
    assert_eq!(chelsea.minute, Some(90));
    assert_eq!((chelsea.home_score, chelsea.away_score), (Some(2), Some(2)));
}

#[test]
fn failed_live_fetch_skips_the_sweep() {
    let (store, reconciler) = setup();
    reconciler.reconcile(
        &store,
        &MatchBatch::new(vec![
            record(1, "Arsenal FC", "Aston Villa FC", "IN_PLAY", (0, 0)),
            record(2, "Chelsea FC", "Everton FC", "IN_PLAY", (0, 0)),
            record(3, "Liverpool FC", "Fulham FC", "IN_PLAY", (0, 0)),
        ]),
    );
    let feed = ScriptedFeed::new();
    feed.push_live(Err(FeedError::Transport("connection refused".to_string())));

    let mut driver = PollingDriver::new(&store, &feed, &reconciler, INTERVAL);
    let report = driver.tick().unwrap();
    assert_eq!(report.local_live, 3);
    assert!(report.feed_failed);
    assert_eq!(report.live, None);
    assert_eq!(report.sweep, None);
    assert_eq!(feed.calls(), vec![FeedCall::Live]);
    assert_eq!(store.count_matches_with_status(MatchStatus::Live).unwrap(), 3);
}

#[test]
fn a_failing_tick_does_not_stop_the_loop() {
    let (store, reconciler) = setup();
    store.conn().execute_batch("DROP TABLE matches").unwrap();
    let feed = ScriptedFeed::new();

    let mut driver = PollingDriver::new(&store, &feed, &reconciler, INTERVAL);
    assert!(driver.tick().is_err());

    let mut pacer = CountingPacer::new(2);
    assert_eq!(driver.run(&mut pacer), 4);
    assert_eq!(pacer.waits.len(), 3);
}

#[test]
fn window_refresh_runs_every_n_ticks() {
    let (store, reconciler) = setup();
    let feed = ScriptedFeed::new();
    feed.push_dated(Ok(MatchBatch::default()));

    let mut driver =
        PollingDriver::new(&store, &feed, &reconciler, INTERVAL).with_window_every(Some(2));
    let mut pacer = CountingPacer::new(2);
    driver.run(&mut pacer);

    let dated = feed
        .calls()
        .into_iter()
        .filter(|call| matches!(call, FeedCall::Dated { .. }))
        .count();
    assert_eq!(dated, 2);
    assert_eq!(feed.live_call_count(), 0);
}
