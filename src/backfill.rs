//! Repairs for matches the live loop left behind: finished matches without a
//! score, and fixtures still marked scheduled long after kickoff.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::feed::{MatchFeed, ScoreSnapshot};
use crate::models::{MatchStatus, MatchUpdate, StoredMatch};
use crate::store::Store;

pub const DEFAULT_BACKFILL_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub candidates: usize,
    pub updated: usize,
    pub no_data: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    pub limit: usize,
    pub dry_run: bool,
    pub pause: Duration,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BACKFILL_LIMIT,
            dry_run: false,
            pause: Duration::from_millis(100),
        }
    }
}

/// Fetches full-time scores for finished matches stored without one, or with
/// the 0-0 placeholder and no half-time score.
pub fn backfill_scores(
    store: &Store,
    feed: &dyn MatchFeed,
    opts: &BackfillOptions,
) -> Result<BackfillSummary> {
    let candidates = store.matches_missing_scores(opts.limit)?;
    let mut summary = BackfillSummary {
        candidates: candidates.len(),
        ..BackfillSummary::default()
    };
    if candidates.is_empty() {
        info!("no finished matches need scores");
        return Ok(summary);
    }
    info!(count = candidates.len(), "finished matches without scores");

    for (idx, m) in candidates.iter().enumerate() {
        let label = store.fixture_label(m)?;
        let Some(api_id) = m.api_match_id else {
            continue;
        };
        if opts.dry_run {
            info!(match_id = m.id, api_id, fixture = %label, "would fetch score");
            continue;
        }
        if idx > 0 {
            pause(opts.pause);
        }
        let detail = match feed.fetch_match_details(api_id) {
            Ok(detail) => detail,
            Err(err) => {
                summary.errors += 1;
                warn!(match_id = m.id, error = %err, "score lookup failed");
                continue;
            }
        };
        let snapshot = ScoreSnapshot::from_value(&detail);
        let (Some(home), Some(away)) = (snapshot.full_time.home, snapshot.full_time.away) else {
            summary.no_data += 1;
            warn!(match_id = m.id, fixture = %label, "no score data upstream");
            continue;
        };
        let status = snapshot
            .status
            .as_deref()
            .map(MatchStatus::from_detail)
            .unwrap_or(MatchStatus::Finished);
        store.apply_match_update(m.id, &detail_update(status, &snapshot))?;
        summary.updated += 1;
        info!(match_id = m.id, fixture = %label, home, away, "score backfilled");
    }
    Ok(summary)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleSummary {
    pub candidates: usize,
    pub from_feed: usize,
    pub finished: usize,
    pub postponed: usize,
}

impl SettleSummary {
    pub fn settled(&self) -> usize {
        self.from_feed + self.finished + self.postponed
    }
}

/// Matches this many hours past kickoff should not be scheduled any more.
pub const SETTLE_AFTER_HOURS: i64 = 2;
/// Without upstream data, matches older than this are assumed played.
pub const ASSUME_PLAYED_AFTER_HOURS: i64 = 24;

/// Moves stale scheduled matches to their real status, from match details
/// when the feed has them, otherwise by age.
pub fn settle_past(
    store: &Store,
    feed: &dyn MatchFeed,
    now: DateTime<Utc>,
    dry_run: bool,
    pause_between: Duration,
) -> Result<SettleSummary> {
    let candidates = store.scheduled_before(now - TimeDelta::hours(SETTLE_AFTER_HOURS))?;
    let mut summary = SettleSummary {
        candidates: candidates.len(),
        ..SettleSummary::default()
    };
    if candidates.is_empty() {
        info!("no past matches still scheduled");
        return Ok(summary);
    }
    info!(count = candidates.len(), "past matches still scheduled");

    for (idx, m) in candidates.iter().enumerate() {
        let label = store.fixture_label(m)?;
        if dry_run {
            info!(match_id = m.id, fixture = %label, kickoff = %m.kickoff, "would settle");
            continue;
        }
        if m.api_match_id.is_some() && idx > 0 {
            pause(pause_between);
        }
        if let Some(snapshot) = detail_snapshot(feed, m) {
            let status = snapshot
                .status
                .as_deref()
                .map(MatchStatus::from_detail)
                .unwrap_or(MatchStatus::Finished);
            store.apply_match_update(m.id, &detail_update(status, &snapshot))?;
            summary.from_feed += 1;
            info!(match_id = m.id, fixture = %label, %status, "settled from match details");
            continue;
        }
        let status = if m.kickoff < now - TimeDelta::hours(ASSUME_PLAYED_AFTER_HOURS) {
            summary.finished += 1;
            MatchStatus::Finished
        } else {
            summary.postponed += 1;
            MatchStatus::Postponed
        };
        store.set_match_status(m.id, status)?;
        info!(match_id = m.id, fixture = %label, %status, "settled without upstream data");
    }
    Ok(summary)
}

/// Details of a stored match, if it has an upstream id and the feed answers
/// with a status.
fn detail_snapshot(feed: &dyn MatchFeed, m: &StoredMatch) -> Option<ScoreSnapshot> {
    let api_id = m.api_match_id?;
    match feed.fetch_match_details(api_id) {
        Ok(detail) => {
            let snapshot = ScoreSnapshot::from_value(&detail);
            snapshot.status.is_some().then_some(snapshot)
        }
        Err(err) => {
            warn!(match_id = m.id, error = %err, "match details unavailable");
            None
        }
    }
}

fn detail_update(status: MatchStatus, snapshot: &ScoreSnapshot) -> MatchUpdate {
    MatchUpdate {
        status,
        home_score: snapshot.full_time.home,
        away_score: snapshot.full_time.away,
        halftime_home_score: snapshot.half_time.home,
        halftime_away_score: snapshot.half_time.away,
        minute: None,
        api_match_id: None,
        venue: None,
        matchweek: None,
    }
}

fn pause(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}
