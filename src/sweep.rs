//! Finishes local live matches the feed no longer reports as live.
//!
//! There is no final-whistle event upstream; disappearing from the live list
//! is the only signal. The guard keeps a failed or lagging feed from
//! finishing matches that are still being played.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::feed::MatchBatch;
use crate::models::{LiveFixture, MatchStatus};
use crate::names::names_overlap;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepDecision {
    Run { local: usize, upstream: usize },
    /// The live feed call failed; its emptiness says nothing.
    FeedFailed,
    /// Upstream reports at least as many live matches as we hold.
    NotAhead { local: usize, upstream: usize },
}

/// Whether a sweep may run given the local live count and the live feed
/// result of the same cycle.
pub fn sweep_decision(local_live: usize, upstream: &Result<MatchBatch, FeedError>) -> SweepDecision {
    let Ok(batch) = upstream else {
        return SweepDecision::FeedFailed;
    };
    if local_live > batch.len() {
        SweepDecision::Run {
            local: local_live,
            upstream: batch.len(),
        }
    } else {
        SweepDecision::NotAhead {
            local: local_live,
            upstream: batch.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub finished_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiveSweeper;

impl LiveSweeper {
    pub fn new() -> Self {
        Self
    }

    /// Unguarded sweep: every local live match without a counterpart in
    /// `upstream_live` becomes finished at minute 90.
    pub fn sweep(&self, store: &Store, upstream_live: &MatchBatch) -> Result<SweepSummary> {
        let pairs = upstream_live.team_name_pairs();
        let mut summary = SweepSummary::default();
        for fixture in store.live_fixtures()? {
            summary.checked += 1;
            if still_live(&fixture, &pairs) {
                debug!(match_id = fixture.match_id, "still live upstream");
                continue;
            }
            if store.finish_live_match(fixture.match_id)? {
                summary.finished_count += 1;
                info!(
                    match_id = fixture.match_id,
                    home = %fixture.home_short,
                    away = %fixture.away_short,
                    "finished match no longer live upstream"
                );
            }
        }
        Ok(summary)
    }

    /// Runs the sweep only when `sweep_decision` allows it. `None` means the
    /// sweep was not attempted.
    pub fn guarded_sweep(
        &self,
        store: &Store,
        upstream_live: &Result<MatchBatch, FeedError>,
    ) -> Result<Option<SweepSummary>> {
        let local = store.count_matches_with_status(MatchStatus::Live)?;
        match sweep_decision(local, upstream_live) {
            SweepDecision::Run { local, upstream } => {
                warn!(local, upstream, "more live matches locally than upstream, sweeping");
                let Ok(batch) = upstream_live else {
                    return Ok(None);
                };
                self.sweep(store, batch).map(Some)
            }
            SweepDecision::FeedFailed => {
                warn!("live feed unavailable, sweep skipped");
                Ok(None)
            }
            SweepDecision::NotAhead { local, upstream } => {
                debug!(local, upstream, "live counts agree, sweep skipped");
                Ok(None)
            }
        }
    }
}

fn still_live(fixture: &LiveFixture, upstream_pairs: &[(String, String)]) -> bool {
    upstream_pairs.iter().any(|(home, away)| {
        names_overlap(&fixture.home_name, home) && names_overlap(&fixture.away_name, away)
    })
}
