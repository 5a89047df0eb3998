use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::LeagueMapping;
use crate::error::FeedError;
use crate::feed::{MatchBatch, MatchFeed, UpstreamMatch};
use crate::models::{MatchStatus, MatchUpdate, NewMatch, StoredMatch};
use crate::resolver::{LeagueContext, TeamQuery, TeamResolver};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UntrackedCompetition(u32),
    MissingLeague(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Created(i64),
    Updated(i64),
    /// The insert lost a race against another writer; the winning row was
    /// updated instead.
    Conflict(i64),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subset of `updated` that went through the conflict path.
    pub conflicts: usize,
}

impl ReconcileSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    fn record(&mut self, outcome: &MatchOutcome) {
        match outcome {
            MatchOutcome::Created(_) => self.created += 1,
            MatchOutcome::Updated(_) => self.updated += 1,
            MatchOutcome::Conflict(_) => {
                self.updated += 1;
                self.conflicts += 1;
            }
            MatchOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

pub struct Reconciler {
    leagues: LeagueMapping,
    resolver: TeamResolver,
}

impl Reconciler {
    pub fn new(leagues: LeagueMapping, resolver: TeamResolver) -> Self {
        Self { leagues, resolver }
    }

    pub fn leagues(&self) -> &LeagueMapping {
        &self.leagues
    }

    /// Merges every record of `batch` into the store. A record that fails is
    /// logged and counted; the rest of the batch still goes through.
    pub fn reconcile(&self, store: &Store, batch: &MatchBatch) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for record in &batch.records {
            match self.reconcile_record(store, record) {
                Ok(outcome) => summary.record(&outcome),
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        upstream_id = ?record.get("id"),
                        error = %format!("{err:#}"),
                        "failed to reconcile match"
                    );
                }
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            conflicts = summary.conflicts,
            "reconcile pass done"
        );
        summary
    }

    /// One-shot reconcile of every match between two dates, inclusive.
    pub fn sync_range(
        &self,
        store: &Store,
        feed: &dyn MatchFeed,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ReconcileSummary, FeedError> {
        info!(%from, %to, "syncing date range");
        let batch = feed.fetch_matches(from, to).inspect_err(|err| {
            warn!(error = %err, "match feed unavailable");
        })?;
        Ok(self.reconcile(store, &batch))
    }

    pub fn sync_live(
        &self,
        store: &Store,
        feed: &dyn MatchFeed,
    ) -> Result<ReconcileSummary, FeedError> {
        let batch = feed.fetch_live_matches().inspect_err(|err| {
            warn!(error = %err, "live feed unavailable");
        })?;
        Ok(self.reconcile(store, &batch))
    }

    pub fn sync_competition(
        &self,
        store: &Store,
        feed: &dyn MatchFeed,
        competition_id: u32,
    ) -> Result<ReconcileSummary, FeedError> {
        info!(competition = competition_id, "importing competition");
        let batch = feed
            .fetch_competition_matches(competition_id)
            .inspect_err(|err| warn!(error = %err, "competition feed unavailable"))?;
        Ok(self.reconcile(store, &batch))
    }

    pub fn reconcile_record(&self, store: &Store, record: &Value) -> Result<MatchOutcome> {
        let upstream = UpstreamMatch::from_value(record)?;
        let Some(slug) = self.leagues.slug_for(upstream.competition_id) else {
            info!(
                competition = upstream.competition_id,
                home = %upstream.home.name,
                away = %upstream.away.name,
                "skipped match from untracked competition"
            );
            return Ok(MatchOutcome::Skipped(SkipReason::UntrackedCompetition(
                upstream.competition_id,
            )));
        };
        let Some(league) = store.league_by_slug(slug)? else {
            warn!(league = slug, "mapped league has no stored row, skipping match");
            return Ok(MatchOutcome::Skipped(SkipReason::MissingLeague(
                slug.to_string(),
            )));
        };
        let ctx = LeagueContext {
            league_id: league.id,
            slug: league.slug,
        };

        let home = self
            .resolver
            .resolve(store, &TeamQuery::from(&upstream.home), &ctx)?
            .team;
        let away = self
            .resolver
            .resolve(store, &TeamQuery::from(&upstream.away), &ctx)?
            .team;
        if home.id == away.id {
            bail!(
                "{:?} and {:?} both resolved to team {}",
                upstream.home.name,
                upstream.away.name,
                home.id
            );
        }

        let status = MatchStatus::from_upstream(&upstream.status);

        if let Some(existing) = find_existing(store, &upstream, ctx.league_id, home.id, away.id)? {
            let update = match_update(&upstream, status, existing.reversed);
            store.apply_match_update(existing.row.id, &update)?;
            info!(
                match_id = existing.row.id,
                home = %home.short_name,
                away = %away.short_name,
                reversed = existing.reversed,
                %status,
                "updated match"
            );
            return Ok(MatchOutcome::Updated(existing.row.id));
        }

        let new_match = NewMatch {
            league_id: ctx.league_id,
            home_team_id: home.id,
            away_team_id: away.id,
            kickoff: upstream.kickoff,
            status,
            home_score: upstream.full_time.home.unwrap_or(0),
            away_score: upstream.full_time.away.unwrap_or(0),
            halftime_home_score: upstream.half_time.home,
            halftime_away_score: upstream.half_time.away,
            minute: upstream.minute,
            api_match_id: upstream.id,
            venue: upstream.venue.clone(),
            matchweek: upstream.matchday,
        };
        if let Some(id) = store.insert_match(&new_match)? {
            info!(
                match_id = id,
                home = %home.short_name,
                away = %away.short_name,
                league = %ctx.slug,
                %status,
                "created match"
            );
            return Ok(MatchOutcome::Created(id));
        }

        let Some(winner) = find_existing(store, &upstream, ctx.league_id, home.id, away.id)? else {
            bail!(
                "insert of {} vs {} conflicted but no matching row was found",
                home.name,
                away.name
            );
        };
        let update = match_update(&upstream, status, winner.reversed);
        store.apply_match_update(winner.row.id, &update)?;
        warn!(
            match_id = winner.row.id,
            home = %home.short_name,
            away = %away.short_name,
            "concurrent insert detected, merged into existing match"
        );
        Ok(MatchOutcome::Conflict(winner.row.id))
    }
}

/// A stored match found for an upstream record. `reversed` is set when the
/// stored home side is the upstream away side.
struct ExistingMatch {
    row: StoredMatch,
    reversed: bool,
}

/// Upstream id first, then the fixture key, then the fixture key with the
/// sides swapped.
fn find_existing(
    store: &Store,
    upstream: &UpstreamMatch,
    league_id: i64,
    home_id: i64,
    away_id: i64,
) -> Result<Option<ExistingMatch>> {
    if let Some(api_id) = upstream.id
        && let Some(row) = store.match_by_api_id(api_id)?
    {
        let reversed = row.home_team_id == away_id && row.away_team_id == home_id;
        return Ok(Some(ExistingMatch { row, reversed }));
    }
    let day = upstream.kickoff.date_naive();
    if let Some(row) = store.match_by_fixture(league_id, home_id, away_id, day)? {
        return Ok(Some(ExistingMatch {
            row,
            reversed: false,
        }));
    }
    Ok(store
        .match_by_fixture(league_id, away_id, home_id, day)?
        .map(|row| ExistingMatch {
            row,
            reversed: true,
        }))
}

/// Update for a stored row; scores follow the stored sides, not the
/// upstream ones.
fn match_update(upstream: &UpstreamMatch, status: MatchStatus, reversed: bool) -> MatchUpdate {
    let (full_time, half_time) = if reversed {
        (upstream.full_time.swapped(), upstream.half_time.swapped())
    } else {
        (upstream.full_time, upstream.half_time)
    };
    MatchUpdate {
        status,
        home_score: full_time.home,
        away_score: full_time.away,
        halftime_home_score: half_time.home,
        halftime_away_score: half_time.away,
        minute: upstream.minute,
        api_match_id: upstream.id,
        venue: upstream.venue.clone(),
        matchweek: upstream.matchday,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (Store, Reconciler) {
        let store = Store::open_in_memory().unwrap();
        let leagues = LeagueMapping::new([(2021, "premier-league")]);
        store.seed_leagues(&leagues).unwrap();
        (store, Reconciler::new(leagues, TeamResolver::default()))
    }

    #[test]
    fn untracked_competition_is_skipped_without_writes() {
        let (store, reconciler) = setup();
        let record = json!({
            "id": 9, "competition": {"id": 2002}, "utcDate": "2025-01-01T15:00:00Z",
            "status": "FINISHED",
            "homeTeam": {"name": "FC Bayern München"}, "awayTeam": {"name": "VfB Stuttgart"}
        });
        assert_eq!(
            reconciler.reconcile_record(&store, &record).unwrap(),
            MatchOutcome::Skipped(SkipReason::UntrackedCompetition(2002))
        );
        assert_eq!(store.team_count().unwrap(), 0);
    }

    #[test]
    fn malformed_record_fails_alone() {
        let (store, reconciler) = setup();
        let batch = MatchBatch::new(vec![
            json!({"id": 1, "competition": {"id": 2021}, "utcDate": "not a date",
                   "homeTeam": {"name": "Arsenal FC"}, "awayTeam": {"name": "Chelsea FC"}}),
            json!("garbage"),
            json!({"id": 2, "competition": {"id": 2021}, "utcDate": "2025-01-02T15:00:00Z",
                   "status": "TIMED",
                   "homeTeam": {"name": "Everton FC"}, "awayTeam": {"name": "Fulham FC"}}),
        ]);
        let summary = reconciler.reconcile(&store, &batch);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.created, 1);
        assert_eq!(store.match_count().unwrap(), 1);
    }

    #[test]
    fn reversed_fixture_is_updated_in_place() {
        let (store, reconciler) = setup();
        let first = json!({"competition": {"id": 2021}, "utcDate": "2025-01-04T12:30:00Z",
            "status": "TIMED",
            "homeTeam": {"name": "Liverpool FC"}, "awayTeam": {"name": "Brentford FC"}});
        let reversed = json!({"competition": {"id": 2021}, "utcDate": "2025-01-04T12:30:00Z",
            "status": "FINISHED",
            "score": {"fullTime": {"home": 0, "away": 2}, "halfTime": {"home": 0, "away": 1}},
            "homeTeam": {"name": "Brentford FC"}, "awayTeam": {"name": "Liverpool FC"}});
        let MatchOutcome::Created(id) = reconciler.reconcile_record(&store, &first).unwrap() else {
            panic!("expected a created match");
        };
        assert_eq!(
            reconciler.reconcile_record(&store, &reversed).unwrap(),
            MatchOutcome::Updated(id)
        );
        let stored = store.match_by_id(id).unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Finished);
        // Liverpool is the stored home side and scored both goals.
        let home = store.team_by_id(stored.home_team_id).unwrap().unwrap();
        assert_eq!(home.name, "Liverpool FC");
        assert_eq!((stored.home_score, stored.away_score), (Some(2), Some(0)));
        assert_eq!(
            (stored.halftime_home_score, stored.halftime_away_score),
            (Some(1), Some(0))
        );
        assert_eq!(store.match_count().unwrap(), 1);
    }

    #[test]
    fn reversed_sides_under_the_same_upstream_id_are_swapped_back() {
        let (store, reconciler) = setup();
        let first = json!({"id": 88, "competition": {"id": 2021}, "utcDate": "2025-01-11T15:00:00Z",
            "status": "IN_PLAY", "score": {"fullTime": {"home": 1, "away": 0}},
            "homeTeam": {"name": "Fulham FC"}, "awayTeam": {"name": "West Ham United FC"}});
        let flipped = json!({"id": 88, "competition": {"id": 2021}, "utcDate": "2025-01-11T15:00:00Z",
            "status": "FINISHED", "score": {"fullTime": {"home": 1, "away": 3}},
            "homeTeam": {"name": "West Ham United FC"}, "awayTeam": {"name": "Fulham FC"}});
        reconciler.reconcile_record(&store, &first).unwrap();
        reconciler.reconcile_record(&store, &flipped).unwrap();
        let stored = store.match_by_api_id(88).unwrap().unwrap();
        assert_eq!((stored.home_score, stored.away_score), (Some(3), Some(1)));
    }

    #[test]
    fn null_scores_keep_stored_values() {
        let (store, reconciler) = setup();
        let live = json!({"id": 7, "competition": {"id": 2021}, "utcDate": "2025-01-05T15:00:00Z",
            "status": "IN_PLAY", "minute": 55, "score": {"fullTime": {"home": 2, "away": 1}},
            "homeTeam": {"name": "Aston Villa FC"}, "awayTeam": {"name": "Leicester City FC"}});
        let sparse = json!({"id": 7, "competition": {"id": 2021}, "utcDate": "2025-01-05T15:00:00Z",
            "status": "PAUSED", "score": {"fullTime": {"home": null, "away": null}},
            "homeTeam": {"name": "Aston Villa FC"}, "awayTeam": {"name": "Leicester City FC"}});
        reconciler.reconcile_record(&store, &live).unwrap();
        let MatchOutcome::Updated(id) = reconciler.reconcile_record(&store, &sparse).unwrap() else {
            panic!("expected an update");
        };
        let stored = store.match_by_id(id).unwrap().unwrap();
        assert_eq!((stored.home_score, stored.away_score), (Some(2), Some(1)));
        assert_eq!(stored.minute, Some(55));
    }
}
